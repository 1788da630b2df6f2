//! Rendering context: one scope plus typed render metadata.
//!
//! A `Context` is the unit of execution state passed into a render. It is a
//! cheap-to-clone handle; `fork` produces a child whose scope chains to the
//! parent's and whose metadata shadows the parent's. Forked children read
//! parent state but their declarations never leak upward.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::scope::{Scope, SharedScope};
use crate::types::Value;

/// Typed keys for engine-internal render metadata.
///
/// These replace string sentinels in user data: the key space is closed, so
/// a template variable can never collide with engine bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    /// Logical path of the template being rendered.
    TemplateFile,
    /// Base file name of the template, without extension.
    BaseName,
    /// Extension of the template, without the leading dot.
    Extension,
    /// URL of the request this render serves, if any.
    CurrentUrl,
    /// Present when caching is disabled for this render tree.
    DisableCache,
    /// Name of the partial currently being rendered, if any.
    InPartial,
    /// File key stamped on a hole-batch fork; matching `TemplateFile`
    /// marks a context as a hole sub-render.
    HoleBatch,
}

struct ContextInner {
    scope: SharedScope,
    meta: RwLock<HashMap<MetaKey, String>>,
    parent: Option<Context>,
}

/// Execution state for one render call tree.
///
/// Reads take a shared guard and writes an exclusive one, so a single
/// context is safe to read concurrently from multiple forked renders while
/// mutation stays serialized. Contexts are created per top-level render or
/// per partial/hole fork and dropped when the call returns.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a root context with an empty scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                scope: Arc::new(RwLock::new(Scope::new())),
                meta: RwLock::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// Create a root context pre-populated with `data`.
    pub fn with_data(data: HashMap<String, Value>) -> Self {
        let ctx = Self::new();
        let mut keys: Vec<&String> = data.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = data.get(key) {
                ctx.set(key, value.clone());
            }
        }
        ctx
    }

    /// Fork a child context.
    ///
    /// The child's scope chains to this context's scope and its metadata
    /// table starts empty, shadowing this one on lookup. Values set on the
    /// child are invisible here; this context's values stay readable there.
    pub fn fork(&self) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                scope: Arc::new(RwLock::new(Scope::child_of(Arc::clone(&self.inner.scope)))),
                meta: RwLock::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Declare a value in this context's local scope.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.inner.scope.write().declare(name, value.into());
    }

    /// Assign to the nearest enclosing declaration of `name`.
    ///
    /// Returns `false` when nothing in the chain declares it.
    pub fn update(&self, name: &str, value: impl Into<Value>) -> bool {
        self.inner.scope.write().assign(name, value.into())
    }

    /// Resolve a value from this context or its ancestors.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.scope.read().resolve(name)
    }

    /// Check whether `name` resolves anywhere in the chain.
    pub fn has(&self, name: &str) -> bool {
        self.inner.scope.read().has(name)
    }

    /// Merge the locally-declared values of this context and its ancestors,
    /// outermost first, into one mapping.
    pub fn export(&self) -> HashMap<String, Value> {
        let mut merged = match &self.inner.parent {
            Some(parent) => parent.export(),
            None => HashMap::new(),
        };
        merged.extend(self.inner.scope.read().local_bindings());
        merged
    }

    /// Set a metadata entry on this context, shadowing any parent entry.
    pub fn set_meta(&self, key: MetaKey, value: impl Into<String>) {
        self.inner.meta.write().insert(key, value.into());
    }

    /// Look up a metadata entry in this context or its ancestors.
    pub fn meta(&self, key: MetaKey) -> Option<String> {
        if let Some(value) = self.inner.meta.read().get(&key) {
            return Some(value.clone());
        }
        self.inner.parent.as_ref()?.meta(key)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
