//! Lexically chained variable scopes.
//!
//! A `Scope` owns its local bindings and holds a read-only link to its
//! parent. Forked child scopes read parent bindings live but never gain
//! write access to them except through `assign`, which mutates the first
//! enclosing scope that already declares the name. Every level carries its
//! own guard, so sibling forks can read a shared ancestor concurrently
//! while writes to any single level stay serialized.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::interner::{InternTable, Symbol};
use crate::types::Value;

/// A scope shared across forks of a render call tree.
pub type SharedScope = Arc<RwLock<Scope>>;

/// One level of the variable scope chain.
///
/// Bindings are keyed by interned `Symbol` ids; the intern table is shared
/// by the whole chain so a name resolves to the same id at every level.
#[derive(Debug)]
pub struct Scope {
    bindings: HashMap<Symbol, Value>,
    parent: Option<SharedScope>,
    interner: Arc<InternTable>,
}

impl Scope {
    /// Create a root scope with a fresh intern table.
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            parent: None,
            interner: Arc::new(InternTable::new()),
        }
    }

    /// Create a child scope chained to `parent`, sharing its intern table.
    pub fn child_of(parent: SharedScope) -> Self {
        let interner = Arc::clone(&parent.read().interner);
        Self {
            bindings: HashMap::new(),
            parent: Some(parent),
            interner,
        }
    }

    /// The intern table shared by this chain.
    pub fn interner(&self) -> &Arc<InternTable> {
        &self.interner
    }

    /// Declare a binding in this scope, shadowing any parent binding.
    pub fn declare(&mut self, name: &str, value: Value) {
        let sym = self.interner.intern(name);
        self.bindings.insert(sym, value);
    }

    /// Assign to the nearest enclosing scope that declares `name`.
    ///
    /// Returns `false` when no enclosing declaration exists; nothing is
    /// declared implicitly.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        let Some(sym) = self.interner.lookup(name) else {
            return false;
        };
        if let Some(slot) = self.bindings.get_mut(&sym) {
            *slot = value;
            return true;
        }
        let mut next = self.parent.clone();
        while let Some(scope) = next {
            let mut guard = scope.write();
            if let Some(slot) = guard.bindings.get_mut(&sym) {
                *slot = value;
                return true;
            }
            next = guard.parent.clone();
        }
        false
    }

    /// Resolve `name` against this scope and its ancestors.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        let sym = self.interner.lookup(name)?;
        if let Some(value) = self.bindings.get(&sym) {
            return Some(value.clone());
        }
        let mut next = self.parent.clone();
        while let Some(scope) = next {
            let guard = scope.read();
            if let Some(value) = guard.bindings.get(&sym) {
                return Some(value.clone());
            }
            next = guard.parent.clone();
        }
        None
    }

    /// Check whether `name` resolves anywhere in the chain.
    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Copy out this level's bindings, keyed by name.
    pub fn local_bindings(&self) -> HashMap<String, Value> {
        let mut keys: Vec<Symbol> = self.bindings.keys().copied().collect();
        keys.sort_by_key(|sym| sym.index());
        keys.into_iter()
            .filter_map(|sym| {
                let value = self.bindings.get(&sym)?.clone();
                Some((self.interner.symbol_name(sym), value))
            })
            .collect()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
