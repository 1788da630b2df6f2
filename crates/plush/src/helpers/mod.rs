//! Helper registry: named functions and constants callable from templates.
//!
//! Helpers are a typed mapping from name to a tagged entry, either a native
//! function or a constant value. The default set is merged once when a
//! registry is created; registrations after that override by key, so user
//! bindings win over defaults.

mod partial;

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::EvalError;
use crate::context::{Context, MetaKey};
use crate::engine::Engine;
use crate::error::RenderError;
use crate::types::Value;

pub use partial::{PartialFeeder, js_escape_string, render_partial};

/// Arguments to a helper invocation.
pub struct HelperArgs<'a> {
    /// Name the helper was invoked under.
    pub name: &'a str,
    /// Evaluated argument values, in call order.
    pub values: &'a [Value],
    /// The context of the invoking template.
    pub context: &'a Context,
    /// The engine running the render.
    pub engine: &'a Engine,
    /// Line of the call site, for error reporting.
    pub line: usize,
}

/// A native helper function.
pub type HelperFn = Arc<dyn Fn(&HelperArgs<'_>) -> Result<Value, RenderError> + Send + Sync>;

/// A registered helper entry.
#[derive(Clone)]
pub enum Helper {
    /// A callable function.
    Function(HelperFn),
    /// A constant value, resolved like a variable.
    Constant(Value),
}

/// Name-keyed helper table.
#[derive(Clone)]
pub struct HelperRegistry {
    entries: HashMap<String, Helper>,
}

impl HelperRegistry {
    /// An empty registry with no helpers at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The default helper set.
    pub fn core() -> Self {
        let mut registry = Self::empty();
        registry.function("len", len_helper);
        registry.function("upcase", upcase_helper);
        registry.function("downcase", downcase_helper);
        registry.function("capitalize", capitalize_helper);
        registry.function("truncate", truncate_helper);
        registry.function("filename", filename_helper);
        registry.function("current_request_url", current_url_helper);
        registry.function("partial", partial::partial_helper);
        registry
    }

    /// Register a helper, replacing any existing entry under `name`.
    pub fn insert(&mut self, name: impl Into<String>, helper: Helper) {
        self.entries.insert(name.into(), helper);
    }

    /// Register a native function helper.
    pub fn function<F>(&mut self, name: impl Into<String>, call: F)
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.insert(name, Helper::Function(Arc::new(call)));
    }

    /// Register a constant helper.
    pub fn constant(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert(name, Helper::Constant(value.into()));
    }

    /// Look up a helper by name.
    pub fn get(&self, name: &str) -> Option<&Helper> {
        self.entries.get(name)
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::core()
    }
}

// === Default helpers ===

fn single_arg<'a>(args: &'a HelperArgs<'_>) -> Result<&'a Value, RenderError> {
    match args.values {
        [value] => Ok(value),
        other => Err(EvalError::ArgumentCount {
            line: args.line,
            name: args.name.to_string(),
            expected: 1,
            got: other.len(),
        }
        .into()),
    }
}

pub(crate) fn string_arg<'a>(args: &'a HelperArgs<'_>, index: usize) -> Result<&'a str, RenderError> {
    match args.values.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EvalError::TypeMismatch {
            line: args.line,
            message: format!("{}: expected a string argument, got {other}", args.name),
        }
        .into()),
        None => Err(EvalError::ArgumentCount {
            line: args.line,
            name: args.name.to_string(),
            expected: index + 1,
            got: args.values.len(),
        }
        .into()),
    }
}

fn len_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    let length = match single_arg(args)? {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => {
            return Err(EvalError::TypeMismatch {
                line: args.line,
                message: format!("len: cannot measure {other}"),
            }
            .into());
        }
    };
    Ok(Value::from(length))
}

fn upcase_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    Ok(Value::String(string_arg(args, 0)?.to_uppercase()))
}

fn downcase_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    Ok(Value::String(string_arg(args, 0)?.to_lowercase()))
}

fn capitalize_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    let s = string_arg(args, 0)?;
    let mut chars = s.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(Value::String(capitalized))
}

/// `truncate(s)` or `truncate(s, {size: n, trail: "..."})`; `size` counts
/// the trail.
fn truncate_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    let s = string_arg(args, 0)?;
    let mut size = 50;
    let mut trail = "...".to_string();
    if let Some(Value::Map(opts)) = args.values.get(1) {
        if let Some(n) = opts.get("size").and_then(Value::as_number) {
            size = n.max(0) as usize;
        }
        if let Some(t) = opts.get("trail").and_then(Value::as_string) {
            trail = t.to_string();
        }
    }
    if s.chars().count() <= size {
        return Ok(Value::String(s.to_string()));
    }
    let keep = size.saturating_sub(trail.chars().count());
    let mut truncated: String = s.chars().take(keep).collect();
    truncated.push_str(&trail);
    Ok(Value::String(truncated))
}

fn filename_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    Ok(Value::String(
        args.context.meta(MetaKey::TemplateFile).unwrap_or_default(),
    ))
}

fn current_url_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    Ok(Value::String(
        args.context.meta(MetaKey::CurrentUrl).unwrap_or_default(),
    ))
}
