//! Partial resolution.
//!
//! A partial render derives its logical file key from the enclosing
//! template's key, fetches source text through the application-supplied
//! feeder, and re-enters the engine recursively with a context forked from
//! the caller's. Script-typed renders crossing a markup boundary are
//! escaped as script string literals, once per boundary crossed, so the
//! escaping composes across nested partials.

use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::EvalError;
use crate::context::{Context, MetaKey};
use crate::engine::Engine;
use crate::error::RenderError;
use crate::helpers::{HelperArgs, string_arg};
use crate::types::Value;

/// Application-supplied source loader for partials.
pub type PartialFeeder = Arc<
    dyn Fn(&str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
>;

/// The `partial(name)` / `partial(name, data)` helper.
pub(crate) fn partial_helper(args: &HelperArgs<'_>) -> Result<Value, RenderError> {
    let name = string_arg(args, 0)?;
    let data = match args.values.get(1) {
        Some(Value::Map(map)) => map.clone(),
        Some(other) => {
            return Err(EvalError::TypeMismatch {
                line: args.line,
                message: format!("partial: expected a map of data, got {other}"),
            }
            .into());
        }
        None => HashMap::new(),
    };
    render_partial(args.engine, name, &data, args.context).map(Value::String)
}

/// Resolve and render the partial `name` with `data` merged into a fork of
/// `ctx`.
///
/// When `data` carries a `layout` entry, the rendered fragment becomes the
/// `yield` value of a second resolution against the layout name (one
/// level, not a stack).
pub fn render_partial(
    engine: &Engine,
    name: &str,
    data: &HashMap<String, Value>,
    ctx: &Context,
) -> Result<String, RenderError> {
    let help = ctx.fork();
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = data.get(key) {
            help.set(key, value.clone());
        }
    }

    let base = help.meta(MetaKey::BaseName);
    let ext = help.meta(MetaKey::Extension);
    let file = help.meta(MetaKey::TemplateFile);
    if let (Some(base), Some(ext), Some(file)) = (base, ext, file) {
        let mut file_key = file;
        // Inside a partial the key still ends with the enclosing partial's
        // name; trim that instead of the base file name so self-recursive
        // partials resolve against the same directory.
        if let Some(parent) = help.meta(MetaKey::InPartial) {
            file_key = strip_suffix_owned(file_key, &parent);
        }
        file_key = strip_suffix_owned(file_key, &format!("{base}.{ext}"));
        help.set_meta(MetaKey::TemplateFile, join_file_key(&file_key, name));
    } else {
        help.set_meta(MetaKey::TemplateFile, name);
    }

    let feeder = engine.feeder().ok_or(RenderError::MissingFeeder)?;
    let source = feeder(name).map_err(|err| RenderError::Feeder {
        name: name.to_string(),
        source: err,
    })?;

    if help.meta(MetaKey::InPartial).is_none() {
        help.set_meta(MetaKey::InPartial, name);
    } else {
        let ext = file_extension(name);
        help.set_meta(MetaKey::BaseName, name.strip_suffix(ext).unwrap_or(name));
        help.set_meta(MetaKey::Extension, ext.strip_prefix('.').unwrap_or(ext));
    }

    let mut rendered = engine.render(&source, &help)?;

    if let Some(Value::String(content_type)) = help.get("contentType") {
        let ext = file_extension(name);
        if content_type.contains("javascript") && ext != ".js" && !ext.is_empty() {
            rendered = js_escape_string(&rendered);
        }
    }

    if let Some(Value::String(layout)) = data.get("layout") {
        let mut layout_data = HashMap::with_capacity(1);
        layout_data.insert("yield".to_string(), Value::String(rendered));
        return render_partial(engine, layout, &layout_data, &help);
    }

    Ok(rendered)
}

/// Escape a rendered fragment as a script string literal.
///
/// Quotes and backslashes are backslash-escaped; angle brackets, `&`, `=`,
/// and control characters become `\u00XX` sequences, so the result is safe
/// inside a script string regardless of nesting.
pub fn js_escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn strip_suffix_owned(s: String, suffix: &str) -> String {
    match s.strip_suffix(suffix) {
        Some(stripped) => stripped.to_string(),
        None => s,
    }
}

/// Extension of the final path element, with its dot; empty when none.
fn file_extension(name: &str) -> &str {
    let base = match name.rfind('/') {
        Some(slash) => &name[slash + 1..],
        None => name,
    };
    match base.rfind('.') {
        Some(dot) => &base[dot..],
        None => "",
    }
}

fn join_file_key(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{dir}/{name}")
}
