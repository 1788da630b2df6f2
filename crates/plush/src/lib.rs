//! Hole-punch template rendering with a two-tier cache.
//!
//! A template renders into a cacheable *skeleton* plus deferred *holes*
//! that are re-rendered concurrently per request and spliced back into
//! place. Compiled programs cache under the `ast:` namespace and never
//! expire; rendered skeletons cache under `full:` with a TTL.

pub mod cache;
pub mod cache_key;
pub mod compiler;
mod context;
mod engine;
mod error;
pub mod helpers;
mod interner;
mod scope;
pub mod types;

pub use cache::{MemoryCache, TemplateCache};
pub use cache_key::{
    clean_file_path, clean_request_url, generate_ast_key, generate_full_key, sanitize_cache_key,
};
pub use compiler::{EvalError, ParseError, Program};
pub use context::{Context, MetaKey};
pub use engine::{Engine, is_template_file};
pub use error::RenderError;
pub use helpers::{
    Helper, HelperArgs, HelperFn, HelperRegistry, PartialFeeder, js_escape_string, render_partial,
};
pub use interner::{InternTable, Symbol};
pub use scope::{Scope, SharedScope};
pub use types::{HoleMarker, Template, Value, cleared_holes};

/// Creates a `HashMap<String, Value>` from key-value pairs.
///
/// Values are converted via `Into<Value>`, so integers, floats, strings,
/// and vectors can be passed directly.
///
/// # Example
///
/// ```
/// use plush::{Context, data};
///
/// let ctx = Context::with_data(data! { "count" => 3, "name" => "Alice" });
/// assert_eq!(ctx.get("count").unwrap().as_number(), Some(3));
/// assert_eq!(ctx.get("name").unwrap().as_string(), Some("Alice"));
/// ```
#[macro_export]
macro_rules! data {
    {} => {
        ::std::collections::HashMap::<String, $crate::Value>::new()
    };
    { $($key:expr => $value:expr),+ $(,)? } => {
        {
            let mut map = ::std::collections::HashMap::<String, $crate::Value>::new();
            $(
                map.insert($key.to_string(), ::std::convert::Into::<$crate::Value>::into($value));
            )+
            map
        }
    };
}
