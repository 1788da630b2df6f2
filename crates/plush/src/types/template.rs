use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::compiler::Program;

/// A deferred fragment of a rendered skeleton.
///
/// Markers are produced by evaluation in left-to-right order of appearance.
/// `start..end` delimit the placeholder bytes in the skeleton that splicing
/// replaces with `content`; `input` is template source re-rendered per
/// request to produce that content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoleMarker {
    /// Byte offset of the placeholder's first byte in the skeleton.
    pub start: usize,
    /// Byte offset one past the placeholder's last byte.
    pub end: usize,
    /// Template source to re-render for this hole.
    pub input: String,
    /// Rendered result, empty until filled.
    pub content: String,
    /// Failure captured while producing the marker; aborts the splice.
    pub err: Option<String>,
}

/// Deep-copy markers with `content` and `err` reset.
///
/// Fill passes operate on cleared copies so concurrent readers of a cached
/// record never observe partially-filled state.
pub fn cleared_holes(holes: &[HoleMarker]) -> Vec<HoleMarker> {
    holes
        .iter()
        .map(|hole| HoleMarker {
            start: hole.start,
            end: hole.end,
            input: hole.input.clone(),
            content: String::new(),
            err: None,
        })
        .collect()
}

/// The cacheable unit of a template render.
///
/// A record stored under the `ast:` namespace carries a `program` and no
/// skeleton; a record under the `full:` namespace carries a skeleton plus
/// hole markers and no program. Records are immutable once stored and are
/// replaced wholesale on write.
#[derive(Debug, Clone, Default)]
pub struct Template {
    /// Compiled form, present on AST records.
    pub program: Option<Arc<Program>>,
    /// Fully rendered static output with placeholders left in place.
    pub skeleton: String,
    /// Hole descriptors for the skeleton, in textual order.
    pub holes: Vec<HoleMarker>,
    /// Whether this record was itself served from the cache.
    pub is_cache: bool,
    /// When the record was written; `None` for AST records, which never
    /// expire.
    pub last_cached: Option<Instant>,
}

impl Template {
    /// Build an AST-namespace record for a compiled program.
    pub fn ast_record(program: Arc<Program>) -> Self {
        Self {
            program: Some(program),
            ..Self::default()
        }
    }

    /// Build a full-render record stamped with the current time.
    pub fn full_record(skeleton: String, holes: &[HoleMarker]) -> Self {
        Self {
            program: None,
            skeleton,
            holes: cleared_holes(holes),
            is_cache: false,
            last_cached: Some(Instant::now()),
        }
    }
}
