//! Tag scanner.
//!
//! Splits template source into literal text and `<% ... %>` tags, keeping
//! byte spans so the parser can reconstruct re-renderable source for hole
//! tags.

use crate::compiler::error::ParseError;

/// The flavor of a tag, decided by the character after `<%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    /// `<% ... %>` — statement, output discarded.
    Stmt,
    /// `<%= ... %>` — output.
    Output,
    /// `<%H ... %>` — hole.
    Hole,
}

/// A scanned tag with its raw inner source and byte span.
#[derive(Debug, Clone)]
pub(crate) struct Tag {
    pub kind: TagKind,
    pub inner: String,
    pub line: usize,
    /// Byte offset of the opening `<`.
    pub start: usize,
    /// Byte offset one past the closing `>`.
    pub end: usize,
}

/// A piece of scanned source.
#[derive(Debug, Clone)]
pub(crate) enum Chunk {
    Text(String),
    Tag(Tag),
}

/// Scan `source` into text and tag chunks.
pub(crate) fn scan(source: &str) -> Result<Vec<Chunk>, ParseError> {
    let mut chunks = Vec::new();
    let mut cursor = 0;
    while let Some(found) = source[cursor..].find("<%") {
        let start = cursor + found;
        if start > cursor {
            chunks.push(Chunk::Text(source[cursor..start].to_string()));
        }
        let line = line_of(source, start);
        let after_open = &source[start + 2..];
        let (kind, marker_len) = match after_open.as_bytes().first() {
            Some(b'=') => (TagKind::Output, 3),
            Some(b'H') if hole_marker(after_open) => (TagKind::Hole, 3),
            _ => (TagKind::Stmt, 2),
        };
        let body_start = start + marker_len;
        let Some(close) = source[body_start..].find("%>") else {
            let column = start - source[..start].rfind('\n').map_or(0, |p| p + 1) + 1;
            return Err(ParseError::Syntax {
                line,
                column,
                message: "unterminated tag".to_string(),
            });
        };
        let close_start = body_start + close;
        chunks.push(Chunk::Tag(Tag {
            kind,
            inner: source[body_start..close_start].to_string(),
            line,
            start,
            end: close_start + 2,
        }));
        cursor = close_start + 2;
    }
    if cursor < source.len() {
        chunks.push(Chunk::Text(source[cursor..].to_string()));
    }
    Ok(chunks)
}

/// `<%H` introduces a hole only when the `H` stands alone, so identifiers
/// like `<%Head` still lex as statements.
fn hole_marker(after_open: &str) -> bool {
    match after_open[1..].chars().next() {
        Some(c) => c.is_whitespace() || c == '%',
        None => false,
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].chars().filter(|&c| c == '\n').count() + 1
}
