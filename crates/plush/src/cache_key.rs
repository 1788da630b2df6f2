//! Deterministic cache keys from filenames and request URLs.
//!
//! Keys live in a flat namespace (`ast:` for compiled programs, `full:` for
//! rendered skeletons) and must stay safe as map keys or
//! filesystem-adjacent identifiers. Sanitization is a single pass over a
//! fixed 256-entry byte table rather than a real URL parser: hot render
//! paths pay no parsing or backtracking cost, at the price of a documented
//! sanitize-everything fallback for URLs the splitter cannot take apart.

use crate::context::{Context, MetaKey};

/// Per-byte sanitization table: letters, digits, `-`, `_`, and `.` pass
/// through, everything else becomes `_`.
static CHAR_TABLE: [u8; 256] = build_char_table();

const fn build_char_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let byte = i as u8;
        table[i] = if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            byte
        } else {
            b'_'
        };
        i += 1;
    }
    table
}

/// Map every byte through the sanitization table, collapsing runs of `_`
/// and trimming one trailing `_`.
///
/// Idempotent: sanitizing a sanitized key is a no-op.
pub fn sanitize_cache_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_underscore = false;
    for &byte in input.as_bytes() {
        let sanitized = CHAR_TABLE[byte as usize];
        if sanitized == b'_' {
            if !last_was_underscore {
                out.push('_');
                last_was_underscore = true;
            }
        } else {
            out.push(sanitized as char);
            last_was_underscore = false;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}

/// Normalize a template file path into key form: `\` becomes `/`, outer
/// slashes are trimmed, the rest is sanitized.
pub fn clean_file_path(filename: &str) -> String {
    if filename.is_empty() {
        return String::new();
    }
    let normalized = if filename.contains('\\') {
        filename.replace('\\', "/")
    } else {
        filename.to_string()
    };
    sanitize_cache_key(normalized.trim_matches('/'))
}

/// Normalize a request URL into key form.
///
/// Values starting with `/` are treated as path-only URLs; anything else
/// goes through the scheme-aware splitter.
pub fn clean_request_url(raw_url: &str) -> String {
    if raw_url.is_empty() {
        return String::new();
    }
    if raw_url.starts_with('/') {
        return clean_url_path(raw_url);
    }
    clean_full_url(raw_url)
}

/// Fast path for path-only URLs: strip the query/fragment, trim leading
/// slashes, sanitize.
fn clean_url_path(path: &str) -> String {
    let query = path.find('?');
    let fragment = path.find('#');
    let cut = match (query, fragment) {
        (Some(q), Some(f)) => q.min(f),
        (Some(q), None) => q,
        (None, Some(f)) => f,
        (None, None) => path.len(),
    };
    let clean = path[1..cut].trim_start_matches('/');
    if clean.is_empty() {
        return String::new();
    }
    sanitize_cache_key(clean)
}

/// Split a scheme-full URL into host and path segments in a single pass,
/// sanitize each, and join with `_`. Falls back to sanitizing the raw
/// value when no host or path can be identified (bare hosts, malformed
/// URLs).
fn clean_full_url(raw_url: &str) -> String {
    let mut host_start = 0;
    let mut host_end = 0;
    let mut path_start = 0;
    let mut path_end = 0;
    let mut found_slashes = false;
    let mut slash_count = 0;

    for (i, c) in raw_url.char_indices() {
        if !found_slashes {
            if c == '/' {
                slash_count += 1;
                if slash_count == 2 {
                    host_start = i + 1;
                    found_slashes = true;
                }
            }
            continue;
        }
        if host_end == 0 {
            if c == '/' {
                host_end = i;
                path_start = i + 1;
            } else if c == '?' || c == '#' {
                host_end = i;
                break;
            }
            continue;
        }
        if path_end == 0 && (c == '?' || c == '#') {
            path_end = i;
            break;
        }
    }

    if found_slashes && host_end == 0 {
        host_end = raw_url.len();
    }
    if host_end > 0 && path_start > 0 && path_end == 0 {
        path_end = raw_url.len();
    }

    let mut parts: Vec<String> = Vec::with_capacity(2);
    if host_end > host_start {
        let host = &raw_url[host_start..host_end];
        if !host.is_empty() {
            parts.push(sanitize_cache_key(host));
        }
    }
    if path_end > path_start {
        let path = &raw_url[path_start..path_end];
        if !path.is_empty() && path != "/" {
            parts.push(sanitize_cache_key(path));
        }
    }
    if parts.is_empty() {
        return sanitize_cache_key(raw_url);
    }
    parts.join("_")
}

/// Key under which a compiled program is cached: `ast:<cleaned-filename>`.
pub fn generate_ast_key(filename: &str) -> String {
    format!("ast:{}", clean_file_path(filename))
}

/// Key body shared by full-render keys: the cleaned filename, plus a
/// `|url:` segment when the context carries a request URL.
pub(crate) fn generate_cache_key(filename: &str, ctx: &Context) -> String {
    let clean_filename = clean_file_path(filename);
    let Some(url) = ctx.meta(MetaKey::CurrentUrl) else {
        return clean_filename;
    };
    let mut key = clean_filename;
    if !url.is_empty() {
        let clean_url = clean_request_url(&url);
        if !clean_url.is_empty() {
            key.push_str("|url:");
            key.push_str(&clean_url);
        }
    }
    key
}

/// Key under which a rendered skeleton is cached:
/// `full:<cleaned-filename>[|url:<cleaned-url>]`.
pub fn generate_full_key(filename: &str, ctx: &Context) -> String {
    format!("full:{}", generate_cache_key(filename, ctx))
}
