//! Path pattern matching.
//!
//! Two consumers with different needs share this module:
//!
//! - Path middlewares run *every* pattern that matches, in registration
//!   order, so they need a plain segment-wise matcher ([`matches`]).
//! - The routing table needs a single best match with parameters, which
//!   matchit already does well, so table keys are translated into matchit
//!   syntax at compile time ([`to_matchit`]).
//!
//! ## Pattern syntax
//!
//! - `/admin/settings` — literal segments.
//! - `/users/:id` — `:name` captures one non-empty segment as a parameter.
//! - `/assets/*` — a final `*` matches the whole remainder (including an
//!   empty one). The remainder is not exposed as a parameter. A `*` in any
//!   other position matches a literal `*` segment.
//!
//! Trailing slashes are insignificant: `/blog/` and `/blog` are the same
//! path everywhere in the crate.

use std::collections::HashMap;

/// Parameter name used internally for translated catch-all segments.
/// Filtered out of extracted parameters.
pub(crate) const WILDCARD_PARAM: &str = "__rest";

/// Canonicalizes a request path or pattern: ensures a leading slash and
/// strips trailing slashes, except for the root path itself.
pub(crate) fn normalize(path: &str) -> String {
    let mut out = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Matches `path` against `pattern`, returning captured parameters on a hit.
///
/// `path` is expected to be normalized already; the pattern is normalized
/// here so registration-time sloppiness (trailing slash) does not disable a
/// middleware.
pub(crate) fn matches(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern = normalize(pattern);
    let pat_segs = segments(&pattern);
    let path_segs = segments(path);

    let mut params = HashMap::new();
    for (idx, pat_seg) in pat_segs.iter().enumerate() {
        if *pat_seg == "*" && idx == pat_segs.len() - 1 {
            return Some(params);
        }
        let Some(actual) = path_segs.get(idx) else {
            return None;
        };
        if let Some(name) = pat_seg.strip_prefix(':') {
            if actual.is_empty() {
                return None;
            }
            params.insert(name.to_string(), (*actual).to_string());
        } else if pat_seg != actual {
            return None;
        }
    }

    (path_segs.len() == pat_segs.len()).then_some(params)
}

/// Translates a route key into matchit syntax: `:name` becomes `{name}` and
/// a final `*` becomes a catch-all. Rejects a `*` anywhere else, since
/// matchit cannot express an infix wildcard.
pub(crate) fn to_matchit(pattern: &str) -> Result<String, String> {
    let pattern = normalize(pattern);
    if pattern == "/" {
        return Ok(pattern);
    }

    let segs = segments(&pattern);
    let last = segs.len() - 1;
    let mut out = String::with_capacity(pattern.len() + 4);
    for (idx, seg) in segs.iter().enumerate() {
        out.push('/');
        if let Some(name) = seg.strip_prefix(':') {
            if name.is_empty() {
                return Err("parameter segment is missing a name".to_string());
            }
            out.push('{');
            out.push_str(name);
            out.push('}');
        } else if *seg == "*" {
            if idx != last {
                return Err("wildcard must be the final segment".to_string());
            }
            out.push_str("{*");
            out.push_str(WILDCARD_PARAM);
            out.push('}');
        } else {
            out.push_str(seg);
        }
    }
    Ok(out)
}

/// Splits a path into segments. The root path has no segments. Empty
/// segments from doubled slashes are preserved so `/a//b` stays distinct
/// from `/a/b`.
fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}
