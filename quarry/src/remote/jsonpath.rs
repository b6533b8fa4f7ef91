//! Restricted JSON path resolution
//!
//! Supported: `$`, dotted field access and `[n]` array indices. Wildcards,
//! recursive descent, filters, slices and negative indices are rejected.

use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

fn invalid(path: &str, reason: impl Into<String>) -> Error {
    Error::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Parse a path into segments. `$` and `""` both mean the root.
pub fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let trimmed = path.trim();
    let body = match trimmed.strip_prefix('$') {
        Some(rest) => rest,
        None => trimmed,
    };
    if body.contains("..") {
        return Err(invalid(path, "recursive descent is not supported"));
    }

    let mut segments = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    // Without `$`, the path may start directly with a key
    let mut expect_key = !trimmed.starts_with('$');

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                expect_key = true;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .map(|p| p + i)
                    .ok_or_else(|| invalid(path, "unclosed '['"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                let inner = inner.trim();
                if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid(
                        path,
                        format!("only non-negative numeric indices are supported, got '[{}]'", inner),
                    ));
                }
                let index = inner
                    .parse::<usize>()
                    .map_err(|e| invalid(path, e.to_string()))?;
                segments.push(Segment::Index(index));
                i = close + 1;
                expect_key = false;
            }
            _ if expect_key => {
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let key: String = chars[start..i].iter().collect();
                if key == "*" || key.contains('*') {
                    return Err(invalid(path, "wildcards are not supported"));
                }
                if key.contains(['?', '(', ')', '@', ']']) {
                    return Err(invalid(path, format!("unsupported token in '{}'", key)));
                }
                segments.push(Segment::Key(key));
                expect_key = false;
            }
            c => return Err(invalid(path, format!("unexpected '{}'", c))),
        }
    }

    if expect_key && !body.is_empty() {
        return Err(invalid(path, "path ends with '.'"));
    }
    Ok(segments)
}

/// Resolve `path` against `root`. A missing step yields `Ok(None)`.
pub fn extract<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>> {
    let segments = parse_path(path)?;
    Ok(walk(root, &segments))
}

fn walk<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value);
    };
    let next = match (first, value) {
        (Segment::Key(key), Value::Object(map)) => map.get(key),
        // An all-digit dotted key on an array acts as an index (`items.0`)
        (Segment::Key(key), Value::Array(items)) => {
            key.parse::<usize>().ok().and_then(|idx| items.get(idx))
        }
        (Segment::Index(idx), Value::Array(items)) => items.get(*idx),
        _ => None,
    }?;
    walk(next, rest)
}
