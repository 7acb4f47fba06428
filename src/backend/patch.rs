/**
 * Patch Engine
 *
 * Applies an ordered list of JSON-Patch style operations to a serialized
 * document snapshot. Paths are JSON Pointers (RFC 6901). The list is applied
 * atomically: either every operation succeeds and a new snapshot is
 * returned, or the input is left untouched and the first failure reported.
 */

use serde_json::Value;
use thiserror::Error;

use crate::shared::message::{OpKind, SyncOp};

/// Reasons a patch cannot be applied
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("snapshot is not valid JSON: {0}")]
    InvalidSnapshot(String),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("path not found: '{0}'")]
    PathNotFound(String),
    #[error("array index out of bounds at '{0}'")]
    IndexOutOfBounds(String),
    #[error("{op:?} at '{path}' requires a 'from' pointer")]
    MissingFrom { op: OpKind, path: String },
    #[error("cannot move '{from}' into its own child '{path}'")]
    MoveIntoChild { from: String, path: String },
    #[error("cannot remove the document root")]
    RemoveRoot,
}

/// Apply `ops` to a JSON snapshot and return the new snapshot
pub fn apply(snapshot: &[u8], ops: &[SyncOp]) -> Result<Vec<u8>, PatchError> {
    let mut document: Value =
        serde_json::from_slice(snapshot).map_err(|e| PatchError::InvalidSnapshot(e.to_string()))?;
    for op in ops {
        apply_op(&mut document, op)?;
    }
    serde_json::to_vec(&document).map_err(|e| PatchError::InvalidSnapshot(e.to_string()))
}

/// Apply `ops` to a decoded document, leaving it unchanged on failure
pub fn apply_to_value(document: &mut Value, ops: &[SyncOp]) -> Result<(), PatchError> {
    let mut working = document.clone();
    for op in ops {
        apply_op(&mut working, op)?;
    }
    *document = working;
    Ok(())
}

/// Escape a raw key so it can be used as one pointer segment
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Build a pointer from raw, unescaped segments
pub fn pointer<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|segment| format!("/{}", escape_segment(segment.as_ref())))
        .collect()
}

/// Split a pointer into unescaped segments
pub fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPath(path.to_string()));
    };
    rest.split('/')
        .map(|raw| unescape_segment(raw).ok_or_else(|| PatchError::InvalidPath(path.to_string())))
        .collect()
}

fn unescape_segment(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn apply_op(document: &mut Value, op: &SyncOp) -> Result<(), PatchError> {
    let path = parse_pointer(&op.path)?;
    match op.op {
        OpKind::Add => add(document, &path, op.value.clone(), &op.path),
        OpKind::Remove => remove(document, &path, &op.path).map(|_| ()),
        OpKind::Replace => {
            let target = resolve_mut(document, &path)
                .ok_or_else(|| PatchError::PathNotFound(op.path.clone()))?;
            *target = op.value.clone();
            Ok(())
        }
        OpKind::Move => {
            let from_raw = op.from.as_deref().ok_or_else(|| PatchError::MissingFrom {
                op: op.op,
                path: op.path.clone(),
            })?;
            let from = parse_pointer(from_raw)?;
            if from == path {
                return Ok(());
            }
            if path.len() > from.len() && path.starts_with(&from) {
                return Err(PatchError::MoveIntoChild {
                    from: from_raw.to_string(),
                    path: op.path.clone(),
                });
            }
            let value = remove(document, &from, from_raw)?;
            add(document, &path, value, &op.path)
        }
        OpKind::Copy => {
            let from_raw = op.from.as_deref().ok_or_else(|| PatchError::MissingFrom {
                op: op.op,
                path: op.path.clone(),
            })?;
            let from = parse_pointer(from_raw)?;
            let value = resolve(document, &from)
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound(from_raw.to_string()))?;
            add(document, &path, value, &op.path)
        }
    }
}

fn add(document: &mut Value, path: &[String], value: Value, raw: &str) -> Result<(), PatchError> {
    let Some((last, parent_path)) = path.split_last() else {
        *document = value;
        return Ok(());
    };
    let parent =
        resolve_mut(document, parent_path).ok_or_else(|| PatchError::PathNotFound(raw.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(last).ok_or_else(|| PatchError::InvalidPath(raw.to_string()))?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds(raw.to_string()));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(raw.to_string())),
    }
}

fn remove(document: &mut Value, path: &[String], raw: &str) -> Result<Value, PatchError> {
    let Some((last, parent_path)) = path.split_last() else {
        return Err(PatchError::RemoveRoot);
    };
    let parent =
        resolve_mut(document, parent_path).ok_or_else(|| PatchError::PathNotFound(raw.to_string()))?;
    match parent {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| PatchError::PathNotFound(raw.to_string())),
        Value::Array(items) => {
            let index = parse_index(last).ok_or_else(|| PatchError::InvalidPath(raw.to_string()))?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds(raw.to_string()));
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::PathNotFound(raw.to_string())),
    }
}

fn resolve<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => parse_index(segment).and_then(|i| items.get(i)),
        _ => None,
    })
}

fn resolve_mut<'a>(document: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    path.iter().try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => parse_index(segment).and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

// Array indices are plain decimal without sign or leading zeros.
fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse().ok()
}
