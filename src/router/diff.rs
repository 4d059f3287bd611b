// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Structural diff between two versions of a Kubernetes object.
//!
//! Objects are compared as generic JSON values, so the diff works the same
//! for every resource kind, CRDs included.
//!
//! # Field paths
//!
//! Tracked and ignored fields are written as paths:
//!
//! - `.field` - Object field access: `spec.replicas`
//! - `[n]` - Array index (0-based): `spec.containers[0].image`
//! - `[*]` or `*` - Any array element or object key: `spec.containers[*].image`
//! - `["key"]` - Keys containing dots: `metadata.labels["app.kubernetes.io/name"]`
//!
//! A path selects the value it points to and everything below it.
//!
//! # Output
//!
//! Each changed leaf renders as
//!
//! ```text
//! spec.replicas:
//! 	-: 1
//! 	+: 2
//! ```
//!
//! The `-` line is left out for added fields and the `+` line for removed ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};
use std::sync::LazyLock;

use super::route::UpdateSetting;
use crate::error::{ConfigError, DiffError};

/// Metadata fields that change on every write and carry no user intent
static VOLATILE_PATHS: LazyLock<Vec<FieldPath>> = LazyLock::new(|| {
    ["resourceVersion", "managedFields", "generation"]
        .into_iter()
        .map(|field| FieldPath {
            segments: vec![
                PathSegment::Field("metadata".to_string()),
                PathSegment::Field(field.to_string()),
            ],
        })
        .collect()
});

/// Parsed segment of a field path
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    /// Object key: `.name` or `["name"]`
    Field(String),
    /// Array index: `[0]`
    Index(usize),
    /// Any key or index: `*` or `[*]`
    Any,
}

impl PathSegment {
    /// Whether this pattern segment selects the concrete segment `other`
    fn selects(&self, other: &PathSegment) -> bool {
        match (self, other) {
            (PathSegment::Any, _) => true,
            (PathSegment::Field(a), PathSegment::Field(b)) => a == b,
            (PathSegment::Index(a), PathSegment::Index(b)) => a == b,
            _ => false,
        }
    }
}

/// Path into a JSON object, e.g. `spec.template.spec.containers[*].image`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Whether `concrete` is this path or lies below it
    fn selects(&self, concrete: &[PathSegment]) -> bool {
        self.segments.len() <= concrete.len()
            && self
                .segments
                .iter()
                .zip(concrete)
                .all(|(pattern, segment)| pattern.selects(segment))
    }
}

impl FromStr for FieldPath {
    type Err = ConfigError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = path.trim().chars().peekable();
        let mut segments = Vec::new();
        let mut expect_field = true;

        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    if expect_field {
                        return Err(invalid("empty field name"));
                    }
                    expect_field = true;
                }
                '[' => {
                    chars.next();
                    segments.push(parse_bracket_segment(&mut chars).map_err(invalid)?);
                    expect_field = false;
                }
                _ => {
                    if !expect_field {
                        return Err(invalid("expected '.' or '[' between segments"));
                    }
                    let field = consume_field_name(&mut chars);
                    segments.push(if field == "*" {
                        PathSegment::Any
                    } else {
                        PathSegment::Field(field)
                    });
                    expect_field = false;
                }
            }
        }

        if segments.is_empty() {
            return Err(invalid("path is empty"));
        }
        if expect_field {
            return Err(invalid("path ends with '.'"));
        }
        Ok(Self { segments })
    }
}

impl TryFrom<String> for FieldPath {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_path(&self.segments))
    }
}

/// Consume a field name up to the next `.` or `[`
fn consume_field_name(chars: &mut Peekable<Chars>) -> String {
    let mut field = String::new();
    while let Some(&c) = chars.peek() {
        if c == '.' || c == '[' {
            break;
        }
        field.push(c);
        chars.next();
    }
    field
}

/// Parse `[n]`, `[*]` or `["key"]`, with the opening bracket already consumed
fn parse_bracket_segment(chars: &mut Peekable<Chars>) -> Result<PathSegment, &'static str> {
    let segment = match chars.peek() {
        Some('"') => {
            chars.next();
            let mut key = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => key.push(c),
                        None => return Err("unterminated quoted key"),
                    },
                    Some(c) => key.push(c),
                    None => return Err("unterminated quoted key"),
                }
            }
            PathSegment::Field(key)
        }
        Some('*') => {
            chars.next();
            PathSegment::Any
        }
        _ => {
            let mut digits = String::new();
            while let Some(&c) = chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                digits.push(c);
                chars.next();
            }
            let index = digits.parse::<usize>().map_err(|_| "invalid array index")?;
            PathSegment::Index(index)
        }
    };

    if chars.next() != Some(']') {
        return Err("missing closing ']'");
    }
    Ok(segment)
}

/// Whether a key must be written as `["key"]` to parse back
fn needs_quoting(name: &str) -> bool {
    name.is_empty() || name == "*" || name.contains(['.', '[', ']', '"', '\\'])
}

fn render_path(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Field(name) if needs_quoting(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                out.push_str(&format!("[\"{}\"]", escaped));
            }
            PathSegment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            PathSegment::Index(idx) => out.push_str(&format!("[{}]", idx)),
            PathSegment::Any => out.push_str("[*]"),
        }
    }
    out
}

/// One changed leaf between the two objects
#[derive(Debug, Clone, PartialEq)]
struct Change {
    path: Vec<PathSegment>,
    old: Option<Value>,
    new: Option<Value>,
}

/// Walk both values in parallel, recording every leaf that differs.
///
/// A missing side is treated as absent all the way down, so an added object
/// yields one change per leaf it contains. `null` counts as absent, and an
/// empty object or array has no leaves, so neither differs from a missing key.
fn collect_changes(
    path: &mut Vec<PathSegment>,
    old: Option<&Value>,
    new: Option<&Value>,
    out: &mut Vec<Change>,
) {
    let old = old.filter(|v| !v.is_null());
    let new = new.filter(|v| !v.is_null());
    if old == new {
        return;
    }

    match (old, new) {
        (Some(Value::Object(_)) | None, Some(Value::Object(_)) | None) => {
            let old_map = old.and_then(Value::as_object);
            let new_map = new.and_then(Value::as_object);
            let keys: BTreeSet<&String> = old_map
                .into_iter()
                .flat_map(|m| m.keys())
                .chain(new_map.into_iter().flat_map(|m| m.keys()))
                .collect();
            for key in keys {
                path.push(PathSegment::Field(key.clone()));
                collect_changes(
                    path,
                    old_map.and_then(|m| m.get(key)),
                    new_map.and_then(|m| m.get(key)),
                    out,
                );
                path.pop();
            }
        }
        (Some(Value::Array(_)) | None, Some(Value::Array(_)) | None) => {
            let old_items = old.and_then(Value::as_array);
            let new_items = new.and_then(Value::as_array);
            let len = old_items
                .map_or(0, Vec::len)
                .max(new_items.map_or(0, Vec::len));
            for idx in 0..len {
                path.push(PathSegment::Index(idx));
                collect_changes(
                    path,
                    old_items.and_then(|a| a.get(idx)),
                    new_items.and_then(|a| a.get(idx)),
                    out,
                );
                path.pop();
            }
        }
        _ => out.push(Change {
            path: path.clone(),
            old: old.cloned(),
            new: new.cloned(),
        }),
    }
}

/// Whether a change survives the tracked/ignored field rules of a setting
fn is_relevant(change: &Change, setting: &UpdateSetting, volatile: &[FieldPath]) -> bool {
    if !setting.fields.is_empty() && !setting.fields.iter().any(|f| f.selects(&change.path)) {
        return false;
    }
    if setting.ignored_fields.iter().any(|f| f.selects(&change.path)) {
        return false;
    }
    !volatile.iter().any(|f| f.selects(&change.path))
}

fn render_value(path: &str, value: &Value) -> Result<String, DiffError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other).map_err(|source| DiffError::Render {
            path: path.to_string(),
            source,
        }),
    }
}

fn render_change(change: &Change) -> Result<String, DiffError> {
    let path = render_path(&change.path);
    let mut out = format!("{}:", path);
    if let Some(old) = &change.old {
        out.push_str(&format!("\n\t-: {}", render_value(&path, old)?));
    }
    if let Some(new) = &change.new {
        out.push_str(&format!("\n\t+: {}", render_value(&path, new)?));
    }
    Ok(out)
}

/// Compute the human-readable diff between two object states.
///
/// Returns an empty string when no relevant field changed.
pub fn diff(old: &Value, new: &Value, setting: &UpdateSetting) -> Result<String, DiffError> {
    let volatile: &[FieldPath] = if setting.ignore_volatile_metadata {
        VOLATILE_PATHS.as_slice()
    } else {
        &[]
    };

    // A null side (no previous object) compares against an empty object
    let mut changes = Vec::new();
    collect_changes(&mut Vec::new(), Some(old), Some(new), &mut changes);

    let rendered = changes
        .iter()
        .filter(|c| is_relevant(c, setting, volatile))
        .map(render_change)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rendered.join("\n"))
}
