//! Property path expressions.
//!
//! A small JSONPath dialect, enough to pull nested id lists out of Foreman
//! records: `$` for the root, `.key` or `['key']` for object members, `[n]`
//! for array elements and `[*]` (also written `.[*]` or `.*`) for every
//! element of an array or every value of an object.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{StateError, StateResult};

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// Parse a path expression.
    pub fn parse(raw: &str) -> StateResult<Self> {
        let invalid = |message: &str| StateError::InvalidPropertyPath {
            path: raw.to_string(),
            message: message.to_string(),
        };

        let rest = raw
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| invalid("must start with '$'"))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    // `.[*]` is accepted as a spelling of `[*]`
                    if chars.get(i) == Some(&'[') {
                        continue;
                    }
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    let key: String = chars[start..i].iter().collect();
                    match key.as_str() {
                        "" => return Err(invalid("empty member name")),
                        "*" => segments.push(PathSegment::Wildcard),
                        _ => segments.push(PathSegment::Key(key)),
                    }
                }
                '[' => {
                    let start = i + 1;
                    let end = chars[start..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| start + offset)
                        .ok_or_else(|| invalid("unterminated '['"))?;
                    let inner: String = chars[start..end].iter().collect();
                    segments.push(Self::parse_bracket(inner.trim()).ok_or_else(|| {
                        invalid(&format!("unsupported selector '[{inner}]'"))
                    })?);
                    i = end + 1;
                }
                other => {
                    return Err(invalid(&format!("unexpected character '{other}'")));
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    fn parse_bracket(inner: &str) -> Option<PathSegment> {
        if inner == "*" {
            return Some(PathSegment::Wildcard);
        }
        if let Ok(index) = inner.parse::<usize>() {
            return Some(PathSegment::Index(index));
        }
        let quoted = inner
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
        Some(PathSegment::Key(quoted.to_string()))
    }

    /// The expression as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Evaluate against `root`, returning every selected value in document order.
    ///
    /// Missing members and type mismatches select nothing rather than failing.
    pub fn select<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
        let mut current = vec![root];

        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match (segment, value) {
                    (PathSegment::Key(key), Value::Object(map)) => {
                        if let Some(child) = map.get(key) {
                            next.push(child);
                        }
                    }
                    (PathSegment::Index(index), Value::Array(items)) => {
                        if let Some(child) = items.get(*index) {
                            next.push(child);
                        }
                    }
                    (PathSegment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    (PathSegment::Wildcard, Value::Object(map)) => next.extend(map.values()),
                    _ => {}
                }
            }
            current = next;
        }

        current
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for PropertyPath {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
