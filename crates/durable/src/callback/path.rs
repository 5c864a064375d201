//! Dotted field paths into JSON documents

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Invalid field path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field path {path:?}: {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: &'static str,
}

/// A dotted path such as `detail.executionId` or `$.detail.execution-id`
///
/// A leading `$` (or `$.`) is accepted and ignored. Segments that parse as
/// integers index into arrays; everything else is an object key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a path
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        if body.is_empty() {
            return Err(PathError {
                path: raw.to_string(),
                reason: "path has no segments",
            });
        }

        let segments: Vec<String> = body.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError {
                path: raw.to_string(),
                reason: "empty segment",
            });
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Build one of the crate's default paths, which are known to be valid
    pub(crate) fn builtin(raw: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw.split('.').map(str::to_string).collect(),
        }
    }

    /// Path segments, without the `$` root marker
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the path against a document
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        walk(root, &self.segments)
    }

    /// Resolve the path to a non-empty string
    pub fn resolve_str<'a>(&self, root: &'a Value) -> Option<&'a str> {
        self.resolve(root)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Walk `segments` down from `root`
pub(crate) fn walk<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl std::str::FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
