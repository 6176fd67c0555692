//! JSON object paths used to address values inside source documents.
//!
//! Text form: segments joined by `/`, with `~` written as `~0` and `/` as `~1`
//! inside a segment. `*` matches every key of a map and `[*]` every element
//! of an array. The empty path is the document root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

/// Segment matching every key of a map.
pub const MAP_WILDCARD: &str = "*";

/// Segment matching every element of an array.
pub const ARRAY_WILDCARD: &str = "[*]";

/// True for `*` and `[*]`.
pub fn is_wildcard(segment: &str) -> bool {
    segment == MAP_WILDCARD || segment == ARRAY_WILDCARD
}

/// A parsed path: an ordered list of raw (unescaped) segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectJsonPath {
    segments: Vec<String>,
}

impl ObjectJsonPath {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from raw segments. Segments are taken verbatim.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the escaped text form.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.strip_prefix('/').unwrap_or(text);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for raw in trimmed.split('/') {
            if raw.is_empty() {
                return Err(PathError::EmptySegment(text.to_string()));
            }
            segments.push(unescape(text, raw)?);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// New path with one more segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Path without its last segment; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Concatenate `other` below this path.
    pub fn join(&self, other: &ObjectJsonPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Collapse a run of trailing wildcard segments to its first element.
    ///
    /// A trailing wildcard already selects everything beneath it, so further
    /// wildcards add nothing. A path made of a single wildcard keeps it.
    pub fn normalized(&self) -> Self {
        let mut segments = self.segments.clone();
        while segments.len() >= 2
            && is_wildcard(&segments[segments.len() - 1])
            && is_wildcard(&segments[segments.len() - 2])
        {
            segments.pop();
        }
        Self { segments }
    }

    /// True when the final segment is `*` or `[*]`.
    pub fn ends_with_wildcard(&self) -> bool {
        self.last().map(is_wildcard).unwrap_or(false)
    }
}

fn unescape(path: &str, raw: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(PathError::InvalidEscape {
                    path: path.to_string(),
                    segment: raw.to_string(),
                })
            }
        }
    }
    Ok(out)
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for ObjectJsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", escape(segment))?;
        }
        Ok(())
    }
}

impl FromStr for ObjectJsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectJsonPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectJsonPath> for String {
    fn from(path: ObjectJsonPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let path = ObjectJsonPath::parse("/features/[*]/id").unwrap();
        assert_eq!(path.segments(), &["features", "[*]", "id"]);
        assert_eq!(path.to_string(), "/features/[*]/id");

        let no_leading = ObjectJsonPath::parse("features/id/").unwrap();
        assert_eq!(no_leading.segments(), &["features", "id"]);
    }

    #[test]
    fn test_root_forms() {
        assert!(ObjectJsonPath::parse("").unwrap().is_root());
        assert!(ObjectJsonPath::parse("/").unwrap().is_root());
        assert_eq!(ObjectJsonPath::root().to_string(), "/");
    }

    #[test]
    fn test_escape_roundtrip() {
        let samples = ["~", "/", "a~b/c", "~0", "~1", "//~~", "plain", "x/~1/y"];
        for sample in samples {
            let path = ObjectJsonPath::from_segments([sample]);
            let text = path.to_string();
            let parsed = ObjectJsonPath::parse(&text).unwrap();
            assert_eq!(parsed.segments(), &[sample], "text: {}", text);
        }
    }

    #[test]
    fn test_invalid_escape() {
        assert!(matches!(
            ObjectJsonPath::parse("/a~2b"),
            Err(PathError::InvalidEscape { .. })
        ));
        assert!(matches!(
            ObjectJsonPath::parse("/a~"),
            Err(PathError::InvalidEscape { .. })
        ));
        assert!(matches!(
            ObjectJsonPath::parse("/a//b"),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_normalized_trims_trailing_wildcards() {
        let path = ObjectJsonPath::parse("/a/*/[*]/*").unwrap();
        assert_eq!(path.normalized().segments(), &["a", "*"]);

        let inner = ObjectJsonPath::parse("/a/*/b/[*]").unwrap();
        assert_eq!(inner.normalized(), inner);

        let sole = ObjectJsonPath::parse("/*").unwrap();
        assert_eq!(sole.normalized().segments(), &["*"]);

        let only_wild = ObjectJsonPath::parse("/[*]/*").unwrap();
        assert_eq!(only_wild.normalized().segments(), &["[*]"]);
    }

    #[test]
    fn test_child_and_join() {
        let base = ObjectJsonPath::parse("/features").unwrap();
        let child = base.child("0");
        assert_eq!(child.to_string(), "/features/0");
        let joined = base.join(&ObjectJsonPath::parse("[*]/id").unwrap());
        assert_eq!(joined.to_string(), "/features/[*]/id");
        assert!(joined.last() == Some("id"));
        assert!(base.child("[*]").ends_with_wildcard());
        assert_eq!(joined.parent().unwrap().to_string(), "/features/[*]");
        assert!(ObjectJsonPath::root().parent().is_none());
    }

    #[test]
    fn test_serde_as_string() {
        let path = ObjectJsonPath::parse("/a~1b/c").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a~1b/c\"");
        let decoded: ObjectJsonPath = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.segments(), &["a/b", "c"]);
    }
}
