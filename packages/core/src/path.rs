//! Resource path type with validated segments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// A path segment is not usable as a resource name.
    #[error("invalid path segment '{segment}' at position {position}: {message}")]
    InvalidSegment {
        segment: String,
        position: usize,
        message: String,
    },
}

/// A resolved location in the resource tree, root to leaf.
///
/// Paths are parsed from strings using either `/` or `.` as the segment
/// separator (the hosted apps historically used both spellings). Empty
/// segments are normalized away, so `/a//b/` and `a.b` name the same
/// location. The empty path names the tree root.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path (no segments).
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path string, accepting `/` or `.` separators.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let segments: Vec<String> = s
            .split(['/', '.'])
            .filter(|seg| !seg.is_empty())
            .map(|seg| seg.to_string())
            .collect();

        for (i, segment) in segments.iter().enumerate() {
            Self::validate_segment(segment, i)?;
        }

        Ok(Path { segments })
    }

    /// Build a path from pre-split segments, validating each.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for (i, segment) in segments.iter().enumerate() {
            Self::validate_segment(segment, i)?;
        }
        Ok(Path { segments })
    }

    fn validate_segment(segment: &str, position: usize) -> Result<(), PathError> {
        if segment.is_empty() {
            return Err(PathError::InvalidSegment {
                segment: segment.to_string(),
                position,
                message: "empty segment".to_string(),
            });
        }
        if segment.contains(['/', '.']) {
            return Err(PathError::InvalidSegment {
                segment: segment.to_string(),
                position,
                message: "segment contains a separator".to_string(),
            });
        }
        if segment.chars().any(char::is_whitespace) {
            return Err(PathError::InvalidSegment {
                segment: segment.to_string(),
                position,
                message: "segment contains whitespace".to_string(),
            });
        }
        Ok(())
    }

    /// The path's segments, root to leaf.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The path with the last segment removed. Root's parent is root.
    pub fn parent(&self) -> Path {
        if self.segments.is_empty() {
            return Path::root();
        }
        Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Extend this path by one segment.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid segment. Use [`Path::try_join`] for
    /// fallible construction.
    pub fn join(&self, name: &str) -> Path {
        self.try_join(name).expect("invalid segment")
    }

    /// Extend this path by one segment, validating it.
    pub fn try_join(&self, name: &str) -> Result<Path, PathError> {
        Self::validate_segment(name, self.segments.len())?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Path { segments })
    }

    /// True if `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl std::str::FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

/// Build a [`Path`] from a literal, panicking on invalid input.
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_separators() {
        assert_eq!(Path::parse("a/b/c").unwrap(), Path::parse("a.b.c").unwrap());
        assert_eq!(Path::parse("/a//b/").unwrap(), Path::parse("a/b").unwrap());
        assert_eq!(Path::parse("").unwrap(), Path::root());
    }

    #[test]
    fn parse_rejects_whitespace() {
        let err = Path::parse("a/b c").unwrap_err();
        assert!(matches!(err, PathError::InvalidSegment { position: 1, .. }));
    }

    #[test]
    fn join_and_parent() {
        let p = path!("apps/running");
        assert_eq!(p.join("timer"), path!("apps/running/timer"));
        assert_eq!(p.parent(), path!("apps"));
        assert_eq!(Path::root().parent(), Path::root());
        assert_eq!(p.leaf(), Some("running"));
    }

    #[test]
    fn starts_with_prefixes() {
        let p = path!("apps/running/timer");
        assert!(p.starts_with(&path!("apps/running")));
        assert!(p.starts_with(&Path::root()));
        assert!(!p.starts_with(&path!("apps/installed")));
        assert!(!path!("apps").starts_with(&p));
    }

    #[test]
    fn display_is_slash_rooted() {
        assert_eq!(path!("a/b").to_string(), "/a/b");
        assert_eq!(Path::root().to_string(), "/");
    }
}
