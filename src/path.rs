//! Slash-separated names used to address commands and groups.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a [`NamePath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The input text was empty.
    #[error("empty path")]
    Empty,
}

/// A parsed command path such as `/tool/build` or `../build`.
///
/// Segments are stored without separators. Parsing keeps `.` and `..`
/// verbatim; call [`NamePath::normalize`] to collapse them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamePath {
    absolute: bool,
    segments: Vec<String>,
}

impl NamePath {
    /// The absolute root path, `/`.
    pub fn root() -> Self {
        Self {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Relative path with no segments, displayed as `.`.
    pub fn current() -> Self {
        Self {
            absolute: false,
            segments: Vec::new(),
        }
    }

    /// Parse `text` into a path.
    ///
    /// A leading `/` marks the path absolute. Empty segments (`a//b`, a
    /// trailing `/`) are dropped, but the absolute marker is kept, so `"//"`
    /// parses to the root.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self {
            absolute: text.starts_with('/'),
            segments: text
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        })
    }

    /// Canonical form of this path.
    ///
    /// `.` segments disappear and `..` consumes the preceding regular
    /// segment. A `..` with nothing left to consume is kept as-is: it means
    /// "could not go further up" and callers decide what that implies.
    pub fn normalize(&self) -> Self {
        let mut out: Vec<String> = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment.as_str() {
                "." => {}
                ".." => match out.last() {
                    Some(last) if last != ".." => {
                        out.pop();
                    }
                    _ => out.push(segment.clone()),
                },
                _ => out.push(segment.clone()),
            }
        }
        Self {
            absolute: self.absolute,
            segments: out,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for `/` (absolute, no segments).
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
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

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The path without its last segment, or `None` when there is none.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            absolute: self.absolute,
            segments: init.to_vec(),
        })
    }

    /// The path extended with a single segment.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self {
            absolute: self.absolute,
            segments,
        }
    }

    /// Resolve `other` relative to `self`. An absolute `other` wins outright.
    pub fn join(&self, other: &NamePath) -> Self {
        if other.absolute {
            return other.clone();
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self {
            absolute: self.absolute,
            segments,
        }
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.absolute, self.segments.is_empty()) {
            (true, true) => write!(f, "/"),
            (true, false) => write!(f, "/{}", self.segments.join("/")),
            (false, true) => write!(f, "."),
            (false, false) => write!(f, "{}", self.segments.join("/")),
        }
    }
}

impl FromStr for NamePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
