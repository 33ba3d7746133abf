//! Path Codec
//!
//! Absolute, normalized node paths and the boundary-safe prefix predicate used
//! for every subtree scan.
//!
//! # Rules
//!
//! - Paths are absolute (`/`-rooted); the root is `/`
//! - Segments are non-empty names; `.` and `..` are rejected
//! - A `[1]` index selector on an intermediate segment is normalized away
//! - Any index selector on the final segment is rejected, as is any other
//!   intermediate index (same-name siblings are not stored)
//!
//! # Examples
//!
//! ```rust
//! use treestore_core::models::NormalizedPath;
//!
//! let path = NormalizedPath::validate("/content[1]/page").unwrap();
//! assert_eq!(path.as_str(), "/content/page");
//! assert_eq!(path.parent().unwrap().as_str(), "/content");
//! assert_eq!(path.name(), "page");
//!
//! let predicate = NormalizedPath::validate("/a").unwrap().prefix_predicate();
//! assert!(predicate.matches("/a/c"));
//! assert!(!predicate.matches("/ab"));
//! ```

use crate::db::Filter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Path validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path is not absolute: {0}")]
    NotAbsolute(String),

    #[error("Path {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Path can not end with an index selector: {0}")]
    TrailingIndex(String),
}

impl PathError {
    /// Create a malformed path error
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A validated absolute path in normal form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// The workspace root, `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Validate and normalize a raw path
    ///
    /// Idempotent: validating an already normalized path returns it unchanged.
    pub fn validate(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if !raw.starts_with('/') {
            return Err(PathError::NotAbsolute(raw.to_string()));
        }
        if raw == "/" {
            return Ok(Self::root());
        }
        if raw.ends_with('/') {
            return Err(PathError::malformed(raw, "trailing slash"));
        }

        let segments: Vec<&str> = raw[1..].split('/').collect();
        let last = segments.len() - 1;
        let mut normalized = String::with_capacity(raw.len());

        for (position, segment) in segments.iter().enumerate() {
            let (name, index) = split_index(raw, segment)?;
            check_name(raw, name)?;
            match (index, position == last) {
                (None, _) | (Some(1), false) => {}
                (Some(_), true) => {
                    return Err(PathError::TrailingIndex(raw.to_string()));
                }
                (Some(index), false) => {
                    return Err(PathError::malformed(
                        raw,
                        format!("same-name sibling index [{}] is not supported", index),
                    ));
                }
            }
            normalized.push('/');
            normalized.push_str(name);
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent path, or `None` for the root
    pub fn parent(&self) -> Option<NormalizedPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Last path segment (empty for the root)
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }


    /// Append a single child segment
    pub fn join(&self, name: &str) -> Result<NormalizedPath, PathError> {
        if name.contains('/') {
            return Err(PathError::malformed(
                name,
                "child name must be a single segment",
            ));
        }
        if self.is_root() {
            Self::validate(&format!("/{}", name))
        } else {
            Self::validate(&format!("{}/{}", self.0, name))
        }
    }

    /// Path of a property owned by the node at this path
    ///
    /// Used as the blob key for binary values.
    pub fn property_path(&self, property_name: &str) -> String {
        if self.is_root() {
            format!("/{}", property_name)
        } else {
            format!("{}/{}", self.0, property_name)
        }
    }

    /// True when `self` lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &NormalizedPath) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// True when `other` is `self` or lies below it
    pub fn is_ancestor_or_self_of(&self, other: &NormalizedPath) -> bool {
        self == other || other.is_descendant_of(self)
    }

    /// Map a path under `from` onto the same relative position under `to`
    ///
    /// Returns `None` when `self` is neither `from` nor one of its descendants.
    pub fn rebase(&self, from: &NormalizedPath, to: &NormalizedPath) -> Option<NormalizedPath> {
        if self == from {
            return Some(to.clone());
        }
        if !self.is_descendant_of(from) {
            return None;
        }
        let relative = if from.is_root() {
            &self.0[1..]
        } else {
            &self.0[from.0.len() + 1..]
        };
        if to.is_root() {
            Some(Self(format!("/{}", relative)))
        } else {
            Some(Self(format!("{}/{}", to.0, relative)))
        }
    }

    /// Predicate selecting this path and everything nested beneath it
    pub fn prefix_predicate(&self) -> PathPredicate {
        PathPredicate { base: self.clone() }
    }
}

/// Split a trailing `[n]` index selector off a segment
fn split_index<'a>(raw: &str, segment: &'a str) -> Result<(&'a str, Option<u32>), PathError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    let Some(digits) = segment[open + 1..].strip_suffix(']') else {
        return Err(PathError::malformed(raw, "unterminated index selector"));
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::malformed(
            raw,
            format!("invalid index selector [{}]", digits),
        ));
    }
    match digits.parse::<u32>() {
        Ok(index) if index > 0 => Ok((&segment[..open], Some(index))),
        _ => Err(PathError::malformed(
            raw,
            format!("invalid index selector [{}]", digits),
        )),
    }
}

fn check_name(raw: &str, name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::malformed(raw, "empty segment"));
    }
    if name == "." || name == ".." {
        return Err(PathError::malformed(raw, "relative segment"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '[' | ']' | '|' | '*') || c.is_control())
    {
        return Err(PathError::malformed(
            raw,
            format!("illegal character {:?} in name {}", c, name),
        ));
    }
    let mut parts = name.split(':');
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => Ok(()),
        (Some(local), None) if !first.is_empty() && !local.is_empty() => Ok(()),
        _ => Err(PathError::malformed(
            raw,
            format!("invalid qualified name {}", name),
        )),
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for NormalizedPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)
    }
}

impl TryFrom<String> for NormalizedPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)
    }
}

impl From<NormalizedPath> for String {
    fn from(path: NormalizedPath) -> Self {
        path.0
    }
}

/// Boundary-safe subtree predicate
///
/// Matches the base path and every path beginning with `base + "/"`. A
/// sibling that only shares a string prefix (`/ab` for base `/a`) never
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPredicate {
    base: NormalizedPath,
}

impl PathPredicate {
    pub fn base(&self) -> &NormalizedPath {
        &self.base
    }

    /// Evaluate the predicate against a stored path
    pub fn matches(&self, candidate: &str) -> bool {
        if self.base.is_root() {
            return candidate.starts_with('/');
        }
        candidate
            .strip_prefix(self.base.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Lower to a store filter on `field` (base and descendants)
    pub fn to_filter(&self, field: &str) -> Filter {
        if self.base.is_root() {
            return Filter::starts_with(field, "/");
        }
        Filter::Or(vec![
            Filter::eq(field, self.base.as_str()),
            Filter::starts_with(field, format!("{}/", self.base)),
        ])
    }

    /// Lower to a store filter on `field` matching descendants only
    pub fn descendants_filter(&self, field: &str) -> Filter {
        if self.base.is_root() {
            return Filter::And(vec![
                Filter::starts_with(field, "/"),
                Filter::ne(field, "/"),
            ]);
        }
        Filter::starts_with(field, format!("{}/", self.base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> NormalizedPath {
        NormalizedPath::validate(raw).unwrap()
    }

    #[test]
    fn test_validate_accepts_root_and_nested_paths() {
        assert!(path("/").is_root());
        assert_eq!(path("/a/b/jcr:content").as_str(), "/a/b/jcr:content");
        assert_eq!(path("/a b/c").as_str(), "/a b/c");
    }

    #[test]
    fn test_validate_rejects_malformed_paths() {
        assert_eq!(NormalizedPath::validate(""), Err(PathError::Empty));
        assert!(matches!(
            NormalizedPath::validate("a/b"),
            Err(PathError::NotAbsolute(_))
        ));
        for raw in ["/a//b", "/a/", "/a/./b", "/a/../b", "/a|b", "/a*", "/:x", "/x:", "/a:b:c"] {
            assert!(
                matches!(
                    NormalizedPath::validate(raw),
                    Err(PathError::Malformed { .. })
                ),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_validate_index_selectors() {
        assert_eq!(path("/a[1]/b").as_str(), "/a/b");
        assert!(matches!(
            NormalizedPath::validate("/a/b[2]"),
            Err(PathError::TrailingIndex(_))
        ));
        assert!(matches!(
            NormalizedPath::validate("/a/b[1]"),
            Err(PathError::TrailingIndex(_))
        ));
        assert!(matches!(
            NormalizedPath::validate("/a[2]/b"),
            Err(PathError::Malformed { .. })
        ));
        assert!(matches!(
            NormalizedPath::validate("/a[x]/b"),
            Err(PathError::Malformed { .. })
        ));
        assert!(matches!(
            NormalizedPath::validate("/a[0]/b"),
            Err(PathError::Malformed { .. })
        ));
    }

    #[test]
    fn test_validate_is_idempotent() {
        for raw in ["/", "/a", "/a[1]/b", "/x/y/jcr:data", "/with space/x"] {
            let once = path(raw);
            let twice = NormalizedPath::validate(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_parent_and_name_reconstruct_path() {
        for raw in ["/a", "/a/b", "/a/b/c", "/jcr:system/x"] {
            let p = path(raw);
            let parent = p.parent().unwrap();
            assert_eq!(parent.join(p.name()).unwrap(), p);
        }
        assert!(path("/").parent().is_none());
        assert_eq!(path("/a").parent().unwrap(), NormalizedPath::root());
        assert_eq!(path("/").name(), "");
    }

    #[test]
    fn test_prefix_predicate_respects_segment_boundary() {
        let predicate = path("/a").prefix_predicate();
        assert!(predicate.matches("/a"));
        assert!(predicate.matches("/a/c"));
        assert!(predicate.matches("/a/c/d"));
        assert!(!predicate.matches("/ab"));
        assert!(!predicate.matches("/abc/x"));
        assert!(!predicate.matches("/"));
    }

    #[test]
    fn test_root_prefix_predicate_matches_everything() {
        let predicate = NormalizedPath::root().prefix_predicate();
        assert!(predicate.matches("/"));
        assert!(predicate.matches("/anything/below"));
    }

    #[test]
    fn test_rebase() {
        let from = path("/a");
        let to = path("/b/x");
        assert_eq!(path("/a").rebase(&from, &to), Some(path("/b/x")));
        assert_eq!(path("/a/c/d").rebase(&from, &to), Some(path("/b/x/c/d")));
        assert_eq!(path("/ab").rebase(&from, &to), None);
        assert_eq!(
            path("/a/c").rebase(&NormalizedPath::root(), &path("/z")),
            Some(path("/z/a/c"))
        );
    }

    #[test]
    fn test_descendant_checks() {
        assert!(path("/a/b").is_descendant_of(&path("/a")));
        assert!(!path("/a").is_descendant_of(&path("/a")));
        assert!(!path("/ab").is_descendant_of(&path("/a")));
        assert!(path("/a").is_descendant_of(&NormalizedPath::root()));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let json = serde_json::to_string(&path("/a/b")).unwrap();
        assert_eq!(json, "\"/a/b\"");
        assert!(serde_json::from_str::<NormalizedPath>("\"relative\"").is_err());
    }
}
