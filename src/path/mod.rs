// src/path/mod.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! # Path Model
//!
//! Normalizes user-supplied, partition-relative path patterns and matches
//! them against entry names pulled from the Image Backend. A pattern is a
//! sequence of segments, each either a literal or a glob compiled to an
//! anchored regex using the same "progressive transformation" the rest of
//! this codebase's ancestry favors: escape literal metacharacters first,
//! then substitute wildcard tokens, then anchor with `^...$`.

mod glob;

pub use glob::{matches_leaf, GlobSegment};

pub const DOS_SEPARATOR: char = '\\';
pub const UNIX_SEPARATOR: char = '/';
pub const PATH_SEPARATORS: &[char] = &[DOS_SEPARATOR, UNIX_SEPARATOR];

/// A normalized, partition-relative path pattern: an ordered list of
/// segments, each compiled once so repeated `match_path` calls don't pay
/// for recompilation.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    pub segments: Vec<GlobSegment>,
}

#[derive(Debug)]
pub struct PathError(pub String);

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid path pattern: {}", self.0)
    }
}
impl std::error::Error for PathError {}

impl PathPattern {
    /// Normalizes a raw pattern string: strips a leading drive-letter prefix
    /// (`C:`), collapses mixed `/`/`\` separators, strips a leading
    /// separator, and rejects intermediate empty segments (`a//b`).
    pub fn normalize(raw: &str, case_sensitive: bool) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        let without_drive = strip_drive_prefix(trimmed);
        let without_drive = without_drive.trim_start_matches(PATH_SEPARATORS);

        let mut segments = Vec::new();
        for (i, part) in without_drive.split(PATH_SEPARATORS).enumerate() {
            if part.is_empty() {
                // A single trailing separator is tolerated (directory-style
                // patterns); anything in the middle is a hard error.
                if i + 1 == without_drive.split(PATH_SEPARATORS).count() {
                    continue;
                }
                return Err(PathError(format!(
                    "empty path segment in pattern \"{raw}\""
                )));
            }
            segments.push(GlobSegment::compile(part, case_sensitive)?);
        }

        Ok(PathPattern {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if no segment contains glob metacharacters: such a pattern
    /// matches exactly one entry path.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| !s.is_wildcard())
    }

    /// Renders the literal path this pattern would match, joined with `/`.
    /// Only meaningful when `is_literal()` is true.
    pub fn literal_path(&self) -> String {
        self.segments
            .iter()
            .map(GlobSegment::literal_text)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Matches a full partition-relative path (not just a leaf name) against
    /// this pattern, segment by segment. Used by the `requires` gate, which
    /// tests a dispatch-time pattern against paths in the successful-
    /// extraction set rather than against entry names during a resolver walk.
    pub fn matches_path(&self, path: &str) -> bool {
        let components = split_components(path);
        if components.len() != self.segments.len() {
            return false;
        }
        components
            .iter()
            .zip(self.segments.iter())
            .all(|(c, seg)| seg.matches(c))
    }
}

fn strip_drive_prefix(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[2..]
    } else {
        path
    }
}

/// Splits a raw, partition-relative path on either separator, dropping
/// empty components. Used by the resolver and the username-derivation
/// helper, which both want plain path components rather than compiled
/// glob segments.
pub fn split_components(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATORS).filter(|s| !s.is_empty()).collect()
}

/// Joins components with the forward-slash convention used for
/// partition-relative paths throughout this crate (the host-path
/// conversion is handled separately by the `PATH()` expander function).
pub fn join_components(components: &[&str]) -> String {
    components.join("/")
}
