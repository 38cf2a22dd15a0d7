// src/path/glob.rs
// License: PolyForm Noncommercial 1.0.0 (Personal & Research Use Only)
// Commercial use is strictly prohibited without a separate agreement.
// Redistribution is permitted provided this notice and license remain intact.

//! Compiles one path segment (never containing a separator) into a matcher.
//! Wildcard segments are translated into an anchored regex; literal
//! segments skip regex entirely and compare names directly, which keeps the
//! common case (most FileSpec patterns are mostly literal) cheap.

use super::PathError;

#[derive(Debug, Clone)]
pub enum GlobSegment {
    Literal {
        text: String,
        case_sensitive: bool,
    },
    Wildcard {
        text: String,
        re: regex::Regex,
    },
}

impl GlobSegment {
    pub fn compile(segment: &str, case_sensitive: bool) -> Result<Self, PathError> {
        if !contains_glob_metachar(segment) {
            return Ok(GlobSegment::Literal {
                text: segment.to_string(),
                case_sensitive,
            });
        }

        // 1. Literal escape: protect regex metacharacters that are not part
        //    of our glob vocabulary (dots, plus, parens, ...).
        let mut pattern = String::with_capacity(segment.len() * 2);
        let mut chars = segment.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                '[' => {
                    // Character class: copy through verbatim up to the
                    // closing bracket, which is already valid regex syntax.
                    pattern.push('[');
                    for c2 in chars.by_ref() {
                        pattern.push(c2);
                        if c2 == ']' {
                            break;
                        }
                    }
                }
                // Escape everything else that regex would treat specially.
                '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '\\' => {
                    pattern.push('\\');
                    pattern.push(c);
                }
                other => pattern.push(other),
            }
        }

        let re = regex::RegexBuilder::new(&format!("^{pattern}$"))
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| PathError(format!("bad glob \"{segment}\": {e}")))?;

        Ok(GlobSegment::Wildcard {
            text: segment.to_string(),
            re,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, GlobSegment::Wildcard { .. })
    }

    pub fn literal_text(&self) -> &str {
        match self {
            GlobSegment::Literal { text, .. } => text,
            GlobSegment::Wildcard { text, .. } => text,
        }
    }

    /// Matches a single path component (an entry's leaf name) against this
    /// segment.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            GlobSegment::Literal {
                text,
                case_sensitive,
            } => {
                if *case_sensitive {
                    text == name
                } else {
                    text.eq_ignore_ascii_case(name)
                }
            }
            GlobSegment::Wildcard { re, .. } => re.is_match(name),
        }
    }
}

fn contains_glob_metachar(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Standalone convenience used by the dispatcher's `filter` field, which is
/// a single bare glob (no separators) rather than a full `PathPattern`.
pub fn matches_leaf(glob: &str, name: &str, case_sensitive: bool) -> Result<bool, PathError> {
    let segment = GlobSegment::compile(glob, case_sensitive)?;
    Ok(segment.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segment_matches_exactly() {
        let seg = GlobSegment::compile("Desktop", true).unwrap();
        assert!(seg.matches("Desktop"));
        assert!(!seg.matches("desktop"));
    }

    #[test]
    fn case_insensitive_literal() {
        let seg = GlobSegment::compile("Desktop", false).unwrap();
        assert!(seg.matches("DESKTOP"));
    }

    #[test]
    fn star_matches_any_run() {
        let seg = GlobSegment::compile("*.ini", true).unwrap();
        assert!(seg.matches("desktop.ini"));
        assert!(!seg.matches("desktop.ini.bak"));
    }

    #[test]
    fn question_matches_one_char() {
        let seg = GlobSegment::compile("file?.txt", true).unwrap();
        assert!(seg.matches("file1.txt"));
        assert!(!seg.matches("file12.txt"));
    }

    #[test]
    fn bracket_class_matches_one_of() {
        let seg = GlobSegment::compile("file[12].txt", true).unwrap();
        assert!(seg.matches("file1.txt"));
        assert!(seg.matches("file2.txt"));
        assert!(!seg.matches("file3.txt"));
    }

    #[test]
    fn dot_is_literal_not_any_char() {
        let seg = GlobSegment::compile("a.b", true).unwrap();
        assert!(seg.matches("a.b"));
        assert!(!seg.matches("aXb"));
    }

    #[test]
    fn matches_leaf_helper() {
        assert!(matches_leaf("*.ini", "desktop.ini", true).unwrap());
        assert!(!matches_leaf("*.ini", "desktop.txt", true).unwrap());
    }
}
