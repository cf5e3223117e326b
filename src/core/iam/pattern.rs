//! Resource pattern matching
//!
//! Rules address resources through their canonical path,
//! `/<kind-segment>/<id>` (for example `/storage/dataedu-raw-123`).
//!
//! Supports wildcards:
//! - `*` - Matches exactly one path segment (e.g., `/storage/*`)
//! - `**` - Matches any number of segments (e.g., `/**`)
//! - `*` inside a segment - glob within that segment (e.g., `/storage/dataedu-*`)

use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Glob(String),
    One,
    Any,
}

/// A parsed resource pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl ResourcePattern {
    /// Parse a pattern, rejecting malformed ones
    ///
    /// A pattern must be absolute and must not contain empty segments;
    /// `**` is only valid as a whole segment.
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(PolicyError::Validation(format!(
                "resource pattern '{}' must start with '/'",
                pattern
            )));
        }

        let body = pattern.trim_start_matches('/');
        if body.is_empty() {
            return Err(PolicyError::Validation(
                "resource pattern cannot be the bare root '/'".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for part in body.split('/') {
            let segment = match part {
                "" => {
                    return Err(PolicyError::Validation(format!(
                        "resource pattern '{}' has an empty segment",
                        pattern
                    )))
                }
                "**" => Segment::Any,
                "*" => Segment::One,
                p if p.contains("**") => {
                    return Err(PolicyError::Validation(format!(
                        "'**' must be a whole segment in '{}'",
                        pattern
                    )))
                }
                p if p.contains('*') => Segment::Glob(p.to_string()),
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(ResourcePattern {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern names exactly one path
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Check a canonical resource path against this pattern
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        Self::match_parts(&self.segments, &parts)
    }

    fn match_parts(pattern: &[Segment], path: &[&str]) -> bool {
        match pattern.split_first() {
            None => path.is_empty(),
            Some((Segment::Any, rest)) => {
                (0..=path.len()).any(|skip| Self::match_parts(rest, &path[skip..]))
            }
            Some((segment, rest)) => match path.split_first() {
                None => false,
                Some((head, tail)) => {
                    let ok = match segment {
                        Segment::Literal(lit) => lit == head,
                        Segment::Glob(glob) => glob_match(glob, head),
                        Segment::One => true,
                        Segment::Any => unreachable!(),
                    };
                    ok && Self::match_parts(rest, tail)
                }
            },
        }
    }
}

impl std::fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Stateless helper for one-off matches
pub struct PatternMatcher;

impl PatternMatcher {
    /// Check if a resource path matches a pattern
    ///
    /// Malformed patterns never match.
    ///
    /// # Examples
    /// ```
    /// use infra_policy::iam::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("/storage/*", "/storage/dataedu-raw-1"));
    /// assert!(PatternMatcher::matches("/**", "/job/dataedu-fetch-demo-data"));
    /// assert!(!PatternMatcher::matches("/storage/*", "/key/dataedu-key"));
    /// ```
    pub fn matches(pattern: &str, path: &str) -> bool {
        ResourcePattern::parse(pattern)
            .map(|p| p.matches(path))
            .unwrap_or(false)
    }
}

/// Glob match with `*` wildcards (no other metacharacters)
///
/// Used for in-segment resource globs, role name patterns and
/// `StringLike` conditions.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }

    // the suffix must not overlap what the prefix and middle parts consumed
    text.len() >= pos + last.len() && text.ends_with(last)
}
