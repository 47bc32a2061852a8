//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile a route pattern (`users/{id}/files/*`) into an ordered token list
//! - Match a request path segment by segment, writing captures into a
//!   caller-owned buffer
//!
//! # Design Decisions
//! - No regex: one pass over the path, one comparison per segment
//! - A capture consumes exactly one segment, which may be empty
//! - The wildcard must be the last token and takes the whole remaining tail,
//!   embedded `/` included, but needs at least one segment left to consume
//! - Compiled patterns are immutable and shared freely between requests

use crate::routing::error::PatternError;

/// One compiled segment of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Segment must equal this text exactly.
    Literal(String),
    /// Segment is captured. Holds the name written between the braces.
    Capture(String),
    /// Remaining tail is captured.
    Wildcard,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    id: u32,
    source: String,
    tokens: Vec<Token>,
    capture_count: usize,
}

impl PathPattern {
    /// Compile `pattern`. A single leading `/` is ignored.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        Self::compile_with_id(0, pattern)
    }

    pub(crate) fn compile_with_id(id: u32, pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        if trimmed.is_empty() {
            return Err(PatternError::EmptyPath);
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        let wildcards = segments.iter().filter(|s| **s == "*").count();
        if wildcards > 1 {
            return Err(PatternError::DuplicateWildcard { pattern: pattern.to_string() });
        }
        if wildcards == 1 && segments.last() != Some(&"*") {
            return Err(PatternError::WildcardNotLast { pattern: pattern.to_string() });
        }

        let mut tokens = Vec::with_capacity(segments.len());
        for segment in segments {
            let token = if segment == "*" {
                Token::Wildcard
            } else if segment.starts_with('{') && segment.ends_with('}') && segment.len() >= 2 {
                let name = &segment[1..segment.len() - 1];
                if name.contains(['{', '}']) {
                    return Err(PatternError::MalformedCapture {
                        pattern: pattern.to_string(),
                        segment: segment.to_string(),
                    });
                }
                Token::Capture(name.to_string())
            } else if segment.contains(['{', '}']) {
                return Err(PatternError::MalformedCapture {
                    pattern: pattern.to_string(),
                    segment: segment.to_string(),
                });
            } else {
                Token::Literal(segment.to_string())
            };
            tokens.push(token);
        }

        let capture_count = tokens
            .iter()
            .filter(|t| !matches!(t, Token::Literal(_)))
            .count();

        Ok(Self {
            id,
            source: pattern.to_string(),
            tokens,
            capture_count,
        })
    }

    /// Match `path` (without a leading `/`) against this pattern.
    ///
    /// Captures are written into `captures[offset..offset + capture_count()]`.
    /// Returns the number of captures written, or `None` when the path does not
    /// match or the buffer is too small to hold every capture. Slots may have
    /// been overwritten even when the match ultimately fails.
    pub fn matches(&self, path: &str, captures: &mut [Option<String>], offset: usize) -> Option<usize> {
        if captures.len() < offset + self.capture_count {
            return None;
        }

        let mut rest = Some(path);
        let mut written = 0;

        for token in &self.tokens {
            let current = rest?;

            if let Token::Wildcard = token {
                captures[offset + written] = Some(current.to_string());
                return Some(written + 1);
            }

            let (segment, tail) = match current.find('/') {
                Some(pos) => (&current[..pos], Some(&current[pos + 1..])),
                None => (current, None),
            };

            match token {
                Token::Literal(text) => {
                    if text != segment {
                        return None;
                    }
                }
                Token::Capture(_) => {
                    captures[offset + written] = Some(segment.to_string());
                    written += 1;
                }
                Token::Wildcard => {}
            }
            rest = tail;
        }

        // Without a wildcard the input must not have segments left over.
        if rest.is_some() {
            None
        } else {
            Some(written)
        }
    }

    /// Number of capture slots this pattern writes on a successful match.
    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Capture names in slot order. The wildcard slot is named `*`.
    pub fn capture_names(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Capture(name) => Some(name.as_str()),
                Token::Wildcard => Some("*"),
                Token::Literal(_) => None,
            })
            .collect()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Vec<Option<String>> {
        vec![None; 10]
    }

    #[test]
    fn test_literal_patterns() {
        let mut target = buffer();
        let pp1 = PathPattern::compile("path").unwrap();
        assert_eq!(pp1.matches("path", &mut target, 0), Some(0));
        assert_eq!(pp1.matches("pat", &mut target, 0), None);
        assert_eq!(pp1.matches("path1", &mut target, 0), None);

        let pp2 = PathPattern::compile("path/path").unwrap();
        assert_eq!(pp2.matches("path/path", &mut target, 0), Some(0));
        assert_eq!(pp2.matches("pat/path", &mut target, 0), None);
        assert_eq!(pp2.matches("path1/path", &mut target, 0), None);
        assert_eq!(pp2.matches("path/pat", &mut target, 0), None);
        assert_eq!(pp2.matches("path/path1", &mut target, 0), None);
        assert_eq!(pp2.matches("path", &mut target, 0), None);
        assert_eq!(pp2.matches("path/path/path", &mut target, 0), None);
    }

    #[test]
    fn test_capture_takes_one_segment() {
        let mut target = buffer();
        let pp = PathPattern::compile("{value}").unwrap();

        assert_eq!(pp.matches("ten", &mut target, 0), Some(1));
        assert_eq!(target[0].as_deref(), Some("ten"));
        assert_eq!(pp.matches("", &mut target, 0), Some(1));
        assert_eq!(target[0].as_deref(), Some(""));
        assert_eq!(pp.matches("ten/", &mut target, 0), None);
        assert_eq!(pp.matches("ten/path", &mut target, 0), None);
    }

    #[test]
    fn test_wildcard_takes_tail() {
        let mut target = buffer();
        let pp = PathPattern::compile("path/*").unwrap();

        assert_eq!(pp.matches("path", &mut target, 0), None);
        assert_eq!(pp.matches("path/first", &mut target, 0), Some(1));
        assert_eq!(target[0].as_deref(), Some("first"));
        assert_eq!(pp.matches("path/first/second", &mut target, 0), Some(1));
        assert_eq!(target[0].as_deref(), Some("first/second"));
    }

    #[test]
    fn test_mixed_pattern() {
        let mut target = buffer();
        let pp = PathPattern::compile("path/{name}/path/*").unwrap();
        assert_eq!(pp.capture_count(), 2);
        assert_eq!(pp.capture_names(), vec!["name", "*"]);

        assert_eq!(pp.matches("path", &mut target, 0), None);
        assert_eq!(pp.matches("path/text/pat", &mut target, 0), None);
        assert_eq!(pp.matches("path/text/path", &mut target, 0), None);
        assert_eq!(pp.matches("path/text/path/tail", &mut target, 0), Some(2));
        assert_eq!(target[0].as_deref(), Some("text"));
        assert_eq!(target[1].as_deref(), Some("tail"));
    }

    #[test]
    fn test_offset_writes() {
        let mut target = buffer();
        let pp = PathPattern::compile("/a/{x}/{y}").unwrap();
        assert_eq!(pp.matches("a/1/2", &mut target, 3), Some(2));
        assert_eq!(target[2], None);
        assert_eq!(target[3].as_deref(), Some("1"));
        assert_eq!(target[4].as_deref(), Some("2"));

        let mut small = vec![None; 1];
        assert_eq!(pp.matches("a/1/2", &mut small, 0), None);
    }

    #[test]
    fn test_own_instantiation_matches() {
        let patterns = [
            "a/{b}/c",
            "{x}/{y}/{z}",
            "static/only/segments",
            "users/{id}/files/{file}/meta",
        ];

        for pattern in patterns {
            let pp = PathPattern::compile(pattern).unwrap();
            let instance = pattern.replace('{', "v").replace('}', "");
            let mut target = buffer();
            assert_eq!(pp.matches(&instance, &mut target, 0), Some(pp.capture_count()), "{pattern}");

            // Perturb the first literal segment.
            if let Some(Token::Literal(text)) = pp.tokens().iter().find(|t| matches!(t, Token::Literal(_))) {
                let broken = instance.replacen(text.as_str(), &format!("{text}_"), 1);
                assert_eq!(pp.matches(&broken, &mut target, 0), None, "{pattern}");
            }
        }
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(PathPattern::compile("").unwrap_err(), PatternError::EmptyPath);
        assert_eq!(PathPattern::compile("/").unwrap_err(), PatternError::EmptyPath);
        assert!(matches!(
            PathPattern::compile("a/*/b"),
            Err(PatternError::WildcardNotLast { .. })
        ));
        assert!(matches!(
            PathPattern::compile("*/*"),
            Err(PatternError::DuplicateWildcard { .. })
        ));
        assert!(matches!(
            PathPattern::compile("a/{b"),
            Err(PatternError::MalformedCapture { .. })
        ));
    }
}
