//! MIME type parsing and wildcard compatibility.
//!
//! # Design Decisions
//! - A media type is just `(type, subtype)`, lowercased, parameters dropped
//! - `*` in either position matches any value in that position, on either side
//! - An empty declared set means "anything", including no type at all

use std::fmt;
use std::str::FromStr;

use crate::routing::error::PatternError;

/// A parsed `type/subtype` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    kind: String,
    subtype: String,
}

impl MediaType {
    pub fn new(kind: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
        }
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// True when neither position is a wildcard.
    pub fn is_concrete(&self) -> bool {
        self.kind != "*" && self.subtype != "*"
    }

    /// Wildcard-aware equality.
    pub fn matches(&self, other: &MediaType) -> bool {
        position_matches(&self.kind, &other.kind) && position_matches(&self.subtype, &other.subtype)
    }
}

fn position_matches(left: &str, right: &str) -> bool {
    left == "*" || right == "*" || left == right
}

impl FromStr for MediaType {
    type Err = PatternError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        if essence == "*" {
            return Ok(Self::any());
        }

        let invalid = || PatternError::InvalidMediaType { value: value.to_string() };
        let (kind, subtype) = essence.split_once('/').ok_or_else(invalid)?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(invalid());
        }
        if kind.contains(char::is_whitespace) || subtype.contains(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self::new(kind, subtype))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Parse a list of media types, failing on the first malformed entry.
pub fn parse_set<S: AsRef<str>>(values: &[S]) -> Result<Vec<MediaType>, PatternError> {
    values.iter().map(|v| v.as_ref().parse()).collect()
}

/// Parse an `Accept` header value. Absent or empty means `*/*`; malformed
/// entries are skipped.
pub fn parse_accept(value: Option<&str>) -> Vec<MediaType> {
    let parsed: Vec<MediaType> = value
        .unwrap_or_default()
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| entry.parse().ok())
        .collect();

    if parsed.is_empty() {
        vec![MediaType::any()]
    } else {
        parsed
    }
}

/// Whether `observed` is acceptable for a route declaring `declared`.
pub fn is_compatible(declared: &[MediaType], observed: Option<&MediaType>) -> bool {
    if declared.is_empty() {
        return true;
    }
    match observed {
        Some(observed) => declared.iter().any(|d| d.matches(observed)),
        None => false,
    }
}

/// Whether any produced type satisfies any accepted type. A route that
/// declares no produced types can answer any client.
pub fn intersects(produced: &[MediaType], accepted: &[MediaType]) -> bool {
    if produced.is_empty() {
        return true;
    }
    accepted.iter().any(|a| is_compatible(produced, Some(a)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mt(value: &str) -> MediaType {
        value.parse().unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(mt("Text/Plain; charset=UTF-8"), MediaType::new("text", "plain"));
        assert_eq!(mt("*"), MediaType::any());
        assert!("text".parse::<MediaType>().is_err());
        assert!("text/".parse::<MediaType>().is_err());
        assert!("a/b/c".parse::<MediaType>().is_err());
        assert!("".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_empty_set_accepts_anything() {
        assert!(is_compatible(&[], None));
        assert!(is_compatible(&[], Some(&mt("text/html"))));
    }

    #[test]
    fn test_declared_set() {
        let declared = vec![mt("text/plain")];
        assert!(!is_compatible(&declared, None));
        assert!(!is_compatible(&declared, Some(&mt("text/html"))));
        assert!(is_compatible(&declared, Some(&mt("text/plain"))));
        assert!(is_compatible(&declared, Some(&mt("text/*"))));
        assert!(is_compatible(&[mt("text/*")], Some(&mt("text/html"))));
        assert!(!is_compatible(&[mt("text/*")], Some(&mt("application/json"))));
    }

    #[test]
    fn test_intersects_with_accept_list() {
        let produced = vec![mt("application/json")];
        assert!(intersects(&produced, &parse_accept(None)));
        assert!(intersects(&produced, &parse_accept(Some("text/html, application/*;q=0.8"))));
        assert!(!intersects(&produced, &parse_accept(Some("text/html"))));
        assert!(intersects(&[], &parse_accept(Some("text/html"))));
    }

    #[test]
    fn test_accept_skips_garbage() {
        let accepted = parse_accept(Some("garbage, text/plain"));
        assert_eq!(accepted, vec![mt("text/plain")]);
        assert_eq!(parse_accept(Some("garbage")), vec![MediaType::any()]);
    }
}
