//! Query-string parameter extraction.
//!
//! A `QueryPattern` is compiled from an ordered list of key prefixes, each
//! ending in `=` (`"page="`, `"size="`). Matching never fails: every slot is
//! either filled from the raw query or left empty.

use crate::routing::error::PatternError;

/// Compiled query-parameter matcher.
#[derive(Debug, Clone)]
pub struct QueryPattern {
    id: u32,
    prefixes: Vec<String>,
}

impl QueryPattern {
    /// Compile a list of `key=` prefixes.
    pub fn compile<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, PatternError> {
        Self::compile_with_id(0, prefixes)
    }

    pub(crate) fn compile_with_id<S: AsRef<str>>(id: u32, prefixes: &[S]) -> Result<Self, PatternError> {
        if prefixes.is_empty() {
            return Err(PatternError::EmptyParameters);
        }

        let mut compiled = Vec::with_capacity(prefixes.len());
        for (index, prefix) in prefixes.iter().enumerate() {
            let prefix = prefix.as_ref();
            if prefix.is_empty() {
                return Err(PatternError::EmptyParameter { index });
            }
            if prefix.len() < 2 || !prefix.ends_with('=') {
                return Err(PatternError::MalformedQueryPrefix {
                    index,
                    name: prefix.to_string(),
                });
            }
            compiled.push(prefix.to_string());
        }

        Ok(Self { id, prefixes: compiled })
    }

    /// Fill `captures[offset..offset + slot_count()]` from `raw_query`.
    ///
    /// For each registered prefix the first `&`-separated pair starting with
    /// it wins. Unregistered keys are ignored and unmatched slots are set to
    /// `None`. Always returns the slot count.
    ///
    /// # Panics
    /// If `captures` is shorter than `offset + slot_count()`.
    pub fn matches(&self, raw_query: Option<&str>, captures: &mut [Option<String>], offset: usize) -> usize {
        let slots = &mut captures[offset..offset + self.prefixes.len()];
        slots.iter_mut().for_each(|slot| *slot = None);

        let Some(query) = raw_query else {
            return self.prefixes.len();
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            for (index, prefix) in self.prefixes.iter().enumerate() {
                if slots[index].is_none() {
                    if let Some(value) = pair.strip_prefix(prefix.as_str()) {
                        slots[index] = Some(value.to_string());
                        break;
                    }
                }
            }
        }

        self.prefixes.len()
    }

    pub fn slot_count(&self) -> usize {
        self.prefixes.len()
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> QueryPattern {
        QueryPattern::compile(&["parm1=", "parm2=", "parm3="]).unwrap()
    }

    #[test]
    fn test_out_of_order_pairs() {
        let mut target = vec![None; 3];
        assert_eq!(pattern().matches(Some("parm2=value2&parm1=value1"), &mut target, 0), 3);
        assert_eq!(target, vec![Some("value1".into()), Some("value2".into()), None]);
    }

    #[test]
    fn test_unregistered_key_ignored() {
        let mut target = vec![None; 3];
        assert_eq!(pattern().matches(Some("parm0=value0&parm3=value3"), &mut target, 0), 3);
        assert_eq!(target, vec![None, None, Some("value3".into())]);
    }

    #[test]
    fn test_empty_query_resets_slots() {
        let mut target = vec![Some("stale".to_string()); 4];
        assert_eq!(pattern().matches(None, &mut target, 1), 3);
        assert_eq!(target[0].as_deref(), Some("stale"));
        assert!(target[1..].iter().all(Option::is_none));

        assert_eq!(pattern().matches(Some(""), &mut target, 1), 3);
        assert!(target[1..].iter().all(Option::is_none));
    }

    #[test]
    fn test_first_pair_wins_and_keys_are_case_sensitive() {
        let mut target = vec![None; 3];
        pattern().matches(Some("PARM1=upper&parm1=first&parm1=second&parm2="), &mut target, 0);
        assert_eq!(target[0].as_deref(), Some("first"));
        assert_eq!(target[1].as_deref(), Some(""));
    }

    #[test]
    fn test_compile_errors() {
        let empty: [&str; 0] = [];
        assert_eq!(QueryPattern::compile(&empty).unwrap_err(), PatternError::EmptyParameters);
        assert_eq!(
            QueryPattern::compile(&["a=", ""]).unwrap_err(),
            PatternError::EmptyParameter { index: 1 }
        );
        assert!(matches!(
            QueryPattern::compile(&["a"]),
            Err(PatternError::MalformedQueryPrefix { index: 0, .. })
        ));
        assert!(matches!(
            QueryPattern::compile(&["ab"]),
            Err(PatternError::MalformedQueryPrefix { .. })
        ));
        assert!(matches!(
            QueryPattern::compile(&["="]),
            Err(PatternError::MalformedQueryPrefix { .. })
        ));
    }
}
