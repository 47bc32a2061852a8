//! Matcher construction and sharing.
//!
//! # Responsibilities
//! - `build_*` functions: compile one matcher and tag it with a caller id
//! - `MatcherCache`: reuse compiled matchers across deployments, keyed by
//!   their source text, and hand out ids
//!
//! # Design Decisions
//! - Compiled matchers are immutable, so sharing one `Arc` between every
//!   descriptor that declares the same pattern is safe
//! - The cache holds one strong reference per entry; `evict_unused` drops
//!   entries no descriptor holds any more, so undeployed patterns go away

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::routing::error::PatternError;
use crate::routing::headers::{HeaderPattern, ResponseHeaderWriter, ResponseSlot, ScratchKind};
use crate::routing::path::PathPattern;
use crate::routing::query::QueryPattern;

/// Compile a path pattern.
pub fn build_path_parser(id: u32, pattern: &str) -> Result<PathPattern, PatternError> {
    PathPattern::compile_with_id(id, pattern)
}

/// Compile a query matcher from `key=` prefixes.
pub fn build_query_parser<S: AsRef<str>>(id: u32, names: &[S]) -> Result<QueryPattern, PatternError> {
    QueryPattern::compile_with_id(id, names)
}

/// Compile a request header extractor.
pub fn build_request_head_parser<S: AsRef<str>>(id: u32, names: &[S]) -> Result<HeaderPattern, PatternError> {
    HeaderPattern::compile_with_id(id, names)
}

/// Compile a response header setter.
pub fn build_response_head_setter(id: u32, slots: &[ResponseSlot]) -> Result<ResponseHeaderWriter, PatternError> {
    ResponseHeaderWriter::compile_with_id(id, slots)
}

/// Shared store of compiled matchers.
#[derive(Debug, Default)]
pub struct MatcherCache {
    next_id: AtomicU32,
    paths: DashMap<String, Arc<PathPattern>>,
    queries: DashMap<String, Arc<QueryPattern>>,
    headers: DashMap<String, Arc<HeaderPattern>>,
    writers: DashMap<String, Arc<ResponseHeaderWriter>>,
}

impl MatcherCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn path(&self, pattern: &str) -> Result<Arc<PathPattern>, PatternError> {
        if let Some(found) = self.paths.get(pattern) {
            return Ok(found.clone());
        }
        let compiled = Arc::new(build_path_parser(self.next_id(), pattern)?);
        Ok(self
            .paths
            .entry(pattern.to_string())
            .or_insert(compiled)
            .clone())
    }

    pub fn query<S: AsRef<str>>(&self, names: &[S]) -> Result<Arc<QueryPattern>, PatternError> {
        let key = join_key(names);
        if let Some(found) = self.queries.get(&key) {
            return Ok(found.clone());
        }
        let compiled = Arc::new(build_query_parser(self.next_id(), names)?);
        Ok(self.queries.entry(key).or_insert(compiled).clone())
    }

    pub fn request_headers<S: AsRef<str>>(&self, names: &[S]) -> Result<Arc<HeaderPattern>, PatternError> {
        let key = join_key(names).to_ascii_lowercase();
        if let Some(found) = self.headers.get(&key) {
            return Ok(found.clone());
        }
        let compiled = Arc::new(build_request_head_parser(self.next_id(), names)?);
        Ok(self.headers.entry(key).or_insert(compiled).clone())
    }

    pub fn response_headers(&self, slots: &[ResponseSlot]) -> Result<Arc<ResponseHeaderWriter>, PatternError> {
        let key = slots
            .iter()
            .map(|slot| match &slot.kind {
                ScratchKind::Text => format!("t:{}", slot.name),
                ScratchKind::List => format!("l:{}", slot.name),
                ScratchKind::Record { fields } => format!("r:{}", fields.join(",")),
            })
            .collect::<Vec<_>>()
            .join("\u{1f}");
        if let Some(found) = self.writers.get(&key) {
            return Ok(found.clone());
        }
        let compiled = Arc::new(build_response_head_setter(self.next_id(), slots)?);
        Ok(self.writers.entry(key).or_insert(compiled).clone())
    }

    /// Drop every matcher that only the cache still references. Returns how
    /// many were dropped.
    pub fn evict_unused(&self) -> usize {
        let before = self.len();
        self.paths.retain(|_, m| Arc::strong_count(m) > 1);
        self.queries.retain(|_, m| Arc::strong_count(m) > 1);
        self.headers.retain(|_, m| Arc::strong_count(m) > 1);
        self.writers.retain(|_, m| Arc::strong_count(m) > 1);
        before.saturating_sub(self.len())
    }

    /// Number of distinct compiled matchers held.
    pub fn len(&self) -> usize {
        self.paths.len() + self.queries.len() + self.headers.len() + self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Unit separator cannot appear in a valid query key or header name.
fn join_key<S: AsRef<str>>(names: &[S]) -> String {
    names.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\u{1f}")
}
