//! Retrieval collaborator abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use concierge_core::RetrievedDocument;

/// Errors from the retrieval collaborator.
#[derive(Error, Debug, Clone)]
pub enum RetrievalError {
    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval query rejected: {0}")]
    InvalidQuery(String),
}

/// Metadata filters for a retrieval query.
///
/// Ordered so equal filter sets hash and print identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalFilters(BTreeMap<String, String>);

impl RetrievalFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert only when a value is present.
    pub fn with_opt(self, key: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Source of reference passages.
///
/// An empty result is a valid outcome, not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_skip_missing_values() {
        let filters = RetrievalFilters::new()
            .with_opt("specialty", Some("cardiology"))
            .with_opt("location", None);
        assert_eq!(filters.get("specialty"), Some("cardiology"));
        assert_eq!(filters.get("location"), None);
        assert!(!filters.is_empty());
    }

    #[test]
    fn test_filters_equal_regardless_of_order() {
        let a = RetrievalFilters::new().with("a", "1").with("b", "2");
        let b = RetrievalFilters::new().with("b", "2").with("a", "1");
        assert_eq!(a, b);
    }
}
