//! Memoisation of retrieval results.
//!
//! Specialists often see the same query with the same filters in quick
//! succession. Results are kept in a bounded TTL cache so repeated lookups
//! skip the knowledge base.

use moka::future::Cache;
use std::time::Duration;

use concierge_core::{RetrievedDocument, SpecialistId};

use crate::config::RetrievalConfig;
use crate::retrieval::RetrievalFilters;

/// Cache key for a retrieval call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RetrievalKey {
    specialist: SpecialistId,
    query: String,
    filters: RetrievalFilters,
}

impl RetrievalKey {
    pub fn new(specialist: SpecialistId, query: &str, filters: &RetrievalFilters) -> Self {
        Self {
            specialist,
            query: query.trim().to_lowercase(),
            filters: filters.clone(),
        }
    }
}

/// Retrieval cache using moka.
pub struct RetrievalCache {
    cache: Cache<RetrievalKey, Vec<RetrievedDocument>>,
}

impl RetrievalCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl)
    }

    pub async fn get(&self, key: &RetrievalKey) -> Option<Vec<RetrievedDocument>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: RetrievalKey, documents: Vec<RetrievedDocument>) {
        self.cache.insert(key, documents).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for RetrievalCache {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_operations() {
        let cache = RetrievalCache::default();
        let filters = RetrievalFilters::new().with("policy_id", "TH-HMO-GOLD-2024");
        let key = RetrievalKey::new(SpecialistId::Policy, "What is my deductible?", &filters);

        assert!(cache.get(&key).await.is_none());

        let docs = vec![RetrievedDocument::new("Deductible: $500", 0.91)];
        cache.insert(key.clone(), docs.clone()).await;

        let same = RetrievalKey::new(SpecialistId::Policy, "  what is my deductible?", &filters);
        assert_eq!(cache.get(&same).await, Some(docs));
    }

    #[tokio::test]
    async fn test_key_separates_specialists_and_filters() {
        let cache = RetrievalCache::default();
        let filters = RetrievalFilters::new().with("location", "Boston");
        let key = RetrievalKey::new(SpecialistId::Provider, "cardiologist", &filters);
        cache
            .insert(key, vec![RetrievedDocument::new("Dr. Chen", 0.8)])
            .await;

        let other_specialist = RetrievalKey::new(SpecialistId::Policy, "cardiologist", &filters);
        let other_filters =
            RetrievalKey::new(SpecialistId::Provider, "cardiologist", &RetrievalFilters::new());
        assert!(cache.get(&other_specialist).await.is_none());
        assert!(cache.get(&other_filters).await.is_none());
    }
}
