//! Vector-similarity store.
//!
//! [`VectorStore`] is the capability the memory layer talks to.
//! [`VectorIndex`] is an in-memory implementation using brute-force cosine
//! similarity, which is fine for moderate dataset sizes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use concierge_core::error::ConciergeError;

/// Metadata equality filter. Every key must be present in an entry's
/// metadata with an equal value for the entry to match. An empty filter
/// matches everything.
pub type MetadataFilter = Map<String, Value>;

/// A single ranked match returned from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity between the query and the stored vector.
    pub score: f64,
    pub metadata: Value,
}

/// Upsert/query interface of a vector-similarity store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector stored under `id`.
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Value) -> Result<(), ConciergeError>;

    /// The `top_k` nearest entries matching `filter`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, ConciergeError>;
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    metadata: Value,
}

/// In-memory vector index using brute-force cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<String, VectorEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a vector with metadata, overwriting any entry with the same id.
    pub fn insert(&self, id: &str, embedding: Vec<f32>, metadata: Value) -> Result<(), ConciergeError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| ConciergeError::VectorStore(format!("Lock poisoned: {}", e)))?;
        entries.insert(id.to_string(), VectorEntry { embedding, metadata });
        Ok(())
    }

    /// k nearest neighbours among entries matching `filter`, by descending
    /// cosine similarity.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, ConciergeError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| ConciergeError::VectorStore(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, entry)| matches_filter(&entry.metadata, filter))
            .map(|(id, entry)| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(query, &entry.embedding),
                metadata: entry.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for VectorIndex {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Value) -> Result<(), ConciergeError> {
        self.insert(id, vector, metadata)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, ConciergeError> {
        self.search(vector, top_k, filter)
    }
}

fn matches_filter(metadata: &Value, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Cosine similarity of two vectors; 0.0 when lengths differ or either
/// vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer_filter(id: &str) -> MetadataFilter {
        let mut filter = MetadataFilter::new();
        filter.insert("customer_id".to_string(), json!(id));
        filter
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new();
        index
            .insert("a", vec![1.0, 0.0], json!({"customer_id": "c-1"}))
            .unwrap();
        index
            .insert("b", vec![0.0, 1.0], json!({"customer_id": "c-1"}))
            .unwrap();

        let hits = index.search(&[1.0, 0.1], 5, &MetadataFilter::new()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_filter_scopes_to_customer() {
        let index = VectorIndex::new();
        index
            .insert("mine", vec![1.0, 0.0], json!({"customer_id": "c-1"}))
            .unwrap();
        index
            .insert("theirs", vec![1.0, 0.0], json!({"customer_id": "c-2"}))
            .unwrap();
        index.insert("untagged", vec![1.0, 0.0], json!({})).unwrap();

        let hits = index.search(&[1.0, 0.0], 10, &customer_filter("c-1")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mine");
    }

    #[test]
    fn test_upsert_overwrites() {
        let index = VectorIndex::new();
        index.insert("a", vec![1.0, 0.0], json!({"v": 1})).unwrap();
        index.insert("a", vec![0.0, 1.0], json!({"v": 2})).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&[0.0, 1.0], 1, &MetadataFilter::new()).unwrap();
        assert_eq!(hits[0].metadata, json!({"v": 2}));
    }

    #[test]
    fn test_search_respects_k_limit() {
        let index = VectorIndex::new();
        for i in 0..10 {
            index
                .insert(&format!("m-{}", i), vec![1.0; 4], json!({}))
                .unwrap();
        }
        let hits = index.search(&[1.0; 4], 3, &MetadataFilter::new()).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_store_trait_on_empty_index() {
        let store: Arc<dyn VectorStore> = Arc::new(VectorIndex::new());
        let hits = store.query(&[1.0; 4], 5, &customer_filter("c-1")).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_store_trait_roundtrip() {
        let store = VectorIndex::new();
        store
            .upsert("m-1", vec![0.6, 0.8], json!({"customer_id": "c-1", "content": "hi"}))
            .await
            .unwrap();
        let hits = store.query(&[0.6, 0.8], 5, &customer_filter("c-1")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].metadata["content"], "hi");
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0; 3], &[1.0; 3]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0; 3], &[1.0; 4]), 0.0);
    }
}
