//! Context memory.
//!
//! Owns three concerns: durable message storage with a semantic index
//! alongside it, customer-scoped similarity retrieval, and cache-first
//! profile reads with invalidate-after-write updates.
//!
//! A profile cache fill and a profile write for the same customer never
//! overlap, so a fill cannot put back a row that a write already replaced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use concierge_core::clock::Clock;
use concierge_core::config::ConciergeConfig;
use concierge_core::error::ConciergeError;
use concierge_core::types::{
    ContextItem, CustomerProfile, DegradedDependency, Message, ProfileUpdate,
};
use concierge_storage::cache::{profile_key, CacheStore};
use concierge_storage::codec::ContentCodec;
use concierge_storage::db::Database;
use concierge_storage::gate::KeyedGate;
use concierge_storage::repository::{MessageRepository, ProfileRepository};
use concierge_vector::embedding::DynEmbeddingService;
use concierge_vector::index::{MetadataFilter, VectorStore};

/// Tunables for [`ContextMemory`].
#[derive(Debug, Clone)]
pub struct MemorySettings {
    pub profile_ttl: Duration,
    pub embedding_timeout: Duration,
    pub vector_timeout: Duration,
}

impl MemorySettings {
    pub fn from_config(config: &ConciergeConfig) -> Self {
        Self {
            profile_ttl: config.cache.profile_ttl(),
            embedding_timeout: config.timeouts.embedding(),
            vector_timeout: config.timeouts.vector(),
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::from_config(&ConciergeConfig::default())
    }
}

pub struct ContextMemory {
    messages: MessageRepository,
    profiles: ProfileRepository,
    cache: Arc<dyn CacheStore>,
    embedder: Arc<dyn DynEmbeddingService>,
    vectors: Arc<dyn VectorStore>,
    clock: Arc<dyn Clock>,
    profile_gate: KeyedGate<String>,
    settings: MemorySettings,
}

impl ContextMemory {
    pub fn new(
        db: Arc<Database>,
        codec: ContentCodec,
        cache: Arc<dyn CacheStore>,
        embedder: Arc<dyn DynEmbeddingService>,
        vectors: Arc<dyn VectorStore>,
        clock: Arc<dyn Clock>,
        settings: MemorySettings,
    ) -> Self {
        Self {
            messages: MessageRepository::new(db.clone(), codec),
            profiles: ProfileRepository::new(db),
            cache,
            embedder,
            vectors,
            clock,
            profile_gate: KeyedGate::new(),
            settings,
        }
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Persist a message and index it for semantic retrieval.
    ///
    /// The durable insert is the only step whose failure is returned. If the
    /// embedding or the vector upsert fails afterwards, the message stays
    /// durably recorded but is not yet searchable, and the failure is logged.
    pub async fn store_message(
        &self,
        message: &Message,
        customer_id: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<(), ConciergeError> {
        self.messages.insert(message)?;

        let vector = match embedding {
            Some(v) => v,
            None => match self.embed(&message.content).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        dependency = ?DegradedDependency::VectorUpsert,
                        message_id = %message.id,
                        error = %e,
                        "Message stored without embedding"
                    );
                    return Ok(());
                }
            },
        };

        let metadata = vector_metadata(message, customer_id);
        let id = message.id.to_string();
        let upsert = tokio::time::timeout(
            self.settings.vector_timeout,
            self.vectors.upsert(&id, vector, metadata),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ConciergeError::timeout(
                "vector upsert",
                self.settings.vector_timeout.as_millis() as u64,
            ))
        });

        match upsert {
            Ok(()) => debug!(message_id = %message.id, "Message stored and indexed"),
            Err(e) => warn!(
                dependency = ?DegradedDependency::VectorUpsert,
                message_id = %message.id,
                error = %e,
                "Message stored but not indexed"
            ),
        }

        Ok(())
    }

    /// The most recent `limit` durable messages of a session, newest first.
    pub fn recent_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, ConciergeError> {
        self.messages.recent(session_id, limit)
    }

    /// Up to `limit` prior utterances of `customer_id` most similar to
    /// `query`, best first.
    ///
    /// Never fails. A blank query, a failed embedding, or a failed search
    /// all yield an empty list.
    pub async fn retrieve_context(
        &self,
        query: &str,
        customer_id: &str,
        limit: usize,
    ) -> Vec<ContextItem> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let start = Instant::now();

        let vector = match self.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    dependency = ?DegradedDependency::Retrieval,
                    customer_id,
                    error = %e,
                    "Query embedding failed, continuing without context"
                );
                return Vec::new();
            }
        };

        let mut filter = MetadataFilter::new();
        filter.insert("customer_id".to_string(), json!(customer_id));

        let search = tokio::time::timeout(
            self.settings.vector_timeout,
            self.vectors.query(&vector, limit, &filter),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ConciergeError::timeout(
                "vector query",
                self.settings.vector_timeout.as_millis() as u64,
            ))
        });

        let matches = match search {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    dependency = ?DegradedDependency::Retrieval,
                    customer_id,
                    error = %e,
                    "Vector search failed, continuing without context"
                );
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let items: Vec<ContextItem> = matches
            .into_iter()
            .map(|m| ContextItem {
                content: m.metadata["content"].as_str().unwrap_or_default().to_string(),
                timestamp: m.metadata["timestamp"]
                    .as_i64()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .unwrap_or(now),
                relevance_score: m.score,
                message_id: m.id,
                metadata: m.metadata,
            })
            .collect();

        debug!(
            customer_id,
            hits = items.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Context retrieved"
        );
        items
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ConciergeError> {
        tokio::time::timeout(self.settings.embedding_timeout, self.embedder.embed_boxed(text))
            .await
            .unwrap_or_else(|_| {
                Err(ConciergeError::timeout(
                    "embedding",
                    self.settings.embedding_timeout.as_millis() as u64,
                ))
            })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Overwrite the durable profile, then drop the cached copy.
    pub async fn update_profile(
        &self,
        customer_id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), ConciergeError> {
        let _guard = self.profile_gate.acquire(customer_id.to_string()).await;
        self.profiles.upsert(customer_id, update, self.clock.now())?;

        if let Err(e) = self.cache.del(&profile_key(customer_id)).await {
            warn!(
                customer_id,
                error = %e,
                "Profile cache invalidation failed"
            );
        }

        info!(customer_id, "Profile updated");
        Ok(())
    }

    /// Cache-first profile read. `Ok(None)` when the customer has no
    /// profile row.
    pub async fn get_profile(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerProfile>, ConciergeError> {
        let key = profile_key(customer_id);

        if let Some(profile) = self.cached_profile(&key, customer_id).await {
            return Ok(Some(profile));
        }

        let _guard = self.profile_gate.acquire(customer_id.to_string()).await;

        // A reader queued ahead of us may have filled it already.
        if let Some(profile) = self.cached_profile(&key, customer_id).await {
            return Ok(Some(profile));
        }

        let Some(profile) = self.profiles.find(customer_id)? else {
            return Ok(None);
        };

        match serde_json::to_string(&profile) {
            Ok(serialized) => {
                if let Err(e) = self
                    .cache
                    .set_ex(&key, serialized, self.settings.profile_ttl)
                    .await
                {
                    warn!(customer_id, error = %e, "Profile cache write failed");
                }
            }
            Err(e) => warn!(customer_id, error = %e, "Profile not cacheable"),
        }

        Ok(Some(profile))
    }

    async fn cached_profile(&self, key: &str, customer_id: &str) -> Option<CustomerProfile> {
        match self.cache.get(key).await {
            Ok(Some(cached)) => match serde_json::from_str::<CustomerProfile>(&cached) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(customer_id, error = %e, "Discarding unreadable cached profile");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(customer_id, error = %e, "Profile cache read failed");
                None
            }
        }
    }
}

/// Metadata stored alongside a message vector. Carries everything needed
/// to display a hit without a second durable lookup.
fn vector_metadata(message: &Message, customer_id: &str) -> Value {
    let mut metadata = json!({
        "customer_id": customer_id,
        "session_id": message.session_id.to_string(),
        "sender": message.sender.as_str(),
        "content": message.content,
        "timestamp": message.created_at.timestamp_millis(),
    });
    if let Some(sentiment) = message.sentiment {
        metadata["sentiment"] = json!(sentiment.as_str());
    }
    if let Some(intent) = message.intent {
        metadata["intent"] = json!(intent.as_str());
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_core::clock::ManualClock;
    use concierge_core::types::{Customer, Intent, Preferences, Sender, SessionRecord, SessionStatus};
    use concierge_storage::cache::MemoryCache;
    use concierge_storage::repository::{CustomerRepository, SessionRepository};
    use concierge_vector::embedding::MockEmbedding;
    use concierge_vector::index::{VectorIndex, VectorMatch};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    struct BrokenVectors;

    #[async_trait]
    impl VectorStore for BrokenVectors {
        async fn upsert(&self, _: &str, _: Vec<f32>, _: Value) -> Result<(), ConciergeError> {
            Err(ConciergeError::VectorStore("unavailable".to_string()))
        }

        async fn query(
            &self,
            _: &[f32],
            _: usize,
            _: &MetadataFilter,
        ) -> Result<Vec<VectorMatch>, ConciergeError> {
            Err(ConciergeError::VectorStore("unavailable".to_string()))
        }
    }

    /// Holds the first armed `set_ex` until the test resumes it.
    struct PausingCache {
        inner: MemoryCache,
        armed: AtomicBool,
        reached: Notify,
        resume: Notify,
    }

    #[async_trait]
    impl CacheStore for PausingCache {
        async fn get(&self, key: &str) -> Result<Option<String>, ConciergeError> {
            self.inner.get(key).await
        }

        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ConciergeError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            self.inner.set_ex(key, value, ttl).await
        }

        async fn del(&self, key: &str) -> Result<bool, ConciergeError> {
            self.inner.del(key).await
        }
    }

    struct Fixture {
        db: Arc<Database>,
        cache: Arc<MemoryCache>,
        vectors: Arc<VectorIndex>,
        memory: ContextMemory,
        session_id: Uuid,
    }

    fn seed(db: &Arc<Database>, customer_id: &str) -> Uuid {
        CustomerRepository::new(db.clone())
            .save(&Customer {
                id: customer_id.to_string(),
                email: format!("{}@example.com", customer_id),
                phone: None,
                first_name: None,
                last_name: None,
                created_at: Utc::now(),
            })
            .unwrap();
        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            channel: "web".to_string(),
            started_at: now,
            last_activity: now,
            ended_at: None,
            status: SessionStatus::Active,
        };
        SessionRepository::new(db.clone()).insert(&record).unwrap();
        record.id
    }

    fn fixture_with(vectors_override: Option<Arc<dyn VectorStore>>) -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let session_id = seed(&db, "c-1");
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let vectors = Arc::new(VectorIndex::new());
        let store = vectors_override.unwrap_or_else(|| vectors.clone() as Arc<dyn VectorStore>);
        let memory = ContextMemory::new(
            db.clone(),
            ContentCodec::plain(),
            cache.clone(),
            Arc::new(MockEmbedding::with_dimensions(32)),
            store,
            clock,
            MemorySettings::default(),
        );
        Fixture {
            db,
            cache,
            vectors,
            memory,
            session_id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(None)
    }

    // =========================================================================
    // store / retrieve
    // =========================================================================

    #[tokio::test]
    async fn test_store_message_indexes_with_customer_metadata() {
        let f = fixture();
        let mut msg = Message::new(f.session_id, Sender::Customer, "red wool scarf", Utc::now());
        msg.intent = Some(Intent::Browsing);
        f.memory.store_message(&msg, "c-1", None).await.unwrap();

        assert_eq!(f.vectors.len(), 1);
        let items = f.memory.retrieve_context("red wool scarf", "c-1", 5).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id, msg.id.to_string());
        assert_eq!(items[0].content, "red wool scarf");
        assert!((items[0].relevance_score - 1.0).abs() < 1e-6);
        assert_eq!(items[0].metadata["session_id"], f.session_id.to_string());
        assert_eq!(items[0].metadata["sender"], "customer");
        assert_eq!(items[0].metadata["intent"], "browsing");
        assert_eq!(
            items[0].timestamp.timestamp_millis(),
            msg.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_store_message_uses_supplied_embedding() {
        let f = fixture();
        let msg = Message::new(f.session_id, Sender::Assistant, "hello", Utc::now());
        f.memory
            .store_message(&msg, "c-1", Some(vec![0.5; 32]))
            .await
            .unwrap();

        let hits = f
            .vectors
            .search(&[0.5; 32], 1, &MetadataFilter::new())
            .unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_retrieve_scoped_to_customer() {
        let f = fixture();
        let other_session = seed(&f.db, "c-2");
        let mine = Message::new(f.session_id, Sender::Customer, "boots", Utc::now());
        let theirs = Message::new(other_session, Sender::Customer, "boots", Utc::now());
        f.memory.store_message(&mine, "c-1", None).await.unwrap();
        f.memory.store_message(&theirs, "c-2", None).await.unwrap();

        let items = f.memory.retrieve_context("boots", "c-1", 5).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id, mine.id.to_string());
    }

    #[tokio::test]
    async fn test_retrieve_empty_store_returns_empty() {
        let f = fixture();
        assert!(f.memory.retrieve_context("anything", "c-1", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_blank_query_returns_empty() {
        let f = fixture();
        let msg = Message::new(f.session_id, Sender::Customer, "boots", Utc::now());
        f.memory.store_message(&msg, "c-1", None).await.unwrap();
        assert!(f.memory.retrieve_context("   ", "c-1", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_vector_failure_is_absorbed() {
        let f = fixture_with(Some(Arc::new(BrokenVectors)));
        let msg = Message::new(f.session_id, Sender::Customer, "boots", Utc::now());

        f.memory.store_message(&msg, "c-1", None).await.unwrap();
        assert_eq!(f.memory.recent_messages(f.session_id, 10).unwrap().len(), 1);
        assert!(f.memory.retrieve_context("boots", "c-1", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_durable_failure_is_returned() {
        let f = fixture();
        let msg = Message::new(Uuid::new_v4(), Sender::Customer, "orphan", Utc::now());
        let err = f.memory.store_message(&msg, "c-1", None).await.unwrap_err();
        assert!(matches!(err, ConciergeError::NotFound(_)));
        assert!(f.vectors.is_empty());
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    fn prefs(style: &str) -> Preferences {
        let mut p = Preferences::new();
        p.insert("style".to_string(), json!(style));
        p
    }

    #[tokio::test]
    async fn test_get_profile_absent() {
        let f = fixture();
        assert!(f.memory.get_profile("c-1").await.unwrap().is_none());
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_profile_populates_cache() {
        let f = fixture();
        f.memory
            .update_profile(
                "c-1",
                &ProfileUpdate {
                    preferences: Some(prefs("classic")),
                    lifetime_value: None,
                },
            )
            .await
            .unwrap();

        let profile = f.memory.get_profile("c-1").await.unwrap().unwrap();
        assert_eq!(profile.preferences, prefs("classic"));
        assert_eq!(profile.lifetime_value, 0.0);
        assert!(f.cache.get(&profile_key("c-1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_profile() {
        let f = fixture();
        let first = ProfileUpdate {
            preferences: Some(prefs("classic")),
            lifetime_value: Some(10.0),
        };
        let second = ProfileUpdate {
            preferences: Some(prefs("street")),
            lifetime_value: Some(20.0),
        };

        f.memory.update_profile("c-1", &first).await.unwrap();
        f.memory.get_profile("c-1").await.unwrap();
        f.memory.update_profile("c-1", &second).await.unwrap();

        let profile = f.memory.get_profile("c-1").await.unwrap().unwrap();
        assert_eq!(profile.preferences, prefs("street"));
        assert_eq!(profile.lifetime_value, 20.0);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_falls_through() {
        let f = fixture();
        f.memory
            .update_profile("c-1", &ProfileUpdate::default())
            .await
            .unwrap();
        f.cache
            .set_ex(&profile_key("c-1"), "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let profile = f.memory.get_profile("c-1").await.unwrap().unwrap();
        assert_eq!(profile.customer_id, "c-1");
    }

    fn sized(size: &str) -> ProfileUpdate {
        let mut p = Preferences::new();
        p.insert("size".to_string(), json!(size));
        ProfileUpdate {
            preferences: Some(p),
            lifetime_value: None,
        }
    }

    #[tokio::test]
    async fn test_slow_cache_fill_cannot_outlive_a_write() {
        let db = Arc::new(Database::in_memory().unwrap());
        seed(&db, "c-1");
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(PausingCache {
            inner: MemoryCache::with_clock(clock.clone()),
            armed: AtomicBool::new(false),
            reached: Notify::new(),
            resume: Notify::new(),
        });
        let memory = Arc::new(ContextMemory::new(
            db,
            ContentCodec::plain(),
            cache.clone(),
            Arc::new(MockEmbedding::with_dimensions(32)),
            Arc::new(VectorIndex::new()),
            clock,
            MemorySettings::default(),
        ));

        memory.update_profile("c-1", &sized("M")).await.unwrap();

        // Reader loads "M" from the durable store and stalls before caching it.
        cache.armed.store(true, Ordering::SeqCst);
        let reader = {
            let memory = memory.clone();
            tokio::spawn(async move { memory.get_profile("c-1").await })
        };
        cache.reached.notified().await;

        let writer = {
            let memory = memory.clone();
            tokio::spawn(async move { memory.update_profile("c-1", &sized("L")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        cache.resume.notify_one();
        let stale = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(stale.preferences["size"], "M");
        writer.await.unwrap().unwrap();

        let profile = memory.get_profile("c-1").await.unwrap().unwrap();
        assert_eq!(profile.preferences["size"], "L");
    }
}
