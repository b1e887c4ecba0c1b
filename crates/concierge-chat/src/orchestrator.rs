//! Session orchestrator: lifecycle of a conversation and the per-message
//! pipeline.
//!
//! A live session exists as a cached [`Session`] under `session:<id>` and
//! as a durable [`SessionRecord`](concierge_core::types::SessionRecord).
//! The cache copy decides liveness; the durable copy keeps history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use concierge_affect::AffectAnalyzer;
use concierge_core::clock::Clock;
use concierge_core::config::ConciergeConfig;
use concierge_core::error::ConciergeError;
use concierge_core::types::{
    CustomerProfile, DegradedDependency, EmotionalState, Message, Preferences, ProfileUpdate,
    Reply, Sender, Session, Utterance,
};
use concierge_memory::ContextMemory;
use concierge_storage::cache::{session_key, CacheStore};
use concierge_storage::db::Database;
use concierge_storage::gate::KeyedGate;
use concierge_storage::repository::SessionRepository;

use crate::error::ChatError;
use crate::generation::{GenerationRequest, GenerationService};
use crate::prompt::{build_system_prompt, suggestions_for};

/// Tunables for [`SessionOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub session_ttl: Duration,
    pub retrieval_limit: usize,
    pub initial_context_limit: usize,
    pub history_default_limit: usize,
    /// Window turns sent with each generation request.
    pub history_turns: usize,
    pub max_message_length: usize,
    pub generation_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &ConciergeConfig) -> Self {
        Self {
            session_ttl: config.cache.session_ttl(),
            retrieval_limit: config.memory.retrieval_limit,
            initial_context_limit: config.memory.initial_context_limit,
            history_default_limit: config.memory.history_default_limit,
            history_turns: config.generation.history_turns,
            max_message_length: config.chat.max_message_length,
            generation_timeout: config.timeouts.generation(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ConciergeConfig::default())
    }
}

/// Coordinates affect analysis, context memory, generation, and the two
/// session projections.
pub struct SessionOrchestrator {
    sessions: SessionRepository,
    memory: Arc<ContextMemory>,
    affect: AffectAnalyzer,
    generator: Arc<dyn GenerationService>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    gate: KeyedGate<Uuid>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    pub fn new(
        db: Arc<Database>,
        memory: Arc<ContextMemory>,
        affect: AffectAnalyzer,
        generator: Arc<dyn GenerationService>,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sessions: SessionRepository::new(db),
            memory,
            affect,
            generator,
            cache,
            clock,
            gate: KeyedGate::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a conversation for an existing customer.
    ///
    /// Fails with [`ChatError::NotFound`] when the customer does not exist.
    /// A profile that cannot be loaded degrades to empty preferences.
    pub async fn initialize_session(
        &self,
        customer_id: &str,
        channel: &str,
    ) -> Result<Session, ChatError> {
        let preferences = match self.memory.get_profile(customer_id).await {
            Ok(Some(profile)) => profile.preferences,
            Ok(None) => Preferences::new(),
            Err(e) => {
                warn!(
                    dependency = ?DegradedDependency::ProfileLoad,
                    customer_id,
                    error = %e,
                    "Profile unavailable, starting session without preferences"
                );
                Preferences::new()
            }
        };

        let recent_interactions = self
            .memory
            .retrieve_context("", customer_id, self.settings.initial_context_limit)
            .await;

        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            channel: channel.to_string(),
            started_at: now,
            last_activity: now,
            window: Vec::new(),
            emotional_state: EmotionalState::default(),
            preferences,
            recent_interactions,
        };

        self.sessions.insert(&session.record())?;
        self.write_session(&session).await?;

        info!(session_id = %session.id, customer_id, channel, "Session initialized");
        Ok(session)
    }

    /// Run one customer message through the pipeline and return the reply.
    pub async fn process_message(
        &self,
        session_id: Uuid,
        text: &str,
    ) -> Result<Reply, ChatError> {
        self.validate(text)?;

        let start = Instant::now();
        let _guard = self.gate.acquire(session_id).await;

        let loaded = self.load_session(session_id).await?;
        let mut session = loaded.clone();
        let received_at = self.clock.now();

        let (state, context) = tokio::join!(
            self.affect.analyze(text),
            self.memory.retrieve_context(
                text,
                &session.customer_id,
                self.settings.retrieval_limit
            ),
        );

        session.emotional_state = state;
        session.window.push(Utterance::customer(text));

        let request = GenerationRequest {
            system: build_system_prompt(&session.emotional_state, &session.preferences),
            turns: session.recent_turns(self.settings.history_turns).to_vec(),
        };
        let reply_text = match self.generate(session_id, &request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.renew_session(loaded).await;
                return Err(e);
            }
        };

        let customer_message = Message::new(session_id, Sender::Customer, text, received_at)
            .with_affect(&session.emotional_state);
        self.memory
            .store_message(&customer_message, &session.customer_id, None)
            .await?;

        let assistant_message = Message::new(
            session_id,
            Sender::Assistant,
            reply_text.clone(),
            self.clock.now(),
        );
        self.memory
            .store_message(&assistant_message, &session.customer_id, None)
            .await?;

        session.window.push(Utterance::assistant(reply_text.clone()));
        session.last_activity = self.clock.now();
        self.write_session(&session).await?;

        match self.sessions.touch(session_id, session.last_activity) {
            Ok(true) => {}
            Ok(false) => warn!(
                dependency = ?DegradedDependency::SessionAudit,
                session_id = %session_id,
                "No durable row for live session"
            ),
            Err(e) => warn!(
                dependency = ?DegradedDependency::SessionAudit,
                session_id = %session_id,
                error = %e,
                "Durable last-activity update failed"
            ),
        }

        let intent = session.emotional_state.intent.primary;
        let tone = session.emotional_state.tone.tone;

        info!(
            session_id = %session_id,
            tone = %tone,
            intent = %intent,
            context_items = context.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Message processed"
        );

        Ok(Reply {
            content: reply_text,
            suggestions: suggestions_for(intent),
            emotional_tone: tone,
        })
    }

    /// The last `limit` durable messages of a session, oldest first.
    ///
    /// Reads only the relational tier, so it works for ended and expired
    /// sessions too.
    pub fn get_history(
        &self,
        session_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ChatError> {
        let limit = limit.unwrap_or(self.settings.history_default_limit);
        let mut messages = self.memory.recent_messages(session_id, limit)?;
        messages.reverse();
        Ok(messages)
    }

    /// Mark the durable session ended and evict the live copy.
    ///
    /// Safe to repeat: the first end time is kept and a missing cache entry
    /// is not an error.
    pub async fn end_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let guard = self.gate.acquire(session_id).await;

        let ended = self.sessions.end(session_id, self.clock.now())?;
        let evicted = self.cache.del(&session_key(session_id)).await?;

        drop(guard);
        info!(session_id = %session_id, ended, evicted, "Session ended");
        Ok(())
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    pub async fn get_profile(
        &self,
        customer_id: &str,
    ) -> Result<Option<CustomerProfile>, ChatError> {
        Ok(self.memory.get_profile(customer_id).await?)
    }

    pub async fn update_profile(
        &self,
        customer_id: &str,
        update: &ProfileUpdate,
    ) -> Result<(), ChatError> {
        Ok(self.memory.update_profile(customer_id, update).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let max = self.settings.max_message_length;
        if text.chars().count() > max {
            return Err(ChatError::MessageTooLong(max));
        }
        Ok(())
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Session, ChatError> {
        let Some(cached) = self.cache.get(&session_key(session_id)).await? else {
            debug!(session_id = %session_id, "No live session in cache");
            return Err(ChatError::SessionExpired(session_id));
        };

        serde_json::from_str(&cached).map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Unreadable cached session");
            ChatError::SessionExpired(session_id)
        })
    }

    async fn write_session(&self, session: &Session) -> Result<(), ChatError> {
        let serialized = serde_json::to_string(session).map_err(ConciergeError::from)?;
        self.cache
            .set_ex(&session_key(session.id), serialized, self.settings.session_ttl)
            .await?;
        Ok(())
    }

    /// Keep a session alive after a failed turn without recording the turn.
    async fn renew_session(&self, mut session: Session) {
        session.last_activity = self.clock.now();
        if let Err(e) = self.write_session(&session).await {
            warn!(session_id = %session.id, error = %e, "Session renewal failed");
        }
    }

    async fn generate(
        &self,
        session_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<String, ChatError> {
        let timeout = self.settings.generation_timeout;
        let result = tokio::time::timeout(timeout, self.generator.generate(request))
            .await
            .unwrap_or_else(|_| {
                Err(ConciergeError::timeout(
                    "generation",
                    timeout.as_millis() as u64,
                ))
            });

        result.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Generation failed");
            ChatError::GenerationFailed(e.to_string())
        })
    }
}
