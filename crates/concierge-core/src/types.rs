use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Timestamps are always UTC.
pub type Timestamp = DateTime<Utc>;

/// Opaque style/price/category/size preference payload.
pub type Preferences = serde_json::Map<String, Value>;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Who produced an utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Customer,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Customer => "customer",
            Sender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Sender::Customer),
            "assistant" => Ok(Sender::Assistant),
            _ => Err(format!("Unknown sender: {}", s)),
        }
    }
}

/// Coarse sentiment label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Map a score in [-1, 1] to a label using the +/-0.3 thresholds.
    pub fn from_score(score: f64) -> Self {
        if score > 0.3 {
            Sentiment::Positive
        } else if score < -0.3 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            _ => Err(format!("Unknown sentiment: {}", s)),
        }
    }
}

/// Emotional tone detected in a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Frustrated,
    Excited,
    Confused,
    Satisfied,
    #[default]
    Neutral,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Frustrated => "frustrated",
            Tone::Excited => "excited",
            Tone::Confused => "confused",
            Tone::Satisfied => "satisfied",
            Tone::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary shopping intent of a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ReadyToBuy,
    Comparing,
    SeekingSupport,
    #[default]
    Browsing,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ReadyToBuy => "ready_to_buy",
            Intent::Comparing => "comparing",
            Intent::SeekingSupport => "seeking_support",
            Intent::Browsing => "browsing",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready_to_buy" => Ok(Intent::ReadyToBuy),
            "comparing" => Ok(Intent::Comparing),
            "seeking_support" => Ok(Intent::SeekingSupport),
            "browsing" => Ok(Intent::Browsing),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Kind of entity extracted from message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Price,
    Size,
}

/// Auxiliary dependencies whose failure is absorbed with a safe default.
///
/// Only ever used as a structured logging field; never returned as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedDependency {
    Retrieval,
    Sentiment,
    ProfileLoad,
    SessionAudit,
    VectorUpsert,
}

// =============================================================================
// Affect / intent values
// =============================================================================

/// Output of sentiment analysis. `score` is clamped to [-1, 1].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: Sentiment,
    pub score: f64,
    pub confidence: f64,
}

/// Output of tone detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToneReading {
    pub tone: Tone,
    pub intensity: f64,
}

impl Default for ToneReading {
    fn default() -> Self {
        Self {
            tone: Tone::Neutral,
            intensity: 0.5,
        }
    }
}

/// A typed key/value pulled out of message text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub value: String,
    pub confidence: f64,
}

/// Output of intent classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary: Intent,
    pub confidence: f64,
    pub entities: Vec<Entity>,
}

impl Default for IntentClassification {
    fn default() -> Self {
        Self {
            primary: Intent::Browsing,
            confidence: 0.5,
            entities: Vec::new(),
        }
    }
}

/// Per-message affect snapshot. Recomputed from scratch for every inbound
/// message and never merged with earlier values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub sentiment: SentimentAnalysis,
    pub tone: ToneReading,
    pub intent: IntentClassification,
}

// =============================================================================
// Conversation entities
// =============================================================================

/// One role-tagged utterance in the in-memory conversation window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Sender,
    pub content: String,
}

impl Utterance {
    pub fn customer(content: impl Into<String>) -> Self {
        Self {
            role: Sender::Customer,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Sender::Assistant,
            content: content.into(),
        }
    }
}

/// A retrieval hit: a prior utterance judged relevant to the current message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub message_id: String,
    pub content: String,
    pub timestamp: Timestamp,
    /// Similarity score reported by the vector store, passed through as-is.
    pub relevance_score: f64,
    pub metadata: Value,
}

/// Cache-tier projection of a conversation.
///
/// A session has two projections: this one, held in the cache tier under
/// `session:<id>`, and [`SessionRecord`], held in the relational tier.
/// Reconciliation rule: the cache projection wins for liveness (its absence
/// means the session is no longer active), the durable record wins for
/// history and audit, and survives cache expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub customer_id: String,
    pub channel: String,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
    /// Conversation window, most recent last.
    pub window: Vec<Utterance>,
    pub emotional_state: EmotionalState,
    /// Preferences copied from the customer profile at session start.
    pub preferences: Preferences,
    /// Context retrieved when the session was created.
    #[serde(default)]
    pub recent_interactions: Vec<ContextItem>,
}

impl Session {
    /// The last `n` utterances of the window, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Utterance] {
        let start = self.window.len().saturating_sub(n);
        &self.window[start..]
    }

    /// The durable projection of a live session.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            customer_id: self.customer_id.clone(),
            channel: self.channel.clone(),
            started_at: self.started_at,
            last_activity: self.last_activity,
            ended_at: None,
            status: SessionStatus::Active,
        }
    }
}

/// Relational-tier projection of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub customer_id: String,
    pub channel: String,
    pub started_at: Timestamp,
    pub last_activity: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub status: SessionStatus,
}

/// One stored utterance. Immutable once persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: Timestamp,
    pub sentiment: Option<Sentiment>,
    pub sentiment_score: Option<f64>,
    pub intent: Option<Intent>,
}

impl Message {
    /// A new message with no derived metadata.
    pub fn new(
        session_id: Uuid,
        sender: Sender,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.into(),
            created_at,
            sentiment: None,
            sentiment_score: None,
            intent: None,
        }
    }

    /// Attach sentiment and intent labels derived from this message.
    pub fn with_affect(mut self, state: &EmotionalState) -> Self {
        self.sentiment = Some(state.sentiment.sentiment);
        self.sentiment_score = Some(state.sentiment.score);
        self.intent = Some(state.intent.primary);
        self
    }
}

/// A customer account row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: Timestamp,
}

/// Long-lived customer profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub preferences: Preferences,
    pub lifetime_value: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Values written by a profile upsert. Absent fields are written as absent,
/// not merged with the stored row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub preferences: Option<Preferences>,
    pub lifetime_value: Option<f64>,
}

/// What `process_message` hands back to the transport layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub content: String,
    pub suggestions: Vec<String>,
    pub emotional_tone: Tone,
}
