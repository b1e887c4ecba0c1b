//! Repository implementations for the relational tier.
//!
//! CustomerRepository, SessionRepository, MessageRepository and
//! ProfileRepository operate on the shared Database using raw SQL.
//! Timestamps are stored as epoch milliseconds.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use concierge_core::error::ConciergeError;
use concierge_core::types::{
    Customer, CustomerProfile, Message, Preferences, ProfileUpdate, Sender, SessionRecord,
    SessionStatus, Timestamp,
};

use crate::codec::{ContentCodec, ContentEncoding};
use crate::db::Database;

/// Repository for customer accounts.
pub struct CustomerRepository {
    db: Arc<Database>,
}

impl CustomerRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn save(&self, customer: &Customer) -> Result<(), ConciergeError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO customers (customer_id, email, phone, first_name, last_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    customer.id,
                    customer.email,
                    customer.phone,
                    customer.first_name,
                    customer.last_name,
                    customer.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| ConciergeError::Storage(format!("Failed to save customer: {}", e)))?;
            Ok(())
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Customer>, ConciergeError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT customer_id, email, phone, first_name, last_name, created_at
                 FROM customers WHERE customer_id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(Customer {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        phone: row.get(2)?,
                        first_name: row.get(3)?,
                        last_name: row.get(4)?,
                        created_at: from_millis(row.get(5)?),
                    })
                },
            )
            .optional()
            .map_err(|e| ConciergeError::Storage(e.to_string()))
        })
    }
}

/// Repository for the durable projection of sessions.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session row.
    ///
    /// A customer id with no matching customer row fails the foreign key and
    /// is reported as `NotFound`.
    pub fn insert(&self, record: &SessionRecord) -> Result<(), ConciergeError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, customer_id, channel, start_time, end_time, last_activity, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.id.to_string(),
                    record.customer_id,
                    record.channel,
                    record.started_at.timestamp_millis(),
                    record.ended_at.map(|t| t.timestamp_millis()),
                    record.last_activity.timestamp_millis(),
                    record.status.as_str(),
                ],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ConciergeError::NotFound(format!("customer {}", record.customer_id))
                } else {
                    ConciergeError::Storage(format!("Failed to save session: {}", e))
                }
            })?;
            Ok(())
        })
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<SessionRecord>, ConciergeError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, customer_id, channel, start_time, end_time, last_activity, status
                     FROM sessions WHERE session_id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, Option<i64>>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| ConciergeError::Storage(e.to_string()))?;

            let Some((id, customer_id, channel, start, end, last, status)) = row else {
                return Ok(None);
            };

            Ok(Some(SessionRecord {
                id: parse_uuid(&id)?,
                customer_id,
                channel,
                started_at: from_millis(start),
                last_activity: from_millis(last),
                ended_at: end.map(from_millis),
                status: status
                    .parse::<SessionStatus>()
                    .map_err(ConciergeError::Storage)?,
            }))
        })
    }

    /// Record activity on a session. Returns whether a row was updated.
    pub fn touch(&self, id: Uuid, at: Timestamp) -> Result<bool, ConciergeError> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE sessions SET last_activity = ?1 WHERE session_id = ?2",
                    rusqlite::params![at.timestamp_millis(), id.to_string()],
                )
                .map_err(|e| {
                    ConciergeError::Storage(format!("Failed to update last activity: {}", e))
                })?;
            Ok(updated > 0)
        })
    }

    /// Mark a session ended.
    ///
    /// Unconditional write: ending twice succeeds and keeps the first end
    /// time. Ending an unknown session updates nothing and is not an error.
    pub fn end(&self, id: Uuid, at: Timestamp) -> Result<bool, ConciergeError> {
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE sessions
                     SET end_time = COALESCE(end_time, ?1), status = 'ended'
                     WHERE session_id = ?2",
                    rusqlite::params![at.timestamp_millis(), id.to_string()],
                )
                .map_err(|e| ConciergeError::Storage(format!("Failed to end session: {}", e)))?;
            Ok(updated > 0)
        })
    }
}

/// Repository for stored utterances.
///
/// Content passes through the [`ContentCodec`] and is stored with its
/// encoding tag.
pub struct MessageRepository {
    db: Arc<Database>,
    codec: ContentCodec,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>, codec: ContentCodec) -> Self {
        Self { db, codec }
    }

    pub fn insert(&self, message: &Message) -> Result<(), ConciergeError> {
        let (content, encoding) = self.codec.encode(&message.content)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (message_id, session_id, sender, content, content_encoding,
                                       sentiment, sentiment_score, intent, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.sender.as_str(),
                    content,
                    encoding.as_str(),
                    message.sentiment.map(|s| s.as_str()),
                    message.sentiment_score,
                    message.intent.map(|i| i.as_str()),
                    message.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ConciergeError::NotFound(format!("session {}", message.session_id))
                } else {
                    ConciergeError::Storage(format!("Failed to save message: {}", e))
                }
            })?;
            Ok(())
        })
    }

    /// The most recent `limit` messages of a session, newest first.
    pub fn recent(&self, session_id: Uuid, limit: usize) -> Result<Vec<Message>, ConciergeError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, session_id, sender, content, content_encoding,
                            sentiment, sentiment_score, intent, timestamp
                     FROM messages
                     WHERE session_id = ?1
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT ?2",
                )
                .map_err(|e| ConciergeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![session_id.to_string(), limit as i64],
                    |row| {
                        Ok(MessageRow {
                            id: row.get(0)?,
                            session_id: row.get(1)?,
                            sender: row.get(2)?,
                            content: row.get(3)?,
                            encoding: row.get(4)?,
                            sentiment: row.get(5)?,
                            sentiment_score: row.get(6)?,
                            intent: row.get(7)?,
                            timestamp: row.get(8)?,
                        })
                    },
                )
                .map_err(|e| ConciergeError::Storage(e.to_string()))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConciergeError::Storage(e.to_string()))
        })?;

        rows.into_iter()
            .map(|row| row.into_message(&self.codec))
            .collect()
    }
}

/// Repository for customer profiles.
pub struct ProfileRepository {
    db: Arc<Database>,
}

impl ProfileRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or overwrite a profile row.
    ///
    /// On conflict every updatable column takes the new value, so a `None`
    /// field clears the stored one.
    pub fn upsert(
        &self,
        customer_id: &str,
        update: &ProfileUpdate,
        at: Timestamp,
    ) -> Result<(), ConciergeError> {
        let preferences = update
            .preferences
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO customer_profiles (customer_id, preferences, lifetime_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(customer_id) DO UPDATE SET
                    preferences = excluded.preferences,
                    lifetime_value = excluded.lifetime_value,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    customer_id,
                    preferences,
                    update.lifetime_value,
                    at.timestamp_millis(),
                ],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ConciergeError::NotFound(format!("customer {}", customer_id))
                } else {
                    ConciergeError::Storage(format!("Failed to save profile: {}", e))
                }
            })?;
            Ok(())
        })
    }

    pub fn find(&self, customer_id: &str) -> Result<Option<CustomerProfile>, ConciergeError> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT customer_id, preferences, lifetime_value, created_at, updated_at
                 FROM customer_profiles WHERE customer_id = ?1",
                rusqlite::params![customer_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| ConciergeError::Storage(e.to_string()))
        })?;

        let Some((customer_id, preferences, lifetime_value, created, updated)) = row else {
            return Ok(None);
        };

        let preferences = match preferences {
            Some(json) => serde_json::from_str::<Preferences>(&json)?,
            None => Preferences::new(),
        };

        Ok(Some(CustomerProfile {
            customer_id,
            preferences,
            lifetime_value: lifetime_value.unwrap_or(0.0),
            created_at: from_millis(created),
            updated_at: from_millis(updated),
        }))
    }
}

// ============================================================================
// Row helpers
// ============================================================================

struct MessageRow {
    id: String,
    session_id: String,
    sender: String,
    content: String,
    encoding: String,
    sentiment: Option<String>,
    sentiment_score: Option<f64>,
    intent: Option<String>,
    timestamp: i64,
}

impl MessageRow {
    fn into_message(self, codec: &ContentCodec) -> Result<Message, ConciergeError> {
        let encoding: ContentEncoding = self.encoding.parse()?;
        Ok(Message {
            id: parse_uuid(&self.id)?,
            session_id: parse_uuid(&self.session_id)?,
            sender: self
                .sender
                .parse::<Sender>()
                .map_err(ConciergeError::Storage)?,
            content: codec.decode(&self.content, encoding)?,
            created_at: from_millis(self.timestamp),
            sentiment: self
                .sentiment
                .map(|s| s.parse())
                .transpose()
                .map_err(ConciergeError::Storage)?,
            sentiment_score: self.sentiment_score,
            intent: self
                .intent
                .map(|s| s.parse())
                .transpose()
                .map_err(ConciergeError::Storage)?,
        })
    }
}

fn from_millis(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_uuid(s: &str) -> Result<Uuid, ConciergeError> {
    Uuid::parse_str(s).map_err(|e| ConciergeError::Storage(format!("Invalid UUID: {}", e)))
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
