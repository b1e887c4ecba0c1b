//! Concierge Storage crate - relational tier, content codec, cache tier.
//!
//! Provides a WAL-mode SQLite database with migrations, repositories for
//! customers/sessions/messages/profiles, the versioned message content
//! codec, the TTL cache used for live sessions and profiles, and the keyed
//! gate that serializes work on one session or one profile.

pub mod cache;
pub mod codec;
pub mod db;
pub mod gate;
pub mod migrations;
pub mod repository;

pub use cache::{profile_key, session_key, CacheStore, MemoryCache};
pub use codec::{ContentCodec, ContentEncoding};
pub use db::Database;
pub use gate::{GateGuard, KeyedGate};
pub use repository::{CustomerRepository, MessageRepository, ProfileRepository, SessionRepository};
