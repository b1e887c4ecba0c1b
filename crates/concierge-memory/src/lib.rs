//! Concierge Memory crate - durable and semantic conversation memory.
//!
//! Stores messages in the relational tier and the vector store, retrieves
//! customer-scoped context by similarity, and serves customer profiles
//! through the cache tier.

pub mod context_memory;

pub use context_memory::{ContextMemory, MemorySettings};
