//! Session orchestration for the Concierge assistant.
//!
//! Owns the conversation lifecycle, the per-message pipeline (affect and
//! retrieval in parallel, prompt assembly, generation, persistence), and the
//! caller-facing error taxonomy.

pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod prompt;

pub use error::ChatError;
pub use generation::{GenerationRequest, GenerationService, HttpGenerationService};
pub use orchestrator::{OrchestratorSettings, SessionOrchestrator};
pub use prompt::{build_system_prompt, suggestions_for};
