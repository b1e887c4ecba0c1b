use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConciergeError, Result};

/// Top-level configuration for the Concierge service.
///
/// Loaded from `~/.concierge/config.toml` by default. Each section
/// corresponds to a storage tier, an external capability, or a pipeline
/// concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConciergeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ConciergeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConciergeConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.cache.session_ttl_secs == 0 {
            return Err(ConciergeError::Config(
                "cache.session_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.cache.profile_ttl_secs == 0 {
            return Err(ConciergeError::Config(
                "cache.profile_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.memory.retrieval_limit == 0 {
            return Err(ConciergeError::Config(
                "memory.retrieval_limit must be greater than zero".to_string(),
            ));
        }
        if self.generation.history_turns == 0 {
            return Err(ConciergeError::Config(
                "generation.history_turns must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConciergeError::Config(format!(
                "generation.temperature {} is outside [0, 2]",
                self.generation.temperature
            )));
        }
        Ok(())
    }

    /// Full path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.general.data_dir).join(&self.storage.database_file)
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.concierge/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Relational tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name inside `general.data_dir`.
    pub database_file: String,
    /// Encrypt message content at rest.
    pub encrypt_content: bool,
    /// Environment variable holding the content encryption secret.
    pub encryption_key_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "concierge.db".to_string(),
            encrypt_content: false,
            encryption_key_env: "CONCIERGE_CONTENT_KEY".to_string(),
        }
    }
}

/// Cache tier time-to-live settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub session_ttl_secs: u64,
    pub profile_ttl_secs: u64,
}

impl CacheConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn profile_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
            profile_ttl_secs: 1800,
        }
    }
}

/// Retrieval and history sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Context items retrieved per inbound message.
    pub retrieval_limit: usize,
    /// Context items loaded when a session starts.
    pub initial_context_limit: usize,
    /// Messages returned by history reads when no limit is given.
    pub history_default_limit: usize,
    /// Vector width produced by the embedding capability.
    pub embedding_dimensions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: 5,
            initial_context_limit: 5,
            history_default_limit: 20,
            embedding_dimensions: 384,
        }
    }
}

/// Embedding capability endpoint. No endpoint means the deterministic
/// local embedder is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: "text-embedding-ada-002".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Hosted sentiment classifier. No endpoint means only the keyword
/// heuristic runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub endpoint: Option<String>,
    pub api_key_env: String,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: "HUGGINGFACE_API_KEY".to_string(),
        }
    }
}

/// Text generation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Window turns sent with each generation request.
    pub history_turns: usize,
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            history_turns: 10,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Upper bounds for every external capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub embedding_ms: u64,
    pub vector_ms: u64,
    pub sentiment_ms: u64,
    pub generation_ms: u64,
}

impl TimeoutConfig {
    pub fn embedding(&self) -> Duration {
        Duration::from_millis(self.embedding_ms)
    }

    pub fn vector(&self) -> Duration {
        Duration::from_millis(self.vector_ms)
    }

    pub fn sentiment(&self) -> Duration {
        Duration::from_millis(self.sentiment_ms)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_ms: 5_000,
            vector_ms: 3_000,
            sentiment_ms: 3_000,
            generation_ms: 30_000,
        }
    }
}

/// Inbound message limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_message_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ConciergeConfig::default();
        assert_eq!(config.cache.session_ttl_secs, 3600);
        assert_eq!(config.cache.profile_ttl_secs, 1800);
        assert_eq!(config.memory.retrieval_limit, 5);
        assert_eq!(config.generation.history_turns, 10);
        assert_eq!(config.generation.model, "gpt-4");
        assert!(config.embedding.endpoint.is_none());
        assert!(!config.storage.encrypt_content);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "debug"

[cache]
session_ttl_secs = 600
"#;
        let file = create_temp_config(content);
        let config = ConciergeConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.cache.session_ttl_secs, 600);
        assert_eq!(config.cache.profile_ttl_secs, 1800);
        assert_eq!(config.timeouts.generation_ms, 30_000);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
[general]
data_dir = "/tmp/concierge"
log_level = "trace"

[storage]
database_file = "test.db"
encrypt_content = true
encryption_key_env = "MY_KEY"

[embedding]
endpoint = "http://localhost:9000/v1/embeddings"
model = "mini"

[sentiment]
endpoint = "http://localhost:9001/classify"

[generation]
model = "local-llm"
temperature = 0.2
history_turns = 6

[timeouts]
embedding_ms = 100
vector_ms = 200
sentiment_ms = 300
generation_ms = 400
"#;
        let file = create_temp_config(content);
        let config = ConciergeConfig::load(file.path()).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/concierge/test.db"));
        assert!(config.storage.encrypt_content);
        assert_eq!(config.storage.encryption_key_env, "MY_KEY");
        assert_eq!(
            config.embedding.endpoint.as_deref(),
            Some("http://localhost:9000/v1/embeddings")
        );
        assert_eq!(config.generation.history_turns, 6);
        assert_eq!(config.timeouts.generation(), Duration::from_millis(400));
    }

    #[test]
    fn test_load_rejects_zero_ttl() {
        let file = create_temp_config("[cache]\nsession_ttl_secs = 0\n");
        let err = ConciergeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConciergeError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = ConciergeConfig::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ConciergeConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.concierge/data");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("invalid = [[[");
        assert!(ConciergeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ConciergeConfig::default();
        config.memory.retrieval_limit = 8;
        config.save(&path).unwrap();

        let reloaded = ConciergeConfig::load(&path).unwrap();
        assert_eq!(reloaded.memory.retrieval_limit, 8);
        assert_eq!(reloaded.cache.session_ttl_secs, 3600);
    }

    #[test]
    fn test_expand_home_passthrough() {
        assert_eq!(expand_home("/var/lib/x"), PathBuf::from("/var/lib/x"));
    }
}
