//! Concierge application binary - composition root.
//!
//! 1. Parse the CLI and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Open SQLite and build the content codec, cache, and vector index
//! 4. Pick the embedding, sentiment, and generation backends
//! 5. Run the requested subcommand against the session orchestrator

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use concierge_affect::{AffectAnalyzer, HttpSentimentClassifier, SentimentAnalyzer};
use concierge_chat::{ChatError, HttpGenerationService, OrchestratorSettings, SessionOrchestrator};
use concierge_core::clock::{Clock, SystemClock};
use concierge_core::config::{expand_home, ConciergeConfig};
use concierge_core::error::ConciergeError;
use concierge_core::types::{Customer, Preferences, ProfileUpdate};
use concierge_memory::{ContextMemory, MemorySettings};
use concierge_storage::{CacheStore, ContentCodec, CustomerRepository, Database, MemoryCache};
use concierge_vector::{DynEmbeddingService, HttpEmbeddingService, MockEmbedding, VectorIndex};

use cli::{CliArgs, Command, CustomerCommand, ProfileCommand};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Everything a subcommand may need, wired once.
struct App {
    db: Arc<Database>,
    orchestrator: SessionOrchestrator,
}

/// Read an API key from the environment variable named in config.
fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// Encrypted writes need the secret; plain writes still take it when present
/// so rows written by an encrypting deployment stay readable.
fn build_codec(config: &ConciergeConfig) -> Result<ContentCodec, ConciergeError> {
    let secret = api_key(&config.storage.encryption_key_env);
    match (config.storage.encrypt_content, secret) {
        (true, Some(secret)) => ContentCodec::encrypted(&secret),
        (true, None) => Err(ConciergeError::Config(format!(
            "storage.encrypt_content is set but {} is empty",
            config.storage.encryption_key_env
        ))),
        (false, Some(secret)) => ContentCodec::plain_with_key(&secret),
        (false, None) => Ok(ContentCodec::plain()),
    }
}

fn build_embedder(config: &ConciergeConfig) -> Arc<dyn DynEmbeddingService> {
    let dims = config.memory.embedding_dimensions;
    match &config.embedding.endpoint {
        Some(endpoint) => {
            let mut service = HttpEmbeddingService::new(endpoint, &config.embedding.model, dims);
            if let Some(key) = api_key(&config.embedding.api_key_env) {
                service = service.with_api_key(key);
            }
            tracing::info!(endpoint = %endpoint, model = %config.embedding.model, "HTTP embedding backend");
            Arc::new(service)
        }
        None => {
            tracing::info!(dimensions = dims, "Deterministic local embedding backend");
            Arc::new(MockEmbedding::with_dimensions(dims))
        }
    }
}

fn build_sentiment(config: &ConciergeConfig) -> SentimentAnalyzer {
    match &config.sentiment.endpoint {
        Some(endpoint) => {
            let mut classifier = HttpSentimentClassifier::new(endpoint);
            if let Some(key) = api_key(&config.sentiment.api_key_env) {
                classifier = classifier.with_api_key(key);
            }
            tracing::info!(endpoint = %endpoint, "Hosted sentiment classifier");
            SentimentAnalyzer::new(Arc::new(classifier), config.timeouts.sentiment())
        }
        None => {
            tracing::info!("Sentiment from keyword heuristic only");
            SentimentAnalyzer::heuristic_only()
        }
    }
}

fn build_generator(config: &ConciergeConfig) -> HttpGenerationService {
    let mut service = HttpGenerationService::new(
        &config.generation.endpoint,
        &config.generation.model,
        config.generation.temperature,
    );
    match api_key(&config.generation.api_key_env) {
        Some(key) => service = service.with_api_key(key),
        None => tracing::warn!(
            env = %config.generation.api_key_env,
            "No generation API key set, requests will be unauthenticated"
        ),
    }
    service
}

fn build_app(config: &ConciergeConfig) -> AppResult<App> {
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = config.database_path();
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let codec = build_codec(config)?;
    tracing::info!(encoding = %codec.write_encoding().as_str(), "Content codec ready");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::with_clock(clock.clone()));

    let memory = Arc::new(ContextMemory::new(
        db.clone(),
        codec,
        cache.clone(),
        build_embedder(config),
        Arc::new(VectorIndex::new()),
        clock.clone(),
        MemorySettings::from_config(config),
    ));

    let orchestrator = SessionOrchestrator::new(
        db.clone(),
        memory,
        AffectAnalyzer::new(build_sentiment(config)),
        Arc::new(build_generator(config)),
        cache,
        clock,
        OrchestratorSettings::from_config(config),
    );

    Ok(App { db, orchestrator })
}

// =============================================================================
// Subcommands
// =============================================================================

fn add_customer(
    app: &App,
    email: String,
    id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
) -> AppResult<()> {
    let customer = Customer {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        email,
        phone,
        first_name,
        last_name,
        created_at: chrono::Utc::now(),
    };
    CustomerRepository::new(app.db.clone()).save(&customer)?;
    println!("{}", customer.id);
    Ok(())
}

async fn chat(app: &App, customer_id: &str, channel: &str) -> AppResult<()> {
    let orch = &app.orchestrator;
    let session = orch.initialize_session(customer_id, channel).await?;
    println!("Session {} started. Type /end to finish.", session.id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/end" {
            break;
        }

        match orch.process_message(session.id, text).await {
            Ok(reply) => {
                println!("[{}] {}", reply.emotional_tone, reply.content);
                println!("  suggestions: {}", reply.suggestions.join(" | "));
            }
            Err(ChatError::SessionExpired(id)) => {
                println!("Session {} expired. Start a new chat.", id);
                return Ok(());
            }
            Err(e) if e.is_retryable() => println!("Temporary failure, try again: {}", e),
            Err(e) => println!("Error: {}", e),
        }
    }

    orch.end_session(session.id).await?;
    println!("Session {} ended.", session.id);
    Ok(())
}

fn history(app: &App, session_id: Uuid, limit: Option<usize>) -> AppResult<()> {
    let messages = app.orchestrator.get_history(session_id, limit)?;
    if messages.is_empty() {
        println!("No messages for session {}", session_id);
    }
    for m in messages {
        println!(
            "{} {:>9}: {}",
            m.created_at.format("%Y-%m-%d %H:%M:%S"),
            m.sender.as_str(),
            m.content
        );
    }
    Ok(())
}

async fn profile(app: &App, action: ProfileCommand) -> AppResult<()> {
    match action {
        ProfileCommand::Show { customer_id } => {
            match app.orchestrator.get_profile(&customer_id).await? {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!("No profile for {}", customer_id),
            }
        }
        ProfileCommand::Set {
            customer_id,
            preferences,
            lifetime_value,
        } => {
            let preferences = preferences
                .map(|raw| serde_json::from_str::<Preferences>(&raw))
                .transpose()?;
            let update = ProfileUpdate {
                preferences,
                lifetime_value,
            };
            app.orchestrator.update_profile(&customer_id, &update).await?;
            println!("Profile for {} updated", customer_id);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = ConciergeConfig::load_or_default(&config_file);
    args.apply_overrides(&mut config);
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        path = %config_file.display(),
        "Starting Concierge v{}",
        env!("CARGO_PKG_VERSION")
    );

    let app = build_app(&config)?;

    match args.command {
        Command::Customer {
            action:
                CustomerCommand::Add {
                    email,
                    id,
                    first_name,
                    last_name,
                    phone,
                },
        } => add_customer(&app, email, id, first_name, last_name, phone),
        Command::Chat {
            customer_id,
            channel,
        } => chat(&app, &customer_id, &channel).await,
        Command::History { session_id, limit } => history(&app, session_id, limit),
        Command::Profile { action } => profile(&app, action).await,
    }
}
