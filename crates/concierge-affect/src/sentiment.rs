//! Sentiment analysis.
//!
//! A hosted classifier supplies positive/negative class probabilities. When
//! no classifier is configured, or the call fails or times out, the keyword
//! heuristic in [`fallback_sentiment`] produces the result instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use concierge_core::error::ConciergeError;
use concierge_core::types::{DegradedDependency, Sentiment, SentimentAnalysis};

const POSITIVE_WORDS: &[&str] = &[
    "love",
    "great",
    "excellent",
    "amazing",
    "perfect",
    "wonderful",
    "fantastic",
];

const NEGATIVE_WORDS: &[&str] = &[
    "hate",
    "terrible",
    "awful",
    "bad",
    "worst",
    "disappointed",
    "frustrated",
];

const WORD_WEIGHT: f64 = 0.2;
const FALLBACK_CONFIDENCE: f64 = 0.7;

/// Class probabilities reported by a sentiment classifier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassProbabilities {
    pub positive: f64,
    pub negative: f64,
}

/// External sentiment-classification capability.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ClassProbabilities, ConciergeError>;
}

/// Turn class probabilities into a labelled analysis.
///
/// `score = positive - negative`, clamped to [-1, 1]; confidence is the
/// larger of the two probabilities.
pub fn from_probabilities(p: ClassProbabilities) -> SentimentAnalysis {
    let score = (p.positive - p.negative).clamp(-1.0, 1.0);
    SentimentAnalysis {
        sentiment: Sentiment::from_score(score),
        score,
        confidence: p.positive.max(p.negative),
    }
}

/// Deterministic keyword heuristic.
///
/// Each listed positive word present adds 0.2 and each negative word
/// subtracts 0.2. Matching is case-insensitive substring containment.
pub fn fallback_sentiment(text: &str) -> SentimentAnalysis {
    let lowered = text.to_lowercase();

    let positive = POSITIVE_WORDS.iter().filter(|w| lowered.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lowered.contains(*w)).count();

    let score = ((positive as f64 - negative as f64) * WORD_WEIGHT).clamp(-1.0, 1.0);

    SentimentAnalysis {
        sentiment: Sentiment::from_score(score),
        score,
        confidence: FALLBACK_CONFIDENCE,
    }
}

/// Runs the configured classifier with a timeout and falls back to the
/// keyword heuristic on any failure.
#[derive(Clone)]
pub struct SentimentAnalyzer {
    classifier: Option<Arc<dyn SentimentClassifier>>,
    timeout: Duration,
}

impl SentimentAnalyzer {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, timeout: Duration) -> Self {
        Self {
            classifier: Some(classifier),
            timeout,
        }
    }

    /// Analyzer that always uses the keyword heuristic.
    pub fn heuristic_only() -> Self {
        Self {
            classifier: None,
            timeout: Duration::ZERO,
        }
    }

    pub async fn analyze(&self, text: &str) -> SentimentAnalysis {
        let Some(classifier) = &self.classifier else {
            return fallback_sentiment(text);
        };

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, classifier.classify(text)).await {
            Ok(Ok(probabilities)) => {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Sentiment classified"
                );
                from_probabilities(probabilities)
            }
            Ok(Err(e)) => {
                warn!(
                    dependency = ?DegradedDependency::Sentiment,
                    error = %e,
                    "Sentiment classifier failed, using keyword fallback"
                );
                fallback_sentiment(text)
            }
            Err(_) => {
                warn!(
                    dependency = ?DegradedDependency::Sentiment,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Sentiment classifier timed out, using keyword fallback"
                );
                fallback_sentiment(text)
            }
        }
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::heuristic_only()
    }
}

impl std::fmt::Debug for SentimentAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentAnalyzer")
            .field("has_classifier", &self.classifier.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HttpSentimentClassifier
// ---------------------------------------------------------------------------

/// Client for a hosted text-classification endpoint that answers with a
/// list of `{label, score}` pairs (optionally nested one level deep).
pub struct HttpSentimentClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSentimentClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<ClassProbabilities, ConciergeError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "inputs": text }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConciergeError::Classification(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConciergeError::Classification(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConciergeError::Classification(format!("Invalid response: {}", e)))?;

        parse_classification(&body)
    }
}

/// Read POSITIVE/NEGATIVE scores out of a classification response. A label
/// missing from the response counts as probability zero.
fn parse_classification(body: &serde_json::Value) -> Result<ClassProbabilities, ConciergeError> {
    let outer = body
        .as_array()
        .ok_or_else(|| ConciergeError::Classification("Expected a JSON array".to_string()))?;

    let labels = match outer.first() {
        Some(serde_json::Value::Array(inner)) => inner,
        _ => outer,
    };

    let mut probabilities = ClassProbabilities::default();
    for entry in labels {
        let label = entry["label"].as_str().unwrap_or_default();
        let score = entry["score"].as_f64().unwrap_or(0.0);
        match label.to_ascii_uppercase().as_str() {
            "POSITIVE" => probabilities.positive = score,
            "NEGATIVE" => probabilities.negative = score,
            _ => {}
        }
    }
    Ok(probabilities)
}
