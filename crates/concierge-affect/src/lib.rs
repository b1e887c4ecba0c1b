//! Concierge Affect crate - sentiment, tone, and intent classification.
//!
//! Sentiment comes from an external classifier with a keyword fallback.
//! Tone and intent are ordered rule tables evaluated first-match-wins.

pub mod intent;
pub mod rules;
pub mod sentiment;
pub mod tone;

use concierge_core::types::EmotionalState;

pub use intent::{EntityExtractor, IntentClassifier};
pub use rules::{Rule, RuleSet};
pub use sentiment::{
    fallback_sentiment, ClassProbabilities, HttpSentimentClassifier, SentimentAnalyzer,
    SentimentClassifier,
};
pub use tone::ToneDetector;

/// Computes a fresh [`EmotionalState`] for one message.
///
/// Never fails: a broken sentiment classifier degrades to the keyword
/// heuristic, and the rule tables always produce a result.
#[derive(Debug, Clone, Default)]
pub struct AffectAnalyzer {
    sentiment: SentimentAnalyzer,
    tone: ToneDetector,
    intent: IntentClassifier,
}

impl AffectAnalyzer {
    pub fn new(sentiment: SentimentAnalyzer) -> Self {
        Self {
            sentiment,
            tone: ToneDetector::new(),
            intent: IntentClassifier::new(),
        }
    }

    pub async fn analyze(&self, text: &str) -> EmotionalState {
        let sentiment = self.sentiment.analyze(text).await;
        EmotionalState {
            sentiment,
            tone: self.tone.detect(text),
            intent: self.intent.classify(text),
        }
    }
}
