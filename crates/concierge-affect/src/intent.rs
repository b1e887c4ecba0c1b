//! Rule-based intent classification and entity extraction.
//!
//! Intent priority: ready_to_buy, comparing, seeking_support, else
//! browsing. Entity extraction runs independently of the intent rules.

use regex::Regex;

use concierge_core::types::{Entity, EntityKind, Intent, IntentClassification};

use crate::rules::{contains_any, Rule, RuleSet};

const PURCHASE_CUES: &[&str] = &["buy", "purchase", "checkout", "order"];
const COMPARISON_CUES: &[&str] = &["compare", "difference", "vs", "better"];
const SUPPORT_CUES: &[&str] = &["help", "support", "problem", "issue"];

const BROWSING_CONFIDENCE: f64 = 0.7;

fn ready_to_buy(t: &str) -> bool {
    contains_any(t, PURCHASE_CUES)
}

fn comparing(t: &str) -> bool {
    contains_any(t, COMPARISON_CUES)
}

fn seeking_support(t: &str) -> bool {
    contains_any(t, SUPPORT_CUES)
}

/// Pulls price and size mentions out of message text.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    price: Regex,
    size: Regex,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self {
            price: Regex::new(r"\$(\d+)").expect("Invalid price regex"),
            size: Regex::new(r"(?i)\b(XS|S|M|L|XL|XXL|\d+)\b").expect("Invalid size regex"),
        }
    }

    /// First price and first size mention, in that order.
    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();

        if let Some(m) = self.price.captures(text).and_then(|c| c.get(1)) {
            entities.push(Entity {
                kind: EntityKind::Price,
                value: m.as_str().to_string(),
                confidence: 0.9,
            });
        }

        if let Some(m) = self.size.captures(text).and_then(|c| c.get(1)) {
            entities.push(Entity {
                kind: EntityKind::Size,
                value: m.as_str().to_string(),
                confidence: 0.85,
            });
        }

        entities
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies the shopping intent of a message.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: RuleSet<(Intent, f64)>,
    entities: EntityExtractor,
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(vec![
                Rule {
                    name: "ready_to_buy",
                    predicate: ready_to_buy,
                    result: (Intent::ReadyToBuy, 0.9),
                },
                Rule {
                    name: "comparing",
                    predicate: comparing,
                    result: (Intent::Comparing, 0.85),
                },
                Rule {
                    name: "seeking_support",
                    predicate: seeking_support,
                    result: (Intent::SeekingSupport, 0.9),
                },
            ]),
            entities: EntityExtractor::new(),
        }
    }

    pub fn classify(&self, text: &str) -> IntentClassification {
        let lowered = text.to_lowercase();
        let (primary, confidence) = self
            .rules
            .first_match(&lowered)
            .map(|rule| rule.result)
            .unwrap_or((Intent::Browsing, BROWSING_CONFIDENCE));

        IntentClassification {
            primary,
            confidence,
            entities: self.entities.extract(text),
        }
    }

    pub fn rules(&self) -> &RuleSet<(Intent, f64)> {
        &self.rules
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}
