//! Rule-based tone detection.
//!
//! Priority order: frustrated, excited, confused, satisfied. Text matching
//! none of them is neutral.

use concierge_core::types::{Tone, ToneReading};

use crate::rules::{contains_any, Rule, RuleSet};

const FRUSTRATION_CUES: &[&str] = &["waiting", "problem", "issue", "disappointed"];
const ENTHUSIASM_CUES: &[&str] = &["love", "amazing", "perfect", "great"];
const UNCERTAINTY_CUES: &[&str] = &["not sure", "confused", "don't understand", "how"];
const GRATITUDE_CUES: &[&str] = &["thanks", "thank you", "helpful", "appreciate"];

fn frustrated(t: &str) -> bool {
    contains_any(t, FRUSTRATION_CUES) && (t.contains('!') || t.contains("??"))
}

fn excited(t: &str) -> bool {
    contains_any(t, ENTHUSIASM_CUES) && t.contains('!')
}

fn confused(t: &str) -> bool {
    t.contains('?') && contains_any(t, UNCERTAINTY_CUES)
}

fn satisfied(t: &str) -> bool {
    contains_any(t, GRATITUDE_CUES)
}

/// Detects the emotional tone of a message.
#[derive(Debug, Clone)]
pub struct ToneDetector {
    rules: RuleSet<ToneReading>,
}

impl ToneDetector {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(vec![
                Rule {
                    name: "frustrated",
                    predicate: frustrated,
                    result: ToneReading { tone: Tone::Frustrated, intensity: 0.8 },
                },
                Rule {
                    name: "excited",
                    predicate: excited,
                    result: ToneReading { tone: Tone::Excited, intensity: 0.9 },
                },
                Rule {
                    name: "confused",
                    predicate: confused,
                    result: ToneReading { tone: Tone::Confused, intensity: 0.7 },
                },
                Rule {
                    name: "satisfied",
                    predicate: satisfied,
                    result: ToneReading { tone: Tone::Satisfied, intensity: 0.8 },
                },
            ]),
        }
    }

    pub fn detect(&self, text: &str) -> ToneReading {
        let lowered = text.to_lowercase();
        self.rules
            .first_match(&lowered)
            .map(|rule| rule.result.clone())
            .unwrap_or_default()
    }

    pub fn rules(&self) -> &RuleSet<ToneReading> {
        &self.rules
    }
}

impl Default for ToneDetector {
    fn default() -> Self {
        Self::new()
    }
}
