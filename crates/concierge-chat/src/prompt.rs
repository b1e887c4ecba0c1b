//! Prompt assembly and follow-up suggestions.
//!
//! Clause order: persona, tone, preferences, intent, closing directive.
//! Neutral/satisfied tone and browsing intent contribute no clause.

use concierge_core::types::{EmotionalState, Intent, Preferences, Tone};

const PERSONA: &str = "You are AURA, an intelligent and empathetic retail assistant. ";

const CLOSING: &str =
    "\n\nBe conversational, helpful, and personalized. Keep responses concise but informative.";

fn tone_clause(tone: Tone) -> Option<&'static str> {
    match tone {
        Tone::Frustrated => Some(
            "The customer seems frustrated. Be extra empathetic, apologize for any \
             inconvenience, and focus on solving their problem quickly. ",
        ),
        Tone::Excited => Some(
            "The customer seems excited! Match their enthusiasm and help them find \
             exactly what they're looking for. ",
        ),
        Tone::Confused => Some(
            "The customer seems confused. Use simple language, provide clear \
             explanations, and ask clarifying questions. ",
        ),
        Tone::Satisfied | Tone::Neutral => None,
    }
}

fn intent_clause(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::ReadyToBuy => Some(
            "The customer is ready to make a purchase. Help them complete the \
             transaction smoothly. ",
        ),
        Intent::Comparing => Some(
            "The customer is comparing options. Provide detailed comparisons and help \
             them make an informed decision. ",
        ),
        Intent::SeekingSupport => {
            Some("The customer needs support. Focus on resolving their issue efficiently. ")
        }
        Intent::Browsing => None,
    }
}

/// Build the system framing for one generation call.
pub fn build_system_prompt(state: &EmotionalState, preferences: &Preferences) -> String {
    let mut prompt = String::from(PERSONA);

    if let Some(clause) = tone_clause(state.tone.tone) {
        prompt.push_str(clause);
    }

    if !preferences.is_empty() {
        // A Map of Values always serializes.
        let snapshot = serde_json::to_string(preferences).unwrap_or_default();
        prompt.push_str("\n\nCustomer preferences: ");
        prompt.push_str(&snapshot);
        prompt.push_str(". ");
    }

    if let Some(clause) = intent_clause(state.intent.primary) {
        prompt.push_str(clause);
    }

    prompt.push_str(CLOSING);
    prompt
}

/// Suggested next utterances for a primary intent.
pub fn suggestions_for(intent: Intent) -> Vec<String> {
    let table: [&str; 3] = match intent {
        Intent::ReadyToBuy => ["Add to cart", "Check availability", "Apply discount code"],
        Intent::Comparing => [
            "What are the key differences?",
            "Which one is better for me?",
            "Show me customer reviews",
        ],
        Intent::SeekingSupport => [
            "Track my order",
            "Return an item",
            "Speak to a human agent",
        ],
        Intent::Browsing => [
            "Show me trending items",
            "What's on sale?",
            "I need help finding something",
        ],
    };
    table.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(tone: Tone, intent: Intent) -> EmotionalState {
        let mut state = EmotionalState::default();
        state.tone.tone = tone;
        state.intent.primary = intent;
        state
    }

    #[test]
    fn test_neutral_browsing_prompt_is_persona_plus_closing() {
        let prompt = build_system_prompt(&EmotionalState::default(), &Preferences::new());
        assert_eq!(prompt, format!("{}{}", PERSONA, CLOSING));
    }

    #[test]
    fn test_clause_order() {
        let mut prefs = Preferences::new();
        prefs.insert("style".to_string(), json!("minimal"));

        let prompt = build_system_prompt(&state(Tone::Frustrated, Intent::SeekingSupport), &prefs);

        let persona = prompt.find("You are AURA").unwrap();
        let tone = prompt.find("seems frustrated").unwrap();
        let prefs_at = prompt.find("Customer preferences: {\"style\":\"minimal\"}. ").unwrap();
        let intent = prompt.find("needs support").unwrap();
        let closing = prompt.find("Be conversational").unwrap();

        assert!(persona < tone);
        assert!(tone < prefs_at);
        assert!(prefs_at < intent);
        assert!(intent < closing);
        assert!(prompt.ends_with("concise but informative."));
    }

    #[test]
    fn test_each_tone_clause() {
        let prefs = Preferences::new();
        let excited = build_system_prompt(&state(Tone::Excited, Intent::Browsing), &prefs);
        assert!(excited.contains("Match their enthusiasm"));

        let confused = build_system_prompt(&state(Tone::Confused, Intent::Browsing), &prefs);
        assert!(confused.contains("ask clarifying questions"));

        let satisfied = build_system_prompt(&state(Tone::Satisfied, Intent::Browsing), &prefs);
        assert_eq!(satisfied, format!("{}{}", PERSONA, CLOSING));
    }

    #[test]
    fn test_each_intent_clause() {
        let prefs = Preferences::new();
        let buy = build_system_prompt(&state(Tone::Neutral, Intent::ReadyToBuy), &prefs);
        assert!(buy.contains("ready to make a purchase"));

        let compare = build_system_prompt(&state(Tone::Neutral, Intent::Comparing), &prefs);
        assert!(compare.contains("detailed comparisons"));
    }

    #[test]
    fn test_empty_preferences_are_omitted() {
        let prompt = build_system_prompt(&state(Tone::Excited, Intent::Comparing), &Preferences::new());
        assert!(!prompt.contains("Customer preferences"));
    }

    #[test]
    fn test_suggestion_tables() {
        assert_eq!(
            suggestions_for(Intent::ReadyToBuy),
            vec!["Add to cart", "Check availability", "Apply discount code"]
        );
        assert_eq!(suggestions_for(Intent::SeekingSupport)[2], "Speak to a human agent");
        assert_eq!(suggestions_for(Intent::Comparing)[0], "What are the key differences?");
        assert_eq!(suggestions_for(Intent::Browsing)[1], "What's on sale?");
    }
}
