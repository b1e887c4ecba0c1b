//! Ordered first-match-wins rule tables.

/// One classification rule: if `predicate` holds for the lowercased text,
/// the rule yields `result`.
#[derive(Debug, Clone)]
pub struct Rule<T> {
    pub name: &'static str,
    pub predicate: fn(&str) -> bool,
    pub result: T,
}

impl<T> Rule<T> {
    pub fn matches(&self, lowered: &str) -> bool {
        (self.predicate)(lowered)
    }
}

/// Rules evaluated in order. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct RuleSet<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleSet<T> {
    pub fn new(rules: Vec<Rule<T>>) -> Self {
        Self { rules }
    }

    /// First rule matching `lowered`, if any.
    pub fn first_match(&self, lowered: &str) -> Option<&Rule<T>> {
        self.rules.iter().find(|rule| rule.matches(lowered))
    }

    pub fn rules(&self) -> &[Rule<T>] {
        &self.rules
    }

    /// Look up a rule by name.
    pub fn get(&self, name: &str) -> Option<&Rule<T>> {
        self.rules.iter().find(|rule| rule.name == name)
    }
}

/// Whether `text` contains any of `cues` as a substring.
pub fn contains_any(text: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| text.contains(cue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_a(t: &str) -> bool {
        t.contains('a')
    }

    fn has_b(t: &str) -> bool {
        t.contains('b')
    }

    #[test]
    fn test_first_match_wins() {
        let set = RuleSet::new(vec![
            Rule { name: "a", predicate: has_a, result: 1 },
            Rule { name: "b", predicate: has_b, result: 2 },
        ]);
        assert_eq!(set.first_match("ab").map(|r| r.result), Some(1));
        assert_eq!(set.first_match("b").map(|r| r.result), Some(2));
        assert!(set.first_match("c").is_none());
    }

    #[test]
    fn test_get_by_name() {
        let set = RuleSet::new(vec![Rule { name: "a", predicate: has_a, result: () }]);
        assert!(set.get("a").is_some());
        assert!(set.get("z").is_none());
    }

    #[test]
    fn test_contains_any() {
        assert!(contains_any("need help now", &["help", "support"]));
        assert!(!contains_any("just looking", &["help", "support"]));
    }
}
