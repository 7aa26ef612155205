//! Deterministic trigger matching shared by dialog branching and objection
//! detection: case-insensitive substring containment, no NLU.

/// A customer utterance normalized once for repeated trigger checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    raw: String,
    normalized: String,
}

/// Lowercases and collapses runs of whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl Utterance {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self { raw, normalized }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Whether `trigger` occurs anywhere in the utterance. Blank triggers
    /// never match.
    pub fn contains(&self, trigger: &str) -> bool {
        let trigger = normalize(trigger);
        !trigger.is_empty() && self.normalized.contains(&trigger)
    }

    /// First trigger, in list order, contained in the utterance.
    pub fn first_trigger<'a>(&self, triggers: &'a [String]) -> Option<&'a str> {
        triggers
            .iter()
            .find(|t| self.contains(t))
            .map(String::as_str)
    }
}

/// First candidate, in iteration order, with any trigger in the utterance.
pub fn first_match<'a, T>(
    utterance: &Utterance,
    candidates: impl IntoIterator<Item = (&'a [String], T)>,
) -> Option<T> {
    candidates
        .into_iter()
        .find(|(triggers, _)| utterance.first_trigger(triggers).is_some())
        .map(|(_, value)| value)
}

/// Matching candidate with the greatest rank. Among equal ranks the earliest
/// candidate wins, so callers encode every tie-break they need in the rank.
pub fn best_match<'a, T, K: Ord>(
    utterance: &Utterance,
    candidates: impl IntoIterator<Item = (&'a [String], T)>,
    rank: impl Fn(&T) -> K,
) -> Option<T> {
    let mut best: Option<(K, T)> = None;
    for (triggers, value) in candidates {
        if utterance.first_trigger(triggers).is_none() {
            continue;
        }
        let key = rank(&value);
        match &best {
            Some((current, _)) if *current >= key => {}
            _ => best = Some((key, value)),
        }
    }
    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_case_insensitive_substring() {
        let u = Utterance::new("This is TOO   Expensive for us");
        assert!(u.contains("expensive"));
        assert!(u.contains("too expensive"));
        assert!(!u.contains("budget"));
        assert!(!u.contains("   "));
    }

    #[test]
    fn test_first_trigger_respects_list_order() {
        let u = Utterance::new("sure, yes, tell me more");
        let triggers = words(&["tell me more", "yes"]);
        assert_eq!(u.first_trigger(&triggers), Some("tell me more"));
    }

    #[test]
    fn test_first_match_vs_best_match() {
        let u = Utterance::new("not now, I'm busy");
        let a = words(&["busy"]);
        let b = words(&["not now"]);
        let candidates = vec![(a.as_slice(), ("a", 1)), (b.as_slice(), ("b", 5))];

        assert_eq!(first_match(&u, candidates.clone()), Some(("a", 1)));
        assert_eq!(best_match(&u, candidates, |(_, p)| *p), Some(("b", 5)));
    }

    #[test]
    fn test_best_match_keeps_earliest_on_tie() {
        let u = Utterance::new("price");
        let t = words(&["price"]);
        let candidates = vec![(t.as_slice(), "first"), (t.as_slice(), "second")];
        assert_eq!(best_match(&u, candidates, |_| 0), Some("first"));
    }
}
