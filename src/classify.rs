//! Casual-vs-document message classifier.
//!
//! Decides whether a message is small talk (routed straight to the chat
//! model) or a document question (routed through retrieval). The rules run
//! in a fixed order; the document-intent override sits between the
//! short-utterance rule and the second-person rule, so reordering changes
//! behavior.
//!
//! Rule order over the lowercased, trimmed message:
//! 1. greeting/acknowledgement regex patterns → casual
//! 2. casual keyword substrings → casual
//! 3. at most 3 words and no `?` → casual
//! 4. document-intent substrings → NOT casual
//! 5. "what are you"-style combos → casual
//! 6. second-person word (`you`/`your`/`yourself`) and at most 10 words → casual
//! 7. otherwise → not casual

use anyhow::Result;
use regex::Regex;

const CASUAL_PATTERNS: [&str; 10] = [
    r"^(hi|hey|hello|sup|what's up|wassup|yo)\b",
    r"^(thanks|thank you|thx|ty|appreciate it)\b",
    r"^(bye|goodbye|see you|cya|later)\b",
    r"^(how are you|how's it going|how are ya|how do you do)\b",
    r"^(ok|okay|cool|nice|great|awesome|perfect)\b",
    r"^(yes|no|yeah|yep|nope|sure)\b",
    r"(what are you|what're you|whatcha|wyd)",
    r"(tell me about yourself|who are you|introduce yourself)",
    r"(good morning|good afternoon|good evening|good night)",
    r"(nice to meet you|pleased to meet you)",
];

const CASUAL_KEYWORDS: [&str; 8] = [
    "doing now",
    "doing today",
    "your name",
    "about you",
    "feeling",
    "your day",
    "up to",
    "busy",
];

/// Substrings that mark document intent and veto the later casual rules.
const DOCUMENT_MARKERS: [&str; 9] = [
    "document", "file", "pdf", "content", "show", "find", "search", "list", "extract",
];

const SELF_COMBOS: [&str; 3] = ["what are you", "what're you", "whatcha"];

pub struct CasualClassifier {
    patterns: Vec<Regex>,
}

impl CasualClassifier {
    pub fn new() -> Result<Self> {
        let patterns = CASUAL_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_casual(&self, message: &str) -> bool {
        let normalized = message.to_lowercase();
        let msg = normalized.trim();

        if self.patterns.iter().any(|p| p.is_match(msg)) {
            return true;
        }

        if CASUAL_KEYWORDS.iter().any(|k| msg.contains(k)) {
            return true;
        }

        let words: Vec<&str> = msg.split_whitespace().collect();
        if words.len() <= 3 && !msg.contains('?') {
            return true;
        }

        if DOCUMENT_MARKERS.iter().any(|m| msg.contains(m)) {
            return false;
        }

        if SELF_COMBOS.iter().any(|c| msg.contains(c)) {
            return true;
        }

        if words.len() <= 10
            && (words.contains(&"you") || words.contains(&"your") || words.contains(&"yourself"))
        {
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> CasualClassifier {
        CasualClassifier::new().unwrap()
    }

    #[test]
    fn greetings_are_casual() {
        let c = classifier();
        assert!(c.is_casual("hi"));
        assert!(c.is_casual("Hello there, how is everything going today with you?"));
        assert!(c.is_casual("thanks a lot"));
        assert!(c.is_casual("Good morning!"));
        assert!(c.is_casual("yes"));
    }

    #[test]
    fn casual_keywords_match_anywhere() {
        let c = classifier();
        assert!(c.is_casual("hey what is your name?"));
        assert!(c.is_casual("tell me what you have been up to"));
    }

    #[test]
    fn short_statements_without_question_mark_are_casual() {
        let c = classifier();
        assert!(c.is_casual("sounds good"));
        assert!(c.is_casual(""));
        // Short BUT with document wording still trips the earlier
        // short-utterance rule; the override only guards later rules.
        assert!(c.is_casual("the document"));
    }

    #[test]
    fn document_intent_overrides_second_person() {
        let c = classifier();
        assert!(!c.is_casual("could you list the key findings"));
        assert!(!c.is_casual("can you show me the summary"));
        assert!(!c.is_casual("please search for the budget numbers"));
    }

    #[test]
    fn document_markers_match_as_substrings() {
        let c = classifier();
        // "filing" contains "file"
        assert!(!c.is_casual("what is the total revenue reported in the quarterly filing?"));
    }

    #[test]
    fn second_person_small_talk_is_casual() {
        let c = classifier();
        assert!(c.is_casual("what are you working on these days"));
        assert!(c.is_casual("do you ever get tired of questions?"));
    }

    #[test]
    fn substantive_questions_are_not_casual() {
        let c = classifier();
        assert!(!c.is_casual("what were the main conclusions of the report chapter?"));
        assert!(!c.is_casual("summarize the experimental methodology described in section three please"));
    }
}
