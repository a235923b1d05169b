//! Lexicon — the registry of phrase/pattern/word-set rules bound to handlers.
//!
//! Rules are registered during setup and frozen once the runtime starts;
//! matching returns every satisfied rule, not just the best one, and each
//! handler is invoked independently.

use crate::runtime::bot::Bot;
use crate::runtime::trigger::Trigger;
use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A command handler: invoked with the bot owning the room and the trigger
/// built for the inbound message.
pub type Handler = Arc<dyn Fn(Arc<Bot>, Trigger) -> HandlerFuture + Send + Sync>;

/// What a rule matches on.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact match of the trigger's first normalized token.
    Phrase(String),
    /// Regular expression tested against the raw message text.
    Pattern(Regex),
    /// Matches when the trigger's word set contains every listed word.
    WordSet(Vec<String>),
}

impl Matcher {
    /// Lowercase phrase matcher.
    pub fn phrase(phrase: impl Into<String>) -> Self {
        Self::Phrase(phrase.into().to_lowercase())
    }

    /// Word-set matcher; words are lowercased at registration.
    pub fn words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::WordSet(words.into_iter().map(|w| w.into().to_lowercase()).collect())
    }

    fn is_match(&self, trigger: &Trigger) -> bool {
        match self {
            Self::Phrase(phrase) => trigger.tokens.first().is_some_and(|t| t == phrase),
            Self::Pattern(re) => re.is_match(&trigger.text),
            Self::WordSet(words) => words.iter().all(|w| trigger.words.contains(w)),
        }
    }
}

/// One registered rule.
#[derive(Clone)]
pub struct LexiconRule {
    pub id: u64,
    pub matcher: Matcher,
    pub priority: i32,
    pub handler: Handler,
}

/// Registry of rules in insertion order.
#[derive(Default)]
pub struct Lexicon {
    rules: Vec<LexiconRule>,
    next_id: u64,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler at default priority. Returns the rule id.
    pub fn hears<F, Fut>(&mut self, matcher: Matcher, handler: F) -> u64
    where
        F: Fn(Arc<Bot>, Trigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hears_prioritized(matcher, 0, handler)
    }

    /// Register a handler with an explicit priority (lower runs first).
    pub fn hears_prioritized<F, Fut>(&mut self, matcher: Matcher, priority: i32, handler: F) -> u64
    where
        F: Fn(Arc<Bot>, Trigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.rules.push(LexiconRule {
            id,
            matcher,
            priority,
            handler: Arc::new(move |bot, trigger| Box::pin(handler(bot, trigger))),
        });
        id
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule satisfied by the trigger, ordered by priority then
    /// registration order. Returns owned clones so dispatch iterates a
    /// stable snapshot even if the registry is replaced later.
    pub fn matches(&self, trigger: &Trigger) -> Vec<LexiconRule> {
        let mut matched: Vec<LexiconRule> = self
            .rules
            .iter()
            .filter(|rule| rule.matcher.is_match(trigger))
            .cloned()
            .collect();
        matched.sort_by_key(|rule| (rule.priority, rule.id));
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::trigger::test_trigger;

    fn noop() -> impl Fn(Arc<Bot>, Trigger) -> std::future::Ready<()> + Send + Sync {
        |_bot, _trigger| std::future::ready(())
    }

    #[test]
    fn test_word_set_superset_matches() {
        let mut lexicon = Lexicon::new();
        lexicon.hears(Matcher::words(["dl", "sync"]), noop());

        let yes = test_trigger("please dl sync now");
        assert_eq!(lexicon.matches(&yes).len(), 1);

        let no = test_trigger("dl synchronize");
        assert!(lexicon.matches(&no).is_empty());
    }

    #[test]
    fn test_phrase_matches_first_token_only() {
        let mut lexicon = Lexicon::new();
        lexicon.hears(Matcher::phrase("Status"), noop());

        assert_eq!(lexicon.matches(&test_trigger("status report please")).len(), 1);
        assert!(lexicon.matches(&test_trigger("give me status")).is_empty());
    }

    #[test]
    fn test_pattern_tests_raw_text() {
        let mut lexicon = Lexicon::new();
        let re = Regex::new(r"(?i)ticket-\d+").unwrap();
        lexicon.hears(Matcher::Pattern(re), noop());

        assert_eq!(lexicon.matches(&test_trigger("see TICKET-42 today")).len(), 1);
        assert!(lexicon.matches(&test_trigger("no ticket here")).is_empty());
    }

    #[test]
    fn test_all_satisfied_rules_returned_in_priority_order() {
        let mut lexicon = Lexicon::new();
        let low = lexicon.hears_prioritized(Matcher::phrase("deploy"), 10, noop());
        let high = lexicon.hears_prioritized(Matcher::words(["deploy"]), 1, noop());
        lexicon.hears(Matcher::phrase("rollback"), noop());

        let matched = lexicon.matches(&test_trigger("deploy the api"));
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].id, high);
        assert_eq!(matched[1].id, low);
    }
}
