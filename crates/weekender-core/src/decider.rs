//! The decision collaborator: maps the conversation to one [`Decision`] per turn.

use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use weekender_types::{Conversation, Decision, DecisionError};

/// Reply for input that matches no keyword.
pub const HELP_ANSWER: &str = "Try: weather, books, joke, dog, movies trivia 🙂";

/// Coordinates used for weather lookups (New Delhi).
const WEATHER_LATITUDE: f64 = 28.6139;
const WEATHER_LONGITUDE: f64 = 77.2090;

/// Recommendations requested per call.
const RECOMMENDATION_LIMIT: u64 = 3;

/// Boxed future returned by [`Decider::decide`].
pub type DecisionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Decision, DecisionError>> + Send + 'a>>;

/// Picks what to do with the latest user turn.
///
/// Dyn-compatible so the dispatcher works with `Arc<dyn Decider>`; a language
/// model backed implementation can slot in behind the same interface.
pub trait Decider: Send + Sync {
    fn decide<'a>(&'a self, conversation: &'a Conversation) -> DecisionFuture<'a>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Keyword matching stand-in for a reasoning component.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordDecider;

impl KeywordDecider {
    /// Decide on one piece of user text.
    pub fn decide_text(&self, text: &str) -> Decision {
        let text = text.to_lowercase();

        if text.contains("weather") {
            return invoke(
                "get_weather",
                [
                    ("latitude", Value::from(WEATHER_LATITUDE)),
                    ("longitude", Value::from(WEATHER_LONGITUDE)),
                ],
            );
        }

        if text.contains("book") {
            let topic = topic_without(&text, &["books", "book"], "technology");
            return invoke(
                "book_recs",
                [
                    ("topic", Value::from(topic)),
                    ("limit", Value::from(RECOMMENDATION_LIMIT)),
                ],
            );
        }

        if text.contains("joke") {
            return Decision::invoke("random_joke", Map::new());
        }

        if text.contains("dog") {
            return Decision::invoke("random_dog", Map::new());
        }

        if text.contains("trivia") {
            return Decision::invoke("trivia", Map::new());
        }

        const SCREEN_WORDS: [&str; 5] = ["movies", "movie", "film", "series", "show"];
        if SCREEN_WORDS.iter().any(|w| text.contains(w)) {
            let topic = topic_without(&text, &SCREEN_WORDS, "drama");
            return invoke(
                "movie_recs",
                [
                    ("topic", Value::from(topic)),
                    ("limit", Value::from(RECOMMENDATION_LIMIT)),
                ],
            );
        }

        Decision::final_answer(HELP_ANSWER)
    }
}

impl Decider for KeywordDecider {
    fn decide<'a>(&'a self, conversation: &'a Conversation) -> DecisionFuture<'a> {
        Box::pin(async move {
            let text = conversation
                .last_user_text()
                .ok_or(DecisionError::EmptyConversation)?;
            Ok(self.decide_text(text))
        })
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Remove each keyword in turn; fall back to `default` when nothing is left.
fn topic_without(text: &str, keywords: &[&str], default: &str) -> String {
    let stripped = keywords
        .iter()
        .fold(text.to_string(), |acc, word| acc.replace(word, ""));
    let topic = stripped.trim();
    if topic.is_empty() {
        default.to_string()
    } else {
        topic.to_string()
    }
}

fn invoke<const N: usize>(tool_name: &str, args: [(&str, Value); N]) -> Decision {
    let args = args
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    Decision::invoke(tool_name, args)
}

/// Adapter for collaborators that emit untyped JSON payloads.
///
/// Every payload is validated into a [`Decision`]; any other shape surfaces as
/// [`DecisionError::ProtocolViolation`].
pub struct JsonDecider<F> {
    name: String,
    produce: F,
}

impl<F> JsonDecider<F>
where
    F: Fn(&Conversation) -> Value + Send + Sync,
{
    pub fn new(name: impl Into<String>, produce: F) -> Self {
        Self {
            name: name.into(),
            produce,
        }
    }
}

impl<F> Decider for JsonDecider<F>
where
    F: Fn(&Conversation) -> Value + Send + Sync,
{
    fn decide<'a>(&'a self, conversation: &'a Conversation) -> DecisionFuture<'a> {
        Box::pin(async move { Decision::try_from((self.produce)(conversation)) })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
