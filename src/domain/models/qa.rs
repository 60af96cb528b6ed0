//! Gold QA items and the closed category sets they are grouped by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::errors::DatasetError;

/// Knowledge category a QA item was generated from.
///
/// Declaration order is the order the knowledge files are concatenated for
/// ceiling runs, and the order categories appear in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Architecture and technology choices.
    Decisions,
    /// Fixes and workarounds that worked.
    Solutions,
    /// Recurring designs and conventions.
    Patterns,
    /// Defects and their causes.
    Bugs,
    /// Lessons learned.
    Insights,
    /// Open questions.
    Questions,
    /// Step-by-step operations.
    Procedures,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Self; 7] = [
        Self::Decisions,
        Self::Solutions,
        Self::Patterns,
        Self::Bugs,
        Self::Insights,
        Self::Questions,
        Self::Procedures,
    ];

    /// Categories evaluated when no explicit list is configured.
    pub const DEFAULT_EVAL: [Self; 6] = [
        Self::Decisions,
        Self::Solutions,
        Self::Patterns,
        Self::Bugs,
        Self::Insights,
        Self::Procedures,
    ];

    /// Wire name, as used in datasets and engine commands.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decisions => "decisions",
            Self::Solutions => "solutions",
            Self::Patterns => "patterns",
            Self::Bugs => "bugs",
            Self::Insights => "insights",
            Self::Questions => "questions",
            Self::Procedures => "procedures",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| DatasetError::UnknownCategory(s.to_string()))
    }
}

/// Question type used by the conversational memory benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Answer sits in one session.
    SingleHop,
    /// Answer combines several sessions.
    MultiHop,
    /// Answer depends on when things happened.
    TemporalReasoning,
    /// Question has no answer in the conversation.
    Adversarial,
}

impl QuestionType {
    /// Every question type, in report order.
    pub const ALL: [Self; 4] = [
        Self::SingleHop,
        Self::MultiHop,
        Self::TemporalReasoning,
        Self::Adversarial,
    ];

    /// Wire name, as used in datasets.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleHop => "single_hop",
            Self::MultiHop => "multi_hop",
            Self::TemporalReasoning => "temporal_reasoning",
            Self::Adversarial => "adversarial",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == wanted)
            .ok_or_else(|| DatasetError::UnknownQuestionType(s.to_string()))
    }
}

/// One gold question/answer pair. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    /// Question text.
    pub question: String,

    /// Reference answer.
    #[serde(rename = "answer", deserialize_with = "string_or_scalar")]
    pub gold_answer: String,

    /// Knowledge category the question targets.
    pub category: Category,

    /// Session the answer came from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl QaItem {
    /// Item with no session reference.
    pub fn new(question: impl Into<String>, gold_answer: impl Into<String>, category: Category) -> Self {
        Self {
            question: question.into(),
            gold_answer: gold_answer.into(),
            category,
            session_id: None,
        }
    }
}

/// Gold dataset as produced by the dataset generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaDataset {
    /// Gold items in dataset order.
    pub qa_pairs: Vec<QaItem>,
}

impl QaDataset {
    /// Keep only `categories`, and at most `max_per_category` items of each,
    /// preserving dataset order.
    pub fn select(&self, categories: &[Category], max_per_category: Option<usize>) -> Vec<QaItem> {
        let mut counts = std::collections::HashMap::<Category, usize>::new();
        self.qa_pairs
            .iter()
            .filter(|qa| categories.contains(&qa.category))
            .filter(|qa| {
                let seen = counts.entry(qa.category).or_insert(0);
                match max_per_category {
                    Some(max) if *seen >= max => false,
                    _ => {
                        *seen += 1;
                        true
                    }
                }
            })
            .cloned()
            .collect()
    }
}

/// One utterance within a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    #[serde(default = "default_speaker", alias = "role")]
    pub speaker: String,

    /// What was said.
    #[serde(default, alias = "content")]
    pub text: String,
}

fn default_speaker() -> String {
    "user".to_string()
}

/// A benchmark question attached to one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationQa {
    /// Question text.
    pub question: String,

    /// Reference answer.
    #[serde(deserialize_with = "string_or_scalar")]
    pub answer: String,

    /// Reasoning the question needs.
    pub question_type: QuestionType,
}

/// A multi-session conversation used by the memory benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: String,

    /// Sessions in chronological order.
    #[serde(default)]
    pub sessions: Vec<Vec<Turn>>,

    /// Questions about this conversation.
    #[serde(default)]
    pub qa_pairs: Vec<ConversationQa>,
}

impl Conversation {
    /// Session transcripts as `speaker: text` lines joined by spaces, skipping
    /// empty turns and sessions that end up empty. The original session index
    /// is kept so labels stay stable.
    pub fn session_transcripts(&self) -> Vec<(usize, String)> {
        self.sessions
            .iter()
            .enumerate()
            .filter_map(|(i, turns)| {
                let text = turns
                    .iter()
                    .filter(|t| !t.text.trim().is_empty())
                    .map(|t| format!("{}: {}", t.speaker, t.text))
                    .collect::<Vec<_>>()
                    .join(" ");
                (!text.trim().is_empty()).then_some((i, text))
            })
            .collect()
    }
}

/// Benchmark dataset of conversations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationDataset {
    /// Conversations in file order.
    pub conversations: Vec<Conversation>,
}

/// Gold answers are sometimes numbers (years, counts) in generated datasets.
fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_)) => Ok(other.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string answer, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Bugs".parse::<Category>().unwrap(), Category::Bugs);
        assert_eq!(" procedures ".parse::<Category>().unwrap(), Category::Procedures);
        assert!(matches!(
            "misc".parse::<Category>(),
            Err(DatasetError::UnknownCategory(_))
        ));
    }

    #[test]
    fn unknown_category_is_a_parse_error() {
        let json = r#"{"qa_pairs":[{"question":"q","answer":"a","category":"misc"}]}"#;
        assert!(serde_json::from_str::<QaDataset>(json).is_err());
    }

    #[test]
    fn numeric_answers_are_accepted() {
        let json = r#"{"qa_pairs":[{"question":"When?","answer":2023,"category":"decisions","session_id":"s1"}]}"#;
        let ds: QaDataset = serde_json::from_str(json).unwrap();
        assert_eq!(ds.qa_pairs[0].gold_answer, "2023");
        assert_eq!(ds.qa_pairs[0].session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn select_filters_and_caps_in_order() {
        let ds = QaDataset {
            qa_pairs: vec![
                QaItem::new("q1", "a", Category::Bugs),
                QaItem::new("q2", "a", Category::Questions),
                QaItem::new("q3", "a", Category::Bugs),
                QaItem::new("q4", "a", Category::Patterns),
                QaItem::new("q5", "a", Category::Bugs),
            ],
        };

        let picked = ds.select(&Category::DEFAULT_EVAL, Some(2));
        let questions: Vec<_> = picked.iter().map(|q| q.question.as_str()).collect();
        assert_eq!(questions, vec!["q1", "q3", "q4"]);

        let all = ds.select(&Category::ALL, None);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn transcripts_skip_empty_sessions() {
        let conv: Conversation = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "sessions": [
                [{"speaker": "alice", "text": "hi"}, {"role": "bob", "content": "hello"}],
                [{"speaker": "alice", "text": "  "}],
                [{"text": "bye"}]
            ],
            "qa_pairs": []
        }))
        .unwrap();

        let transcripts = conv.session_transcripts();
        assert_eq!(transcripts.len(), 2);
        assert_eq!(transcripts[0], (0, "alice: hi bob: hello".to_string()));
        assert_eq!(transcripts[1], (2, "user: bye".to_string()));
    }
}
