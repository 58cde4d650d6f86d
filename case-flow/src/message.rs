use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One actionable event referenced by an article, with whether it matched
/// the events extracted from the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionableEvent {
    pub event: String,
    pub matches_query: bool,
}

/// A scored literature article, decoded from one streamed
/// `article_analysis` event. Immutable once created; accumulated in arrival
/// order for the duration of a retrieval run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub pmid: String,
    pub title: String,
    pub points: f64,
    pub full_text: String,
    pub journal_title: Option<String>,
    pub journal_impact_score: Option<f64>,
    pub year: Option<i32>,
    pub cancer_type: Option<String>,
    pub paper_type: Option<String>,
    pub actionable_events: Vec<ActionableEvent>,
    pub drugs_tested: Vec<String>,
    pub drug_results: Vec<String>,
    pub point_breakdown: Option<Value>,
}

/// Final synthesized narrative, returned by the synthesis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisText {
    pub markdown: String,
}

/// Closed set of conversation entry payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum MessageBody {
    Text { text: String },
    Document { articles: Vec<ArticleRecord> },
    Analysis { state: AnalysisState },
}

/// An analysis message starts life as a loading marker and is followed by a
/// separate message carrying the final markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisState {
    Loading,
    Complete { markdown: String },
}

/// An entry in the append-only conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl ConversationMessage {
    fn with_body(body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            body,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_body(MessageBody::Text { text: text.into() })
    }

    pub fn document(articles: Vec<ArticleRecord>) -> Self {
        Self::with_body(MessageBody::Document { articles })
    }

    pub fn analysis_loading() -> Self {
        Self::with_body(MessageBody::Analysis {
            state: AnalysisState::Loading,
        })
    }

    pub fn analysis(markdown: impl Into<String>) -> Self {
        Self::with_body(MessageBody::Analysis {
            state: AnalysisState::Complete {
                markdown: markdown.into(),
            },
        })
    }

    pub fn is_document(&self) -> bool {
        matches!(self.body, MessageBody::Document { .. })
    }
}
