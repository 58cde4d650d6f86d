use serde::{Deserialize, Serialize};

use crate::message::ArticleRecord;

/// Progress fields carried by an `article_analysis` event. Either count may
/// be zero when the producer has nothing useful to report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArticleProgress {
    pub article_number: u32,
    pub total_articles: u32,
}

/// The closed set of events a retrieval stream can produce, in arrival
/// order. `Complete` is the terminal signal for the streaming portion; the
/// consume loop does not assume any maximum event count before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetrievalEvent {
    /// The service accepted the request and reports how many articles it
    /// expects to analyze.
    Processing { total_articles: u32 },
    /// Candidate article identifiers. Informational only.
    Pmids(Vec<String>),
    /// One analyzed article.
    ArticleAnalysis {
        record: ArticleRecord,
        progress: Option<ArticleProgress>,
    },
    /// Terminal: all articles have been streamed.
    Complete,
}
