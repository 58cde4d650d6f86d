use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::Result,
    event::RetrievalEvent,
    message::{AnalysisText, ArticleRecord},
};

/// Disease/event extraction over a combined-notes payload. The two calls
/// are logically independent and the orchestrator issues them concurrently.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract_disease(&self, notes: &str) -> Result<String>;

    async fn extract_events(&self, notes: &str, prompt_template: &str) -> Result<Vec<String>>;
}

/// Literature retrieval and scoring. Implementations return a channel of
/// typed events; a mid-stream failure is delivered in-band as an `Err`
/// element and ends the stream.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn stream_articles(
        &self,
        disease: &str,
        events: &[String],
        prompt_template: &str,
        article_count_hint: u32,
    ) -> Result<mpsc::Receiver<Result<RetrievalEvent>>>;
}

/// Final narrative synthesis over the case materials and the accumulated
/// articles. Only invoked after the retrieval stream has completed.
#[async_trait]
pub trait SynthesisService: Send + Sync {
    async fn synthesize(
        &self,
        combined_notes: &str,
        disease: &str,
        events: &[String],
        articles: &[ArticleRecord],
    ) -> Result<AnalysisText>;
}
