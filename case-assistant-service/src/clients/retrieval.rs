use async_trait::async_trait;
use case_flow::{
    ActionableEvent, ArticleProgress, ArticleRecord, FlowError, Result, RetrievalEvent,
    RetrievalService,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Client for the streaming retrieval/analysis service. The service answers
/// a POST with newline-delimited JSON events (optionally SSE `data:` framed);
/// each decoded event is forwarded through a channel in arrival order.
pub struct HttpRetrievalService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRetrievalService {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RetrievalService for HttpRetrievalService {
    async fn stream_articles(
        &self,
        disease: &str,
        events: &[String],
        prompt_template: &str,
        article_count_hint: u32,
    ) -> Result<mpsc::Receiver<Result<RetrievalEvent>>> {
        info!(disease, num_articles = article_count_hint, "starting article retrieval stream");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "disease": disease,
                "events": events,
                "prompt_content": prompt_template,
                "num_articles": article_count_hint,
            }))
            .send()
            .await
            .map_err(map_request_error)?
            .error_for_status()
            .map_err(|e| FlowError::Service(e.to_string()))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_events(response, tx));
        Ok(rx)
    }
}

/// Read the response body incrementally, frame it into lines and forward
/// decoded events. A send failure means the consumer is gone (run finished
/// or cancelled) and reading stops.
async fn pump_events(mut response: reqwest::Response, tx: mpsc::Sender<Result<RetrievalEvent>>) {
    let mut buffer = String::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(decode_line(&line)).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("retrieval stream transport error: {err}");
                let _ = tx.send(Err(map_request_error(err))).await;
                return;
            }
        }
    }

    let trailing = buffer.trim();
    if !trailing.is_empty() {
        let _ = tx.send(decode_line(trailing)).await;
    }
}

fn map_request_error(err: reqwest::Error) -> FlowError {
    if err.is_connect() || err.is_timeout() {
        FlowError::Transport(err.to_string())
    } else {
        FlowError::Service(err.to_string())
    }
}

fn decode_line(line: &str) -> Result<RetrievalEvent> {
    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    let wire: WireEvent = serde_json::from_str(payload)
        .map_err(|e| FlowError::StreamProtocol(format!("{e}: {payload}")))?;
    wire.into_event()
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WireEvent {
    Metadata(WireMetadata),
    Pmids(WirePmids),
    ArticleAnalysis(WireArticleAnalysis),
}

#[derive(Deserialize)]
struct WireMetadata {
    status: String,
    #[serde(default)]
    total_articles: u32,
}

#[derive(Deserialize)]
struct WirePmids {
    pmids: Vec<String>,
}

#[derive(Deserialize)]
struct WireArticleAnalysis {
    analysis: WireAnalysis,
    #[serde(default)]
    progress: Option<WireProgress>,
}

#[derive(Deserialize)]
struct WireAnalysis {
    article_metadata: WireArticleMetadata,
    #[serde(default)]
    full_article_text: String,
}

#[derive(Deserialize)]
struct WireProgress {
    #[serde(default)]
    article_number: u32,
    #[serde(default)]
    total_articles: u32,
}

#[derive(Deserialize)]
struct WireArticleMetadata {
    #[serde(rename = "PMID")]
    pmid: String,
    title: String,
    #[serde(default)]
    overall_points: f64,
    #[serde(default)]
    journal_title: Option<String>,
    #[serde(default)]
    journal_sjr: Option<f64>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    type_of_cancer: Option<String>,
    #[serde(default)]
    paper_type: Option<String>,
    #[serde(default)]
    actionable_events: Vec<WireActionableEvent>,
    #[serde(default)]
    drugs_tested: Vec<String>,
    #[serde(default)]
    drug_results: Vec<String>,
    #[serde(default)]
    point_breakdown: Option<Value>,
}

#[derive(Deserialize)]
struct WireActionableEvent {
    event: String,
    #[serde(default)]
    matches_query: bool,
}

impl WireEvent {
    fn into_event(self) -> Result<RetrievalEvent> {
        match self {
            WireEvent::Metadata(metadata) => match metadata.status.as_str() {
                "processing" => Ok(RetrievalEvent::Processing {
                    total_articles: metadata.total_articles,
                }),
                "complete" => Ok(RetrievalEvent::Complete),
                other => Err(FlowError::StreamProtocol(format!(
                    "unknown metadata status: {other}"
                ))),
            },
            WireEvent::Pmids(pmids) => Ok(RetrievalEvent::Pmids(pmids.pmids)),
            WireEvent::ArticleAnalysis(analysis) => {
                let metadata = analysis.analysis.article_metadata;
                let record = ArticleRecord {
                    pmid: metadata.pmid,
                    title: metadata.title,
                    points: metadata.overall_points,
                    full_text: analysis.analysis.full_article_text,
                    journal_title: metadata.journal_title,
                    journal_impact_score: metadata.journal_sjr,
                    year: metadata.year,
                    cancer_type: metadata.type_of_cancer,
                    paper_type: metadata.paper_type,
                    actionable_events: metadata
                        .actionable_events
                        .into_iter()
                        .map(|e| ActionableEvent {
                            event: e.event,
                            matches_query: e.matches_query,
                        })
                        .collect(),
                    drugs_tested: metadata.drugs_tested,
                    drug_results: metadata.drug_results,
                    point_breakdown: metadata.point_breakdown,
                };
                let progress = analysis.progress.map(|p| ArticleProgress {
                    article_number: p.article_number,
                    total_articles: p.total_articles,
                });
                Ok(RetrievalEvent::ArticleAnalysis { record, progress })
            }
        }
    }
}
