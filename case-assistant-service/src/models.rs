use case_flow::ConversationMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeCaseRequest {
    pub case_notes: String,
    #[serde(default)]
    pub lab_results: String,
    /// How many articles the retrieval service should analyze.
    #[serde(default = "default_num_articles")]
    pub num_articles: u32,
}

pub(crate) fn default_num_articles() -> u32 {
    2
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadConversationRequest {
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub conversation_id: String,
    pub status: String,
    pub disease: String,
    pub events: Vec<String>,
    pub progress: String,
    pub articles_processed: usize,
    pub total_articles_expected: u32,
    pub messages: Vec<ConversationMessage>,
}
