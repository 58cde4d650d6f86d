use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::message::ArticleRecord;

/// Free-text case material entered by the user. Mutable until extraction
/// starts; cleared when the session is cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseInput {
    pub case_notes: String,
    pub lab_results: String,
}

impl CaseInput {
    pub fn new(case_notes: impl Into<String>, lab_results: impl Into<String>) -> Self {
        Self {
            case_notes: case_notes.into(),
            lab_results: lab_results.into(),
        }
    }

    /// Single combined payload sent to every external service. The segment
    /// layout matters: downstream prompts key off the two headers.
    pub fn combined_notes(&self) -> String {
        [
            "Case Notes:",
            self.case_notes.as_str(),
            "\nLab Results:",
            self.lab_results.as_str(),
        ]
        .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.case_notes.trim().is_empty() && self.lab_results.trim().is_empty()
    }
}

/// Disease and actionable events extracted from a case. Produced once per
/// case and immutable thereafter for that session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub disease: String,
    pub events: Vec<String>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.disease.is_empty() || self.events.is_empty()
    }
}

/// Transient state for one retrieval invocation. Reset when a run starts;
/// the accumulated articles are only persisted through the document message
/// written at stream completion.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRunState {
    pub total_articles_expected: u32,
    pub accumulated_articles: Vec<ArticleRecord>,
    pub current_progress_message: String,
    pub current_article_in_flight: Option<ArticleRecord>,
    pub pmids: Vec<String>,
}

impl RetrievalRunState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The full per-session state, as one explicit value object. The processing
/// flags are the sole mutual exclusion guarding the retrieval phase: they
/// are set before any suspension point and cleared on every exit path.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub conversation_id: String,
    pub case_input: CaseInput,
    pub extraction: ExtractionResult,
    /// One-shot flag requesting auto-continuation; cleared when the trigger
    /// fires.
    pub just_extracted: bool,
    pub is_extracting: bool,
    pub is_retrieving: bool,
    pub is_processing_articles: bool,
    pub is_loading_chat_history: bool,
    pub run: RetrievalRunState,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            case_input: CaseInput::default(),
            extraction: ExtractionResult::default(),
            just_extracted: false,
            is_extracting: false,
            is_retrieving: false,
            is_processing_articles: false,
            is_loading_chat_history: false,
            run: RetrievalRunState::default(),
        }
    }

    /// Reset to initial values under a fresh conversation id, so a cleared
    /// session can extract again without residual guard blocking.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap-to-clone handle to one session. Clones share the same state and
/// cancellation token, so a handle captured by a background task observes
/// the same flags the request path mutates.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    state: Arc<RwLock<SessionState>>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(SessionState::new())),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().await
    }

    /// Token observed by the retrieval consume loop for the current run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    /// Cancel any in-flight stream and arm a fresh token for the next run.
    pub fn cancel_active_run(&self) {
        let mut guard = self.cancel.lock().unwrap();
        guard.cancel();
        *guard = CancellationToken::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_notes_keeps_section_headers() {
        let input = CaseInput::new("fever, cough", "WBC 14k");
        let combined = input.combined_notes();
        assert_eq!(
            combined,
            "Case Notes:\n\nfever, cough\n\n\nLab Results:\n\nWBC 14k"
        );
    }

    #[test]
    fn clear_resets_flags_and_rotates_conversation() {
        let mut state = SessionState::new();
        let old_conversation = state.conversation_id.clone();
        state.is_retrieving = true;
        state.just_extracted = true;
        state.extraction.disease = "pneumonia".to_string();
        state.run.current_progress_message = "Processing...".to_string();

        state.clear();

        assert_ne!(state.conversation_id, old_conversation);
        assert!(!state.is_retrieving);
        assert!(!state.just_extracted);
        assert!(state.extraction.disease.is_empty());
        assert!(state.run.current_progress_message.is_empty());
    }

    #[test]
    fn cancel_active_run_arms_a_fresh_token() {
        let session = Session::new();
        let first = session.cancellation_token();
        session.cancel_active_run();
        assert!(first.is_cancelled());
        assert!(!session.cancellation_token().is_cancelled());
    }
}
