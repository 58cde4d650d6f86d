//! The Case Workflow Orchestrator: extraction, streamed retrieval with
//! incremental accumulation, final-analysis dispatch, and the guarded
//! auto-continuation between them.
//!
//! Every phase entry point converts failures into user-visible session state
//! instead of propagating them; partial progress is never rolled back.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{FlowError, Result},
    event::{ArticleProgress, RetrievalEvent},
    message::{ArticleRecord, ConversationMessage},
    services::{ExtractionService, RetrievalService, SynthesisService},
    session::{ExtractionResult, Session},
    store::ConversationStore,
    trigger::{TriggerDecision, auto_continue},
};

pub const NETWORK_ERROR_TEXT: &str = "Network error. Please check your connection and try again.";
pub const PROGRESS_SYNTHESIZING: &str = "Article analysis complete. Generating final analysis...";
pub const PROGRESS_COMPLETE: &str = "Processing complete.";
pub const PROGRESS_SYNTHESIS_ERROR: &str = "Error generating final analysis. Please try again.";
pub const PROGRESS_RETRIEVAL_ERROR: &str = "Error retrieving articles. Please try again.";

/// Sequences a case through extraction, retrieval and synthesis against a
/// set of external collaborators. Cheap to clone; clones share the same
/// service handles.
#[derive(Clone)]
pub struct CaseOrchestrator {
    extraction: Arc<dyn ExtractionService>,
    retrieval: Arc<dyn RetrievalService>,
    synthesis: Arc<dyn SynthesisService>,
    store: Arc<dyn ConversationStore>,
}

impl CaseOrchestrator {
    pub fn new(
        extraction: Arc<dyn ExtractionService>,
        retrieval: Arc<dyn RetrievalService>,
        synthesis: Arc<dyn SynthesisService>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            extraction,
            retrieval,
            synthesis,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Extraction phase. Runs the two sub-requests concurrently, persists
    /// the initial-case record and arms the one-shot auto-continuation flag.
    ///
    /// Never fails past its own boundary: any error becomes a degenerate
    /// result whose fields carry the error message.
    pub async fn extract(&self, session: &Session, extraction_prompt: &str) -> ExtractionResult {
        session.write().await.is_extracting = true;

        let (conversation_id, case_input) = {
            let state = session.read().await;
            (state.conversation_id.clone(), state.case_input.clone())
        };
        let combined = case_input.combined_notes();

        info!(session = %session.id, "starting extraction");
        let (disease_res, events_res) = tokio::join!(
            self.extraction.extract_disease(&combined),
            self.extraction.extract_events(&combined, extraction_prompt),
        );

        let result = match (disease_res, events_res) {
            (Ok(disease), Ok(events)) => {
                info!(disease = %disease, events = events.len(), "extraction complete");
                let result = ExtractionResult { disease, events };
                session.write().await.extraction = result.clone();

                match self
                    .store
                    .initialize_conversation(&conversation_id, case_input, result.clone())
                    .await
                {
                    Ok(()) => {
                        // Request auto-continuation only once the initial
                        // case record is durable.
                        session.write().await.just_extracted = true;
                    }
                    Err(err) => {
                        error!(conversation = %conversation_id, "failed to initialize conversation: {err}");
                    }
                }
                result
            }
            (Err(err), _) | (_, Err(err)) => {
                error!("extraction failed: {err}");
                let result = degenerate_extraction(&err);
                session.write().await.extraction = result.clone();
                result
            }
        };

        session.write().await.is_extracting = false;
        result
    }

    /// Evaluate the auto-continuation rule and start retrieval if it fires.
    /// Returns whether a run was started. Intended to be called after every
    /// state transition that could satisfy the rule.
    pub async fn poll_auto_continue(
        &self,
        session: &Session,
        prompt_template: &str,
        article_count_hint: u32,
    ) -> bool {
        let conversation_id = session.read().await.conversation_id.clone();
        let has_document = match self.store.has_document_message(&conversation_id).await {
            Ok(found) => found,
            Err(err) => {
                warn!("could not check for document messages: {err}");
                false
            }
        };

        let fire = {
            let mut state = session.write().await;
            match auto_continue(&state, has_document) {
                Some(TriggerDecision::StartRetrieval) => {
                    // Clear the one-shot flag before suspending so a
                    // concurrent re-evaluation cannot fire again.
                    state.just_extracted = false;
                    true
                }
                None => false,
            }
        };

        if fire {
            info!(session = %session.id, "auto-continuing into retrieval");
            self.retrieve(session, prompt_template, article_count_hint)
                .await;
        }
        fire
    }

    /// Retrieval/analysis phase. A violated precondition is a silent no-op;
    /// everything else ends in the finalizer that clears the processing
    /// flags, so a failed run can always be retried.
    pub async fn retrieve(&self, session: &Session, prompt_template: &str, article_count_hint: u32) {
        let conversation_id = session.read().await.conversation_id.clone();
        let has_document = match self.store.has_document_message(&conversation_id).await {
            Ok(found) => found,
            Err(err) => {
                warn!("could not check for document messages: {err}");
                false
            }
        };

        let (disease, events, combined_notes) = {
            let mut state = session.write().await;
            let blocked = state.is_retrieving
                || state.is_processing_articles
                || state.extraction.is_empty()
                || state.is_loading_chat_history
                || has_document;
            if blocked {
                info!(session = %session.id, "retrieval preconditions not met, skipping");
                return;
            }
            state.is_retrieving = true;
            state.is_processing_articles = true;
            state.run.reset();
            (
                state.extraction.disease.clone(),
                state.extraction.events.clone(),
                state.case_input.combined_notes(),
            )
        };

        let cancel = session.cancellation_token();
        let outcome = self
            .consume_stream(
                session,
                &conversation_id,
                &disease,
                &events,
                &combined_notes,
                prompt_template,
                article_count_hint,
                cancel,
            )
            .await;

        if let Err(err) = outcome {
            error!(session = %session.id, "retrieval run failed: {err}");
            session.write().await.run.current_progress_message =
                PROGRESS_RETRIEVAL_ERROR.to_string();
        }

        let mut state = session.write().await;
        state.is_retrieving = false;
        state.is_processing_articles = false;
        state.run.current_article_in_flight = None;
    }

    #[allow(clippy::too_many_arguments)]
    async fn consume_stream(
        &self,
        session: &Session,
        conversation_id: &str,
        disease: &str,
        events: &[String],
        combined_notes: &str,
        prompt_template: &str,
        article_count_hint: u32,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut stream = self
            .retrieval
            .stream_articles(disease, events, prompt_template, article_count_hint)
            .await?;

        // Authoritative accumulator for this run. The session state carries
        // a display copy, but the document message is built from this
        // sequence so batched state updates cannot race it.
        let mut accumulated: Vec<ArticleRecord> = Vec::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(session = %session.id, "retrieval run cancelled");
                    return Ok(());
                }
                next = stream.recv() => next,
            };

            let Some(event) = next else {
                // Stream ended without a terminal event.
                warn!(session = %session.id, "retrieval stream closed before completion");
                break;
            };

            match event? {
                RetrievalEvent::Processing { total_articles } => {
                    let mut state = session.write().await;
                    state.run.total_articles_expected = total_articles;
                    state.run.current_progress_message =
                        format!("Analyzing {total_articles} articles...");
                }
                RetrievalEvent::Pmids(pmids) => {
                    let mut state = session.write().await;
                    state.run.current_progress_message =
                        format!("Retrieved {} candidate articles...", pmids.len());
                    state.run.pmids = pmids;
                }
                RetrievalEvent::ArticleAnalysis { record, progress } => {
                    accumulated.push(record.clone());
                    let mut state = session.write().await;
                    state.run.current_article_in_flight = Some(record.clone());
                    state.run.accumulated_articles.push(record);
                    state.run.current_progress_message =
                        article_progress_text(progress.as_ref(), accumulated.len());
                }
                RetrievalEvent::Complete => {
                    self.finish_run(
                        session,
                        conversation_id,
                        disease,
                        events,
                        combined_notes,
                        &accumulated,
                    )
                    .await;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Terminal sequence for a completed stream: document message, loading
    /// marker, synthesis, final analysis message. Each persist is awaited
    /// before the next begins. A synthesis failure leaves the document
    /// message intact and only surfaces through the progress text.
    async fn finish_run(
        &self,
        session: &Session,
        conversation_id: &str,
        disease: &str,
        events: &[String],
        combined_notes: &str,
        accumulated: &[ArticleRecord],
    ) {
        info!(
            session = %session.id,
            articles = accumulated.len(),
            "stream complete, generating final analysis"
        );
        session.write().await.run.current_progress_message = PROGRESS_SYNTHESIZING.to_string();

        if let Err(err) = self
            .store
            .append_message(
                conversation_id,
                ConversationMessage::document(accumulated.to_vec()),
            )
            .await
        {
            error!("failed to persist document message: {err}");
            session.write().await.run.current_progress_message =
                PROGRESS_SYNTHESIS_ERROR.to_string();
            return;
        }

        if let Err(err) = self
            .store
            .append_message(conversation_id, ConversationMessage::analysis_loading())
            .await
        {
            error!("failed to persist analysis loading marker: {err}");
            session.write().await.run.current_progress_message =
                PROGRESS_SYNTHESIS_ERROR.to_string();
            return;
        }

        match self
            .synthesis
            .synthesize(combined_notes, disease, events, accumulated)
            .await
        {
            Ok(analysis) => {
                if let Err(err) = self
                    .store
                    .append_message(conversation_id, ConversationMessage::analysis(analysis.markdown))
                    .await
                {
                    error!("failed to persist final analysis: {err}");
                    session.write().await.run.current_progress_message =
                        PROGRESS_SYNTHESIS_ERROR.to_string();
                    return;
                }
                session.write().await.run.current_progress_message = PROGRESS_COMPLETE.to_string();
            }
            Err(err) => {
                error!("final analysis failed: {err}");
                session.write().await.run.current_progress_message =
                    PROGRESS_SYNTHESIS_ERROR.to_string();
            }
        }
    }

    /// Clear the session: cancel any in-flight stream, reset all transient
    /// state and flags, and rotate to a fresh conversation.
    pub async fn clear_session(&self, session: &Session) {
        session.cancel_active_run();
        session.write().await.clear();
        info!(session = %session.id, "session cleared");
    }

    /// Switch the session to an existing conversation, reloading its
    /// initial-case record. The loading flag suppresses auto-continuation
    /// until the reload settles.
    pub async fn load_conversation(&self, session: &Session, conversation_id: &str) -> Result<()> {
        session.cancel_active_run();
        {
            let mut state = session.write().await;
            state.clear();
            state.conversation_id = conversation_id.to_string();
            state.is_loading_chat_history = true;
        }

        let initial = self.store.initial_case(conversation_id).await;
        let mut state = session.write().await;
        state.is_loading_chat_history = false;
        match initial {
            Ok(Some(initial)) => {
                state.case_input = initial.case_input;
                state.extraction = initial.extraction;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn degenerate_extraction(err: &FlowError) -> ExtractionResult {
    let text = match err {
        FlowError::Transport(_) => NETWORK_ERROR_TEXT.to_string(),
        other => other.to_string(),
    };
    ExtractionResult {
        disease: text.clone(),
        events: vec![text],
    }
}

fn article_progress_text(progress: Option<&ArticleProgress>, processed_so_far: usize) -> String {
    match progress {
        Some(p) if p.article_number > 0 && p.total_articles > 0 => {
            let percent = p.article_number * 100 / p.total_articles;
            format!(
                "Processed article {} of {} ({percent}%)",
                p.article_number, p.total_articles
            )
        }
        // A zero total would divide by zero; report the count alone.
        _ => format!("Processed {processed_so_far} articles so far"),
    }
}
