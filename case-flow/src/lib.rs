pub mod error;
pub mod event;
pub mod message;
pub mod orchestrator;
pub mod services;
pub mod session;
pub mod store;
pub mod trigger;

// Re-export commonly used types
pub use error::{FlowError, Result};
pub use event::{ArticleProgress, RetrievalEvent};
pub use message::{
    ActionableEvent, AnalysisState, AnalysisText, ArticleRecord, ConversationMessage, MessageBody,
};
pub use orchestrator::CaseOrchestrator;
pub use services::{ExtractionService, RetrievalService, SynthesisService};
pub use session::{CaseInput, ExtractionResult, RetrievalRunState, Session, SessionState};
pub use store::{
    ConversationStore, InMemoryConversationStore, InMemorySessionStorage, InitialCase,
    SessionStorage,
};
pub use trigger::{TriggerDecision, auto_continue};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct ScenarioExtraction;

    #[async_trait]
    impl ExtractionService for ScenarioExtraction {
        async fn extract_disease(&self, notes: &str) -> Result<String> {
            assert!(notes.contains("fever, cough"));
            assert!(notes.contains("WBC 14k"));
            Ok("pneumonia".to_string())
        }

        async fn extract_events(&self, _notes: &str, _prompt: &str) -> Result<Vec<String>> {
            Ok(vec!["fever".to_string(), "elevated WBC".to_string()])
        }
    }

    struct ScenarioRetrieval;

    #[async_trait]
    impl RetrievalService for ScenarioRetrieval {
        async fn stream_articles(
            &self,
            disease: &str,
            events: &[String],
            _prompt: &str,
            _hint: u32,
        ) -> Result<mpsc::Receiver<Result<RetrievalEvent>>> {
            assert_eq!(disease, "pneumonia");
            assert_eq!(events.len(), 2);

            let (tx, rx) = mpsc::channel(8);
            for (number, pmid) in ["38012345", "38067890"].iter().enumerate() {
                tx.send(Ok(RetrievalEvent::ArticleAnalysis {
                    record: ArticleRecord {
                        pmid: pmid.to_string(),
                        title: format!("Study {pmid}"),
                        points: 42.0,
                        full_text: "...".to_string(),
                        journal_title: Some("Blood".to_string()),
                        journal_impact_score: Some(5.1),
                        year: Some(2025),
                        cancer_type: None,
                        paper_type: Some("clinical trial".to_string()),
                        actionable_events: vec![ActionableEvent {
                            event: "fever".to_string(),
                            matches_query: true,
                        }],
                        drugs_tested: vec!["amoxicillin".to_string()],
                        drug_results: vec!["responded".to_string()],
                        point_breakdown: None,
                    },
                    progress: Some(ArticleProgress {
                        article_number: number as u32 + 1,
                        total_articles: 2,
                    }),
                }))
                .await
                .unwrap();
            }
            tx.send(Ok(RetrievalEvent::Complete)).await.unwrap();
            Ok(rx)
        }
    }

    struct ScenarioSynthesis;

    #[async_trait]
    impl SynthesisService for ScenarioSynthesis {
        async fn synthesize(
            &self,
            _notes: &str,
            disease: &str,
            _events: &[String],
            articles: &[ArticleRecord],
        ) -> Result<AnalysisText> {
            assert_eq!(articles.len(), 2);
            Ok(AnalysisText {
                markdown: format!("## Case Analysis: {disease}"),
            })
        }
    }

    #[tokio::test]
    async fn case_flows_from_notes_to_final_analysis() {
        let store = Arc::new(InMemoryConversationStore::new());
        let orchestrator = CaseOrchestrator::new(
            Arc::new(ScenarioExtraction),
            Arc::new(ScenarioRetrieval),
            Arc::new(ScenarioSynthesis),
            store.clone(),
        );

        let session = Session::new();
        session.write().await.case_input = CaseInput::new("fever, cough", "WBC 14k");

        let extraction = orchestrator.extract(&session, "list actionable events").await;
        assert_eq!(extraction.disease, "pneumonia");
        assert_eq!(
            extraction.events,
            vec!["fever".to_string(), "elevated WBC".to_string()]
        );

        let fired = orchestrator
            .poll_auto_continue(&session, "article analysis prompt", 2)
            .await;
        assert!(fired);

        let state = session.read().await;
        assert_eq!(state.run.accumulated_articles.len(), 2);
        assert_eq!(
            state.run.current_progress_message,
            orchestrator::PROGRESS_COMPLETE
        );

        let messages = store.messages(&state.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].is_document());
        match &messages[2].body {
            MessageBody::Analysis {
                state: AnalysisState::Complete { markdown },
            } => assert_eq!(markdown, "## Case Analysis: pneumonia"),
            other => panic!("expected final analysis, got {other:?}"),
        }
    }
}
