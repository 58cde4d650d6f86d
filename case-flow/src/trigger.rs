use crate::session::SessionState;

/// Action requested by the auto-continuation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    StartRetrieval,
}

/// The auto-continuation rule, as a pure function over session state.
///
/// Fires when an extraction has just completed and nothing blocks a
/// retrieval run: no run in progress, chat history not loading, and the
/// conversation does not already hold a document message. The caller must
/// clear `just_extracted` before acting on the decision, which is what makes
/// the rule edge-triggered: re-evaluating on every state change cannot
/// double-fire.
pub fn auto_continue(state: &SessionState, has_document_message: bool) -> Option<TriggerDecision> {
    let blocked = state.is_retrieving
        || state.is_processing_articles
        || state.is_loading_chat_history
        || has_document_message;

    if state.just_extracted && !state.extraction.is_empty() && !blocked {
        Some(TriggerDecision::StartRetrieval)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted_state() -> SessionState {
        let mut state = SessionState::new();
        state.just_extracted = true;
        state.extraction.disease = "pneumonia".to_string();
        state.extraction.events = vec!["fever".to_string(), "elevated WBC".to_string()];
        state
    }

    #[test]
    fn fires_when_extraction_just_completed() {
        let state = extracted_state();
        assert_eq!(
            auto_continue(&state, false),
            Some(TriggerDecision::StartRetrieval)
        );
    }

    #[test]
    fn does_not_fire_without_the_one_shot_flag() {
        let mut state = extracted_state();
        state.just_extracted = false;
        assert_eq!(auto_continue(&state, false), None);
    }

    #[test]
    fn does_not_fire_on_empty_extraction() {
        let mut state = extracted_state();
        state.extraction.disease.clear();
        assert_eq!(auto_continue(&state, false), None);

        let mut state = extracted_state();
        state.extraction.events.clear();
        assert_eq!(auto_continue(&state, false), None);
    }

    #[test]
    fn does_not_fire_while_a_run_is_in_progress() {
        let mut state = extracted_state();
        state.is_retrieving = true;
        assert_eq!(auto_continue(&state, false), None);

        let mut state = extracted_state();
        state.is_processing_articles = true;
        assert_eq!(auto_continue(&state, false), None);
    }

    #[test]
    fn does_not_fire_while_chat_history_is_loading() {
        let mut state = extracted_state();
        state.is_loading_chat_history = true;
        assert_eq!(auto_continue(&state, false), None);
    }

    #[test]
    fn does_not_fire_when_a_document_message_exists() {
        let state = extracted_state();
        assert_eq!(auto_continue(&state, true), None);
    }
}
