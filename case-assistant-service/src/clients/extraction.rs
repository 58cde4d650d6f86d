use async_trait::async_trait;
use case_flow::{ExtractionService, FlowError, Result};
use rig::completion::Prompt;
use tracing::info;

use super::llm::get_llm_agent;

/// LLM-backed disease/event extraction over the combined case material.
pub struct LlmExtractionService;

impl LlmExtractionService {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LlmExtractionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn extract_disease(&self, notes: &str) -> Result<String> {
        let prompt = format!(
            "Read the following case material and name the patient's primary \
             disease. Return only the disease name, nothing else.\n\n{notes}"
        );

        let agent = get_llm_agent("You are a clinical assistant extracting structured facts from case notes.")
            .map_err(service_error)?;
        let response = agent.prompt(&prompt).await.map_err(service_error)?;
        Ok(response.trim().to_string())
    }

    async fn extract_events(&self, notes: &str, prompt_template: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "{prompt_template}\n\nCase material:\n{notes}\n\nActionable events (JSON array only):"
        );

        let agent = get_llm_agent("You are a clinical assistant extracting structured facts from case notes.")
            .map_err(service_error)?;
        let response = agent.prompt(&prompt).await.map_err(service_error)?;

        info!("LLM response for event extraction: {}", response);
        parse_string_array(&response)
    }
}

fn service_error(err: impl std::fmt::Display) -> FlowError {
    FlowError::Service(err.to_string())
}

/// Extract a JSON string array from an LLM response, tolerating prose around
/// the array.
fn parse_string_array(response: &str) -> Result<Vec<String>> {
    let parsed = if let Some(start) = response.find('[') {
        match response.rfind(']') {
            Some(end) if end > start => {
                serde_json::from_str::<Vec<String>>(&response[start..=end])
            }
            _ => {
                return Err(FlowError::Service(
                    "no closing bracket in extraction response".to_string(),
                ));
            }
        }
    } else {
        // Fallback: the whole response may be the array.
        serde_json::from_str::<Vec<String>>(response)
    };

    parsed.map_err(|e| FlowError::Service(format!("failed to parse extraction response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_json_array() {
        let events = parse_string_array(r#"["fever", "elevated WBC"]"#).unwrap();
        assert_eq!(events, vec!["fever", "elevated WBC"]);
    }

    #[test]
    fn parses_an_array_wrapped_in_prose() {
        let response = "Here are the events:\n[\"KMT2A rearrangement\", \"refractory disease\"]\nLet me know if you need more.";
        let events = parse_string_array(response).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], "KMT2A rearrangement");
    }

    #[test]
    fn rejects_an_unterminated_array() {
        assert!(parse_string_array("[\"fever\"").is_err());
    }

    #[test]
    fn rejects_non_json_responses() {
        assert!(parse_string_array("no events found").is_err());
    }
}
