use async_trait::async_trait;
use case_flow::{AnalysisText, ArticleRecord, FlowError, Result, SynthesisService};
use rig::completion::Prompt;
use tracing::info;

use super::llm::get_llm_agent;

/// LLM-backed final synthesis: a tumor-board style markdown report over the
/// case material and the accumulated article records.
pub struct LlmSynthesisService;

impl LlmSynthesisService {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LlmSynthesisService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisService for LlmSynthesisService {
    async fn synthesize(
        &self,
        combined_notes: &str,
        disease: &str,
        events: &[String],
        articles: &[ArticleRecord],
    ) -> Result<AnalysisText> {
        info!(articles = articles.len(), "generating final analysis");

        let prompt = build_final_analysis_prompt(combined_notes, disease, events, articles);
        let agent = get_llm_agent(
            "You are a pediatric hematologist sitting on a tumor board for patients with complex diseases.",
        )
        .map_err(|e| FlowError::Service(e.to_string()))?;
        let response = agent
            .prompt(&prompt)
            .await
            .map_err(|e| FlowError::Service(e.to_string()))?;

        Ok(AnalysisText {
            markdown: response.trim().to_string(),
        })
    }
}

fn build_final_analysis_prompt(
    combined_notes: &str,
    disease: &str,
    events: &[String],
    articles: &[ArticleRecord],
) -> String {
    let articles_table = articles
        .iter()
        .map(format_article)
        .collect::<Vec<_>>()
        .join("\n---\n");

    format!(
        "Your goal is to find the best treatment for this patient, considering \
         their actionable events (genetic, immune-related, or other).

CASE INFORMATION:
{combined_notes}

Disease: {disease}
Actionable Events: {}

ANALYZED ARTICLES:
{articles_table}

Based on the clinical input, actionable events, and the analyzed articles \
above, provide a comprehensive analysis in markdown format with the \
following sections:

## Case Analysis: {disease}

### 1. Case Summary
A brief paragraph summarizing the case.

### 2. Actionable Events Analysis
A markdown table with one row per event: Event | Type | Explanation | \
Targetable | Prognostic Value, followed by a concise interpretation of the \
events' clinical implications.

### 3. Treatment Options
A markdown table with one row per recommendation: Event | Treatment | \
Evidence (PMID) | Evidence Summary | Warnings. Every recommendation MUST \
cite at least one PMID from the provided articles; never use N/A in the \
evidence column. Format citations as \
[PMID: 12345678](https://pubmed.ncbi.nlm.nih.gov/12345678/).

Return the analysis in markdown only, no JSON.",
        events.join(", ")
    )
}

fn format_article(article: &ArticleRecord) -> String {
    let events = article
        .actionable_events
        .iter()
        .map(|e| {
            format!(
                "{} ({})",
                e.event,
                if e.matches_query { "matches" } else { "no match" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "PMID: {}\nTitle: {}\nJournal: {} (SJR: {})\nYear: {}\nType: {}\nCancer Type: {}\nEvents: {}\nDrugs Tested: {}\nDrug Results: {}\nPoints: {}\nFull Text:\n{}",
        article.pmid,
        article.title,
        article.journal_title.as_deref().unwrap_or("N/A"),
        article
            .journal_impact_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "0".to_string()),
        article
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        article.paper_type.as_deref().unwrap_or("N/A"),
        article.cancer_type.as_deref().unwrap_or("N/A"),
        events,
        article.drugs_tested.join(", "),
        article.drug_results.join(", "),
        article.points,
        article.full_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use case_flow::ActionableEvent;

    fn article() -> ArticleRecord {
        ArticleRecord {
            pmid: "38012345".to_string(),
            title: "CAR-T in refractory ALL".to_string(),
            points: 42.5,
            full_text: "full text here".to_string(),
            journal_title: Some("Blood".to_string()),
            journal_impact_score: Some(5.1),
            year: Some(2024),
            cancer_type: Some("ALL".to_string()),
            paper_type: Some("clinical trial".to_string()),
            actionable_events: vec![ActionableEvent {
                event: "KMT2A".to_string(),
                matches_query: true,
            }],
            drugs_tested: vec!["blinatumomab".to_string()],
            drug_results: vec!["CR".to_string()],
            point_breakdown: None,
        }
    }

    #[test]
    fn prompt_carries_case_and_article_details() {
        let prompt = build_final_analysis_prompt(
            "Case Notes:\n\nfever",
            "pneumonia",
            &["fever".to_string(), "elevated WBC".to_string()],
            &[article()],
        );

        assert!(prompt.contains("Disease: pneumonia"));
        assert!(prompt.contains("fever, elevated WBC"));
        assert!(prompt.contains("PMID: 38012345"));
        assert!(prompt.contains("KMT2A (matches)"));
        assert!(prompt.contains("## Case Analysis: pneumonia"));
    }
}
