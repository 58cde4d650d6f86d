//! Prompt templates threaded through the workflow. The event-extraction
//! template is passed to the extraction service; the article-analysis
//! template is forwarded opaquely to the retrieval service.

pub const EVENT_EXTRACTION_PROMPT: &str = "\
You are reviewing a clinical case. Identify the actionable events in the \
case material: genetic alterations, immune markers, resistant or refractory \
disease states, and other findings a tumor board could act on. Prefer the \
nomenclature used in the source text. Return only a JSON array of short \
event strings, nothing else.";

pub const ARTICLE_ANALYSIS_PROMPT: &str = "\
Score each retrieved article for relevance to the patient's disease and \
actionable events. Weigh journal quality, recency, paper type (clinical \
trials over case reports over reviews), whether the article's actionable \
events match the query, and reported drug results. Return a point total \
with a per-criterion breakdown.";
