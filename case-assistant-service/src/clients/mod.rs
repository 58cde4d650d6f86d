pub mod extraction;
pub mod llm;
pub mod retrieval;
pub mod synthesis;

pub use extraction::LlmExtractionService;
pub use retrieval::HttpRetrievalService;
pub use synthesis::LlmSynthesisService;
