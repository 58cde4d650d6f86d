pub mod clients;
pub mod models;
pub mod prompts;
pub mod service;

pub use models::*;
pub use service::{AppState, create_app};
