use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use case_flow::{
    AnalysisState, CaseInput, CaseOrchestrator, InMemoryConversationStore, InMemorySessionStorage,
    MessageBody, Session, SessionState, SessionStorage,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    clients::{HttpRetrievalService, LlmExtractionService, LlmSynthesisService},
    models::{AnalyzeCaseRequest, LoadConversationRequest, SessionResponse},
    prompts,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStorage>,
    pub orchestrator: CaseOrchestrator,
}

pub fn create_app() -> Router {
    let app_state = create_app_state();
    build_router(app_state)
}

fn create_app_state() -> AppState {
    let retrieval_endpoint = std::env::var("RETRIEVAL_SERVICE_URL")
        .unwrap_or_else(|_| "http://localhost:8081/retrieve".to_string());

    let orchestrator = CaseOrchestrator::new(
        Arc::new(LlmExtractionService::new()),
        Arc::new(HttpRetrievalService::new(retrieval_endpoint)),
        Arc::new(LlmSynthesisService::new()),
        Arc::new(InMemoryConversationStore::new()),
    );

    AppState {
        sessions: Arc::new(InMemorySessionStorage::new()),
        orchestrator,
    }
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/cases/analyze", post(start_case))
        .route("/cases/{session_id}", get(get_session_status))
        .route("/cases/{session_id}/clear", post(clear_case))
        .route("/cases/{session_id}/load", post(load_conversation))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Case Assistant Service",
        "version": "1.0.0",
        "description": "AI-assisted clinical case analysis with literature retrieval",
        "endpoints": {
            "POST /cases/analyze": "Start a new case analysis",
            "GET /cases/{session_id}": "Get session status, progress and messages",
            "POST /cases/{session_id}/clear": "Clear the session and start a new case",
            "POST /cases/{session_id}/load": "Switch the session to an existing conversation",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn start_case(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeCaseRequest>,
) -> ApiResult<Value> {
    validate_case_notes(&request.case_notes)?;

    let session = Session::new();
    let session_id = session.id.clone();
    {
        let mut session_state = session.write().await;
        session_state.case_input = CaseInput::new(request.case_notes, request.lab_results);
    }

    save_session(&state, session.clone()).await?;
    info!("Session {} created successfully", session_id);

    let extraction = state
        .orchestrator
        .extract(&session, prompts::EVENT_EXTRACTION_PROMPT)
        .await;

    // Auto-continuation runs in the background so the response returns as
    // soon as extraction is done.
    spawn_auto_continue(&state, session, request.num_articles);

    Ok(Json(json!({
        "session_id": session_id,
        "status": "started",
        "disease": extraction.disease,
        "events": extraction.events,
    })))
}

fn validate_case_notes(case_notes: &str) -> Result<(), ApiError> {
    if case_notes.trim().is_empty() {
        return Err(bad_request_error("Case notes are required"));
    }
    Ok(())
}

async fn save_session(state: &AppState, session: Session) -> Result<(), ApiError> {
    state.sessions.save(session).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        internal_error("Failed to create analysis session", &e.to_string())
    })
}

fn spawn_auto_continue(state: &AppState, session: Session, num_articles: u32) {
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let fired = orchestrator
            .poll_auto_continue(&session, prompts::ARTICLE_ANALYSIS_PROMPT, num_articles)
            .await;
        if !fired {
            info!(session = %session.id, "auto-continuation did not fire");
        }
    });
}

async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let session_state = session.read().await.clone();

    let messages = state
        .orchestrator
        .store()
        .messages(&session_state.conversation_id)
        .await
        .map_err(|e| {
            error!("Failed to load conversation {}: {}", session_state.conversation_id, e);
            internal_error("Failed to load conversation", &e.to_string())
        })?;

    let has_final_analysis = messages.iter().any(|m| {
        matches!(
            m.body,
            MessageBody::Analysis {
                state: AnalysisState::Complete { .. }
            }
        )
    });

    let response = SessionResponse {
        session_id: session.id.clone(),
        conversation_id: session_state.conversation_id.clone(),
        status: derive_status(&session_state, has_final_analysis),
        disease: session_state.extraction.disease.clone(),
        events: session_state.extraction.events.clone(),
        progress: session_state.run.current_progress_message.clone(),
        articles_processed: session_state.run.accumulated_articles.len(),
        total_articles_expected: session_state.run.total_articles_expected,
        messages,
    };

    Ok(Json(response))
}

fn derive_status(session_state: &SessionState, has_final_analysis: bool) -> String {
    if session_state.is_extracting {
        "extracting"
    } else if session_state.is_retrieving || session_state.is_processing_articles {
        "retrieving"
    } else if has_final_analysis {
        "completed"
    } else if session_state.extraction.is_empty() {
        "new"
    } else {
        "active"
    }
    .to_string()
}

async fn clear_case(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;
    state.orchestrator.clear_session(&session).await;

    Ok(Json(json!({
        "session_id": session_id,
        "status": "cleared",
        "message": "Session reset; a new case can be submitted"
    })))
}

async fn load_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<LoadConversationRequest>,
) -> ApiResult<Value> {
    let session = load_session(&state, &session_id).await?;

    match state
        .orchestrator
        .load_conversation(&session, &request.conversation_id)
        .await
    {
        Ok(()) => Ok(Json(json!({
            "session_id": session_id,
            "conversation_id": request.conversation_id,
            "status": "loaded"
        }))),
        Err(e) => {
            error!(
                "Failed to load conversation {} into session {}: {}",
                request.conversation_id, session_id, e
            );
            Err(internal_error("Failed to load conversation", &e.to_string()))
        }
    }
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    match state.sessions.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(not_found_error("Session not found", session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(internal_error("Failed to load session", &e.to_string()))
        }
    }
}
