use crate::auth::{ AuthGate, Identity };
use crate::history::SessionStore;
use crate::llm::stream::{ reassemble, DONE_SENTINEL };
use crate::llm::{ ChatClient, Completion };
use crate::models::relay::{
    CompletionReply,
    CompletionRequest,
    ContentFrame,
    DeleteResponse,
    ErrorFrame,
    HealthResponse,
    RelayEvent,
    SaveSessionRequest,
    SessionList,
};
use crate::models::chat::ChatSession;
use crate::server::error::ApiError;

use std::sync::Arc;
use std::time::Duration;
use axum::{
    routing::{ get, post },
    Router,
    extract::{ FromRequestParts, Path, State },
    http::{ header::{ ACCEPT, AUTHORIZATION, CONTENT_TYPE }, request::Parts, HeaderName },
    response::{ IntoResponse, Response, sse::{ Event, KeepAlive, Sse } },
    Json,
};
use futures::{ Stream, StreamExt };
use tower_http::cors::{ Any, CorsLayer };
use log::info;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthGate,
    pub sessions: SessionStore,
    pub chat: Arc<dyn ChatClient>,
    pub stream_idle_timeout: Option<Duration>,
}

/// Extractor that runs the auth gate before any other extractor or store access.
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = state.auth.authenticate(&parts.headers).await?;
        Ok(Authenticated(identity))
    }
}

pub fn build_router(state: AppState) -> Router {
    // Also answers OPTIONS preflights without touching auth. A `*` header
    // allow-list never covers `Authorization`.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ]);

    Router::new()
        .route("/health", get(health))
        .route("/chat/completion", post(chat_completion))
        .route("/sessions", get(list_sessions).post(save_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

async fn chat_completion(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Json(req): Json<CompletionRequest>,
) -> Result<Response, ApiError> {
    info!(
        "Completion for {}: {} messages, stream={}",
        identity.id,
        req.messages.len(),
        req.stream
    );

    match state.chat.complete(&req.messages, req.stream).await? {
        Completion::Reply(reply) => Ok(Json(CompletionReply { reply }).into_response()),
        Completion::Stream(upstream) => {
            let events = reassemble(upstream, state.stream_idle_timeout);
            Ok(relay_stream(events).into_response())
        }
    }
}

fn to_sse_event(event: RelayEvent) -> Result<Event, axum::Error> {
    match event {
        RelayEvent::Content(content) => Event::default().json_data(ContentFrame { content }),
        RelayEvent::Done => Ok(Event::default().event("done").data(DONE_SENTINEL)),
        RelayEvent::Error(error) => Event::default().event("error").json_data(ErrorFrame { error }),
    }
}

/// Each event is written as soon as the reassembler yields it.
fn relay_stream<S>(events: S) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
    where S: Stream<Item = RelayEvent> + Send + 'static
{
    Sse::new(events.map(to_sse_event)).keep_alive(KeepAlive::default())
}

// GET /sessions
async fn list_sessions(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> Result<Json<SessionList>, ApiError> {
    let sessions = state.sessions.list(&identity.id).await?;
    Ok(Json(SessionList { sessions }))
}

// GET /sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, ApiError> {
    let session = state.sessions.get(&identity.id, &id).await?;
    session.map(Json).ok_or(ApiError::SessionNotFound(id))
}

// POST /sessions
async fn save_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Json(req): Json<SaveSessionRequest>,
) -> Result<Json<ChatSession>, ApiError> {
    let session = state.sessions.save(&identity.id, req).await?;
    info!("Saved session {} for {} ({} messages)", session.id, identity.id, session.messages.len());
    Ok(Json(session))
}

// DELETE /sessions/{id}
async fn delete_session(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.sessions.delete(&identity.id, &id).await?;
    Ok(Json(DeleteResponse { success: true }))
}
