use crate::models::chat::{ ChatSession, Message };
use serde::{ Serialize, Deserialize };

#[derive(Deserialize, Debug)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CompletionReply {
    pub reply: String,
}

/// Body of `POST /sessions`. Server-owned fields sent by the caller
/// (`ownerId`, `updatedAt`) are ignored.
#[derive(Deserialize, Debug, Default)]
pub struct SaveSessionRequest {
    pub id: Option<String>,
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionList {
    pub sessions: Vec<ChatSession>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
}

/// Normalized event written to the caller while relaying a stream.
/// `Done` and `Error` are terminal; nothing follows either of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Done,
    Error(String),
}

/// `data` payload of a content event.
#[derive(Serialize, Debug)]
pub struct ContentFrame {
    pub content: String,
}

/// `data` payload of the terminal error event.
#[derive(Serialize, Debug)]
pub struct ErrorFrame {
    pub error: String,
}
