pub mod openai;
pub mod stream;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use self::openai::OpenAIChatClient;
use crate::cli::Args;
use crate::models::chat::Message;

/// Raw body of a streaming completion, exactly as the transport delivers it.
pub type ByteStream = Pin<
    Box<dyn Stream<Item = Result<Bytes, Box<dyn StdError + Send + Sync>>> + Send>
>;

pub enum Completion {
    Reply(String),
    Stream(ByteStream),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("upstream unreachable: {0}")]
    Unavailable(String),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_key: args.chat_api_key.clone(),
            base_url: args.chat_base_url.clone(),
            model: args.chat_model.clone(),
            connect_timeout: Duration::from_secs(args.upstream_connect_timeout_secs),
            request_timeout: Duration::from_secs(args.upstream_request_timeout_secs),
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends `messages` verbatim. Never retried: completions are not idempotent.
    async fn complete(
        &self,
        messages: &[Message],
        stream: bool
    ) -> Result<Completion, UpstreamError>;

    fn get_model(&self) -> String;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
