use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, error, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;

use super::{ ChatClient, Completion, LlmConfig, UpstreamError };
use crate::models::chat::Message;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        // No total timeout on the client itself; it would cut long streams.
        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model,
            base_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.api_key.trim().is_empty() {
            return Err("Completion API key is required".into());
        }
        Self::new(
            &config.api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.connect_timeout,
            config.request_timeout,
        )
    }
}

fn extract_reply(body: &[u8]) -> Result<String, UpstreamError> {
    let resp = serde_json
        ::from_slice::<OpenAIResponse>(body)
        .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?;

    resp.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| UpstreamError::MalformedResponse("no message content in first choice".into()))
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        messages: &[Message],
        stream: bool
    ) -> Result<Completion, UpstreamError> {
        let req = OpenAIChatRequest {
            model: &self.model,
            messages,
            stream,
        };

        let mut builder = self.http.post(&self.base_url).json(&req);
        builder = if stream {
            builder.header(ACCEPT, "text/event-stream")
        } else {
            builder.timeout(self.request_timeout)
        };

        debug!("Sending {} messages to {} (stream={})", messages.len(), self.base_url, stream);
        let resp = builder.send().await.map_err(|e| {
            error!("Completion request failed: {}", e);
            UpstreamError::Unavailable(e.to_string())
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Completion endpoint returned {}: {}", status, body);
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }

        if stream {
            let bytes = resp
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>));
            return Ok(Completion::Stream(Box::pin(bytes)));
        }

        let body = resp.bytes().await.map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        extract_reply(&body).map(Completion::Reply)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}
