//! Chat completion round trip

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::{Error, Result};

/// Produces a reply for one user turn
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `text` as a single user turn and return the reply
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-2xx status, or a missing reply
    async fn complete(&self, text: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 1],
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_msg: Option<String>,
}

/// Remote chat/completion service
pub struct HttpChat {
    client: reqwest::Client,
    url: String,
    token: String,
    system_prompt: String,
}

impl HttpChat {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if the access token is missing or the HTTP client cannot be built
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config("chat access token required (SPARKBOT_CHAT_TOKEN)".to_string())
            })?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            token,
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChat {
    async fn complete(&self, text: &str) -> Result<String> {
        let request = build_request(text, &self.system_prompt);
        tracing::debug!(chars = text.len(), "sending chat request");

        let url = format!(
            "{}?access_token={}",
            self.url,
            urlencoding::encode(&self.token)
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Chat(format!("chat API error {status}: {body}")));
        }

        let body = response.text().await?;
        let reply = parse_chat_response(&body)?;

        tracing::info!(reply = %reply, "chat reply received");
        Ok(reply)
    }
}

fn build_request<'a>(text: &'a str, system: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        messages: [ChatMessage {
            role: "user",
            content: text,
        }],
        system,
        stream: false,
    }
}

/// Extract the reply text from a chat response body
///
/// # Errors
///
/// Returns error if the body is empty, not JSON, carries an error code, or has
/// no `result` string
pub fn parse_chat_response(body: &str) -> Result<String> {
    if body.trim().is_empty() {
        return Err(Error::Chat("empty response body".to_string()));
    }

    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Chat(format!("malformed response: {e}")))?;

    if let Some(code) = parsed.error_code {
        return Err(Error::Chat(format!(
            "service error {code}: {}",
            parsed.error_msg.unwrap_or_default()
        )));
    }

    parsed
        .result
        .filter(|r| !r.is_empty())
        .ok_or_else(|| Error::Chat("response has no result".to_string()))
}
