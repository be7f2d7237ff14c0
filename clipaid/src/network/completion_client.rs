use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::network::sanitize::clean;
use crate::network::{RewriteRequest, Rewriter};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const TOP_P: f64 = 0.95;
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client used for every rewrite.
pub struct CompletionClient {
    http: reqwest::Client,
    timeout: Duration,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new() -> Result<Self, ErrorKind> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ErrorKind> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ErrorKind::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            timeout,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// Sends one rewrite. Cancellation wins over any in-progress I/O and the
    /// timeout applies regardless of cancellation.
    pub async fn rewrite(
        &self,
        request: &RewriteRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ErrorKind> {
        if cancel.is_cancelled() {
            return Err(ErrorKind::Cancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("rewrite cancelled before completion");
                Err(ErrorKind::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, self.send(request)) => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(ErrorKind::Transport(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))),
            },
        }
    }

    async fn send(&self, request: &RewriteRequest) -> Result<String, ErrorKind> {
        let user_message = request.user_message();
        let body = ChatCompletionRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_message,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: TOP_P,
        };

        let mut builder = self.http.post(&request.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, "completion service returned an error status");
            return Err(ErrorKind::Transport(format!(
                "completion service returned {status}: {}",
                truncate_chars(error_text.trim(), MAX_ERROR_BODY_CHARS)
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|err| {
            ErrorKind::Transport(format!("failed to parse completion response: {err}"))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ErrorKind::Transport("completion response had no choices".to_string()))?;

        Ok(clean(&content))
    }
}

#[async_trait]
impl Rewriter for CompletionClient {
    async fn rewrite(
        &self,
        request: RewriteRequest,
        cancel: CancellationToken,
    ) -> Result<String, ErrorKind> {
        CompletionClient::rewrite(self, &request, &cancel).await
    }
}

fn map_send_error(err: reqwest::Error) -> ErrorKind {
    if err.is_connect() {
        ErrorKind::Unreachable
    } else if err.is_timeout() {
        ErrorKind::Transport("request timed out".to_string())
    } else {
        ErrorKind::Transport(err.to_string())
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}…", &text[..byte_index]),
        None => text.to_string(),
    }
}
