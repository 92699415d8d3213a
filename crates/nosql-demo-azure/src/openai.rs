//! Azure OpenAI chat completions over the REST API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use nosql_demo_core::services::COGNITIVE_SERVICES_SCOPE;
use nosql_demo_core::{ChatClient, ChatCompletion, ContentPart, TokenCredential, TokenUsage};

use crate::error::{join_segments, parse_endpoint, AzureError};

pub const OPENAI_API_VERSION: &str = "2024-10-21";

// ─── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    id: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

/// `content` is either a plain string or an array of typed parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

impl From<CompletionResponse> for ChatCompletion {
    fn from(response: CompletionResponse) -> Self {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| match content {
                MessageContent::Text(text) => vec![ContentPart { text }],
                MessageContent::Parts(parts) => parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .map(|text| ContentPart { text })
                    .collect(),
            })
            .unwrap_or_default();
        let usage = response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        ChatCompletion {
            id: response.id,
            content,
            usage,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────

/// A chat client bound to one model deployment.
pub struct AzureOpenAiChat {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    url: url::Url,
    deployment: String,
}

impl AzureOpenAiChat {
    /// Bind to a deployment. Performs no I/O.
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        deployment: &str,
    ) -> Result<Self, AzureError> {
        let base = parse_endpoint(endpoint)?;
        let mut url = join_segments(
            &base,
            &["openai", "deployments", deployment, "chat", "completions"],
        )?;
        url.query_pairs_mut()
            .append_pair("api-version", OPENAI_API_VERSION);
        Ok(Self {
            http,
            credential,
            url,
            deployment: deployment.to_string(),
        })
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ChatCompletion, AzureError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => match envelope.error.code {
                    Some(code) => format!("{code}: {}", envelope.error.message),
                    None => envelope.error.message,
                },
                Err(_) => body,
            };
            return Err(AzureError::OpenAi {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)?;
        debug!(deployment = %self.deployment, id = %parsed.id, "chat completion response");
        Ok(parsed.into())
    }
}

#[async_trait]
impl ChatClient for AzureOpenAiChat {
    async fn complete_chat(&self, prompt: &str) -> nosql_demo_core::Result<ChatCompletion> {
        let token = self
            .credential
            .get_token(&[COGNITIVE_SERVICES_SCOPE])
            .await?;
        let body = serde_json::json!({
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });
        let request = self
            .http
            .post(self.url.clone())
            .bearer_auth(&token.token)
            .json(&body);
        Ok(self.send(request).await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
