//! Ports to the external services the demo talks to.
//!
//! The orchestrator only sees these traits; `nosql-demo-azure` implements
//! them over the Azure REST APIs and tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::item::Item;

/// Token scope for the Cosmos DB data plane.
pub const COSMOS_SCOPE: &str = "https://cosmos.azure.com/.default";
/// Token scope for Azure OpenAI.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

// ─── Credentials ──────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

// ─── Document database ────────────────────────────────────────────────────

/// A document plus the per-operation metadata the service returns with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResponse<T> {
    pub resource: T,
    pub request_charge: f64,
    pub activity_id: String,
}

#[async_trait]
pub trait Container: Send + Sync {
    /// Insert or replace `item`, keyed by id and partition key.
    async fn upsert_item(&self, item: &Item) -> Result<ItemResponse<Item>>;

    /// Read a single item by id and partition key.
    async fn read_item(&self, id: &str, partition_key: &str) -> Result<ItemResponse<Item>>;
}

// ─── Chat completions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    pub id: String,
    pub content: Vec<ContentPart>,
    pub usage: TokenUsage,
}

impl ChatCompletion {
    /// All content parts joined by newlines, trimmed.
    pub fn response_text(&self) -> String {
        self.content
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `prompt` as a single user turn.
    async fn complete_chat(&self, prompt: &str) -> Result<ChatCompletion>;
}

// ─── Factory ──────────────────────────────────────────────────────────────

/// Builds credentials and clients. Construction performs no network I/O;
/// the first request on a client is the first remote call.
pub trait ServiceFactory: Send + Sync {
    fn credential(&self) -> Arc<dyn TokenCredential>;

    fn container(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        database: &str,
        container: &str,
    ) -> Result<Box<dyn Container>>;

    fn chat_client(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        deployment: &str,
    ) -> Result<Box<dyn ChatClient>>;
}
