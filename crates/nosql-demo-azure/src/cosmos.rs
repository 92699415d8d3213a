//! Cosmos DB for NoSQL document operations over the REST API, authorized
//! with a Microsoft Entra ID token.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use nosql_demo_core::services::COSMOS_SCOPE;
use nosql_demo_core::{Container, Item, ItemResponse, TokenCredential};

use crate::error::{join_segments, parse_endpoint, AzureError};

pub const COSMOS_API_VERSION: &str = "2018-12-31";

pub const HEADER_REQUEST_CHARGE: &str = "x-ms-request-charge";
pub const HEADER_ACTIVITY_ID: &str = "x-ms-activity-id";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_DATE: &str = "x-ms-date";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_IS_UPSERT: &str = "x-ms-documentdb-is-upsert";

/// `authorization` header value for an Entra ID token, URL-encoded as the
/// service expects.
pub fn aad_authorization(token: &str) -> String {
    let raw = format!("type=aad&ver=1.0&sig={token}");
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// RFC 1123 date for the `x-ms-date` header.
pub fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Partition key header value: a JSON array with the single key value.
pub fn partition_key_header(partition_key: &str) -> Result<String, AzureError> {
    Ok(serde_json::to_string(&[partition_key])?)
}

#[derive(Debug, Default, Deserialize)]
struct CosmosErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// A client bound to one container (`dbs/{database}/colls/{container}`).
pub struct CosmosContainer {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    docs_url: url::Url,
    database: String,
    container: String,
}

impl CosmosContainer {
    /// Bind to a container. Performs no I/O.
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        database: &str,
        container: &str,
    ) -> Result<Self, AzureError> {
        let base = parse_endpoint(endpoint)?;
        let docs_url = join_segments(&base, &["dbs", database, "colls", container, "docs"])?;
        Ok(Self {
            http,
            credential,
            docs_url,
            database: database.to_string(),
            container: container.to_string(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn docs_url(&self) -> &url::Url {
        &self.docs_url
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: url::Url,
        partition_key: &str,
    ) -> nosql_demo_core::Result<reqwest::RequestBuilder> {
        let token = self.credential.get_token(&[COSMOS_SCOPE]).await?;
        Ok(self
            .http
            .request(method, url)
            .header("authorization", aad_authorization(&token.token))
            .header(HEADER_VERSION, COSMOS_API_VERSION)
            .header(HEADER_DATE, rfc1123_now())
            .header(HEADER_PARTITION_KEY, partition_key_header(partition_key)?)
            .header("accept", "application/json"))
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<ItemResponse<Item>, AzureError> {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let activity_id = header_str(&headers, HEADER_ACTIVITY_ID)
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed: CosmosErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = if parsed.message.is_empty() {
                body
            } else {
                parsed.message
            };
            return Err(AzureError::Cosmos {
                status: status.as_u16(),
                code: parsed.code,
                message,
                activity_id,
            });
        }

        let request_charge = header_str(&headers, HEADER_REQUEST_CHARGE)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        let resource: Item = serde_json::from_str(&body)?;

        debug!(status = status.as_u16(), %activity_id, request_charge, "cosmos response");

        Ok(ItemResponse {
            resource,
            request_charge,
            activity_id,
        })
    }
}

#[async_trait]
impl Container for CosmosContainer {
    async fn upsert_item(&self, item: &Item) -> nosql_demo_core::Result<ItemResponse<Item>> {
        let request = self
            .request(
                reqwest::Method::POST,
                self.docs_url.clone(),
                item.partition_key(),
            )
            .await?
            .header(HEADER_IS_UPSERT, "True")
            .json(item);
        Ok(Self::send(request).await?)
    }

    async fn read_item(
        &self,
        id: &str,
        partition_key: &str,
    ) -> nosql_demo_core::Result<ItemResponse<Item>> {
        let url = join_segments(&self.docs_url, &[id])?;
        let request = self
            .request(reqwest::Method::GET, url, partition_key)
            .await?;
        Ok(Self::send(request).await?)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
