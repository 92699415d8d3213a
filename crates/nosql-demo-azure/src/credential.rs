//! Ambient credential resolution.
//!
//! [`DefaultAzureCredential`] tries, in order: service principal environment
//! variables, managed identity, and the Azure CLI login. The first source that
//! returns a token wins. Tokens are not cached.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use nosql_demo_core::{AccessToken, TokenCredential};

use crate::error::AzureError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// The resource a `.default` scope refers to, for endpoints that take a
/// `resource` rather than a `scope`.
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn first_scope<'a>(credential: &'static str, scopes: &[&'a str]) -> Result<&'a str, AzureError> {
    scopes
        .first()
        .copied()
        .ok_or(AzureError::CredentialUnavailable {
            credential,
            message: "no scope requested".into(),
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Token response parsing ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

/// OAuth2 token response, as returned by Entra ID, IMDS, and App Service.
/// Entra ID sends `expires_in` as a number; the managed identity endpoints
/// send `expires_on` as a string of epoch seconds.
#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<NumberOrString>,
    #[serde(default)]
    expires_on: Option<NumberOrString>,
}

impl OAuthTokenResponse {
    fn into_access_token(self, now: DateTime<Utc>) -> AccessToken {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(NumberOrString::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(NumberOrString::as_i64)
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|ttl| now.checked_add_signed(ttl))
            })
            .unwrap_or(now);
        AccessToken {
            token: self.access_token,
            expires_on,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

async fn read_token_response(
    credential: &'static str,
    response: reqwest::Response,
) -> Result<AccessToken, AzureError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<OAuthErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error_description.or(e.error))
            .unwrap_or(body);
        return Err(AzureError::Authentication {
            credential,
            status: status.as_u16(),
            message,
        });
    }
    let parsed: OAuthTokenResponse = serde_json::from_str(&body)?;
    Ok(parsed.into_access_token(Utc::now()))
}

// ─── EnvironmentCredential ────────────────────────────────────────────────

#[derive(Clone)]
struct ClientSecret {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

/// Service principal from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_CLIENT_SECRET` (authority from `AZURE_AUTHORITY_HOST`).
pub struct EnvironmentCredential {
    http: reqwest::Client,
    config: Option<ClientSecret>,
}

impl EnvironmentCredential {
    pub const NAME: &'static str = "EnvironmentCredential";

    pub fn from_lookup(http: reqwest::Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| non_empty(lookup(name));
        let config = match (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientSecret {
                authority_host: var("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };
        Self { http, config }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, scopes: &[&str]) -> nosql_demo_core::Result<AccessToken> {
        let config = self
            .config
            .as_ref()
            .ok_or(AzureError::CredentialUnavailable {
                credential: Self::NAME,
                message: "AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET are not all set"
                    .into(),
            })?;

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            config.authority_host.trim_end_matches('/'),
            config.tenant_id
        );
        let scope = scopes.join(" ");
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(AzureError::from)?;

        Ok(read_token_response(Self::NAME, response).await?)
    }
}

// ─── ManagedIdentityCredential ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentitySource {
    /// App Service / Functions / Container Apps (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`).
    AppService { endpoint: String, header: String },
    /// Azure VM instance metadata service.
    Imds { endpoint: String },
}

pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    source: ManagedIdentitySource,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub const NAME: &'static str = "ManagedIdentityCredential";

    pub fn from_lookup(http: reqwest::Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| non_empty(lookup(name));
        let source = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => ManagedIdentitySource::AppService { endpoint, header },
            _ => ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };
        Self {
            http,
            source,
            client_id: var("AZURE_CLIENT_ID"),
        }
    }

    pub fn source(&self) -> &ManagedIdentitySource {
        &self.source
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> nosql_demo_core::Result<AccessToken> {
        let resource = scope_to_resource(first_scope(Self::NAME, scopes)?);

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, header } => {
                let mut query = vec![
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", resource),
                ];
                if let Some(id) = &self.client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
            }
            ManagedIdentitySource::Imds { endpoint } => {
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(id) = &self.client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
                    .timeout(IMDS_PROBE_TIMEOUT)
            }
        };

        let response = request.send().await.map_err(|e| {
            // Not running on Azure: the endpoint does not answer.
            AzureError::CredentialUnavailable {
                credential: Self::NAME,
                message: format!("managed identity endpoint unreachable: {e}"),
            }
        })?;

        Ok(read_token_response(Self::NAME, response).await?)
    }
}

// ─── AzureCliCredential ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    /// Local time, e.g. `2024-05-01 13:45:12.000000`.
    #[serde(default)]
    expires_on: Option<String>,
    /// Epoch seconds; present in newer CLI versions.
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

/// Parse the JSON printed by `az account get-access-token --output json`.
pub fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken, AzureError> {
    let parsed: CliTokenOutput = serde_json::from_slice(stdout)?;
    let expires_on = parsed
        .expires_on_epoch
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            parsed.expires_on.as_deref().and_then(|s| {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .and_then(|naive| naive.and_local_timezone(Local).single())
                    .map(|local| local.with_timezone(&Utc))
            })
        })
        .unwrap_or_else(Utc::now);
    Ok(AccessToken {
        token: parsed.access_token,
        expires_on,
    })
}

/// Uses the account signed in with `az login`.
#[derive(Debug, Default)]
pub struct AzureCliCredential {
    program: Option<PathBuf>,
}

impl AzureCliCredential {
    pub const NAME: &'static str = "AzureCliCredential";

    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `az` executable instead of searching `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    pub fn args(resource: &str) -> Vec<String> {
        vec![
            "account".into(),
            "get-access-token".into(),
            "--output".into(),
            "json".into(),
            "--resource".into(),
            resource.into(),
        ]
    }

    fn resolve_program(&self) -> Result<PathBuf, AzureError> {
        match &self.program {
            Some(p) => Ok(p.clone()),
            None => which::which("az").map_err(|_| AzureError::CredentialUnavailable {
                credential: Self::NAME,
                message: "Azure CLI not found on PATH".into(),
            }),
        }
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[&str]) -> nosql_demo_core::Result<AccessToken> {
        let resource = scope_to_resource(first_scope(Self::NAME, scopes)?);
        let program = self.resolve_program()?;

        let output = tokio::process::Command::new(&program)
            .args(Self::args(resource))
            .output()
            .await
            .map_err(|e| AzureError::CredentialUnavailable {
                credential: Self::NAME,
                message: format!("failed to run {}: {e}", program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.contains("az login") {
                format!("not signed in: {stderr}")
            } else if stderr.is_empty() {
                format!("az exited with {}", output.status)
            } else {
                stderr
            };
            return Err(AzureError::CredentialUnavailable {
                credential: Self::NAME,
                message,
            }
            .into());
        }

        Ok(parse_cli_output(&output.stdout)?)
    }
}

// ─── Chain ────────────────────────────────────────────────────────────────

/// Tries each source in order; the first token wins. When every source
/// fails, the error lists each failure.
#[derive(Default)]
pub struct ChainedTokenCredential {
    sources: Vec<(&'static str, Box<dyn TokenCredential>)>,
}

impl ChainedTokenCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        name: &'static str,
        source: impl TokenCredential + 'static,
    ) -> Self {
        let source: Box<dyn TokenCredential> = Box::new(source);
        self.sources.push((name, source));
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(&self, scopes: &[&str]) -> nosql_demo_core::Result<AccessToken> {
        let mut failures = Vec::new();
        for (name, source) in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => {
                    info!(credential = *name, "acquired access token");
                    return Ok(token);
                }
                Err(e) => {
                    debug!(credential = *name, error = %e, "credential failed; trying next");
                    failures.push(format!("- {name}: {e}"));
                }
            }
        }
        Err(AzureError::ChainExhausted(failures.join("\n")).into())
    }
}

/// The environment → managed identity → Azure CLI chain.
pub struct DefaultAzureCredential;

impl DefaultAzureCredential {
    pub fn from_env(http: reqwest::Client) -> ChainedTokenCredential {
        Self::from_lookup(http, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        http: reqwest::Client,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ChainedTokenCredential {
        ChainedTokenCredential::new()
            .with_source(
                EnvironmentCredential::NAME,
                EnvironmentCredential::from_lookup(http.clone(), &lookup),
            )
            .with_source(
                ManagedIdentityCredential::NAME,
                ManagedIdentityCredential::from_lookup(http, &lookup),
            )
            .with_source(AzureCliCredential::NAME, AzureCliCredential::new())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
