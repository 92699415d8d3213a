use nosql_demo_core::DemoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AzureError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("{credential} is unavailable: {message}")]
    CredentialUnavailable {
        credential: &'static str,
        message: String,
    },

    #[error("{credential} authentication failed ({status}): {message}")]
    Authentication {
        credential: &'static str,
        status: u16,
        message: String,
    },

    #[error("no credential in the chain produced a token:\n{0}")]
    ChainExhausted(String),

    #[error("Cosmos DB request failed ({status}) {code}: {message}")]
    Cosmos {
        status: u16,
        code: String,
        message: String,
        activity_id: String,
    },

    #[error("Azure OpenAI request failed ({status}): {message}")]
    OpenAi { status: u16, message: String },
}

impl From<AzureError> for DemoError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::InvalidEndpoint { endpoint, reason } => {
                DemoError::InvalidEndpoint { endpoint, reason }
            }
            AzureError::CredentialUnavailable { .. }
            | AzureError::Authentication { .. }
            | AzureError::ChainExhausted(_) => DemoError::Credential(err.to_string()),
            AzureError::Cosmos {
                status,
                code,
                message,
                activity_id,
            } => DemoError::Database {
                status,
                message: if code.is_empty() {
                    message
                } else {
                    format!("{code}: {message}")
                },
                activity_id,
            },
            AzureError::OpenAi { status, message } => DemoError::Chat { status, message },
            AzureError::Http(_) | AzureError::Io(_) | AzureError::Json(_) => {
                DemoError::Transport(err.to_string())
            }
        }
    }
}

/// Parse an endpoint URL, accepting only `http` and `https`.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<url::Url, AzureError> {
    let url = url::Url::parse(endpoint).map_err(|e| AzureError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AzureError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Append path segments to `base`, keeping any path the endpoint already has.
pub(crate) fn join_segments(base: &url::Url, segments: &[&str]) -> Result<url::Url, AzureError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AzureError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason: "endpoint cannot be a base URL".into(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
