use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemoError {
    /// A required `Connection:*` key was absent or empty at first use.
    #[error("{what} is not configured. Please configure the \"{key}\" configuration setting.")]
    MissingSetting {
        key: &'static str,
        what: &'static str,
    },

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error("database request failed ({status}): {message} [activity id: {activity_id}]")]
    Database {
        status: u16,
        message: String,
        activity_id: String,
    },

    #[error("chat completion request failed ({status}): {message}")]
    Chat { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to read settings file {path}: {message}")]
    SettingsFile { path: String, message: String },
}

impl DemoError {
    /// `true` for errors raised by configuration checks rather than remote calls.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DemoError::MissingSetting { .. }
                | DemoError::InvalidEndpoint { .. }
                | DemoError::SettingsFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DemoError>;
