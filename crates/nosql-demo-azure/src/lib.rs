//! `nosql-demo-azure`: Azure implementations of the demo's service ports.
//!
//! ```text
//! AzureServices (ServiceFactory)
//!     ├── credential()  → DefaultAzureCredential (env → managed identity → az CLI)
//!     ├── container()   → CosmosContainer   (REST, Entra ID auth)
//!     └── chat_client() → AzureOpenAiChat   (REST, bearer token)
//! ```
//!
//! One `reqwest::Client` is shared by every client the factory builds.

pub mod cosmos;
pub mod credential;
pub mod error;
pub mod openai;

use std::sync::Arc;

use nosql_demo_core::{ChatClient, Container, ServiceFactory, TokenCredential};

pub use cosmos::CosmosContainer;
pub use credential::{
    AzureCliCredential, ChainedTokenCredential, DefaultAzureCredential, EnvironmentCredential,
    ManagedIdentityCredential,
};
pub use error::AzureError;
pub use openai::AzureOpenAiChat;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AzureError>;

/// Builds Azure-backed credentials and clients.
#[derive(Clone)]
pub struct AzureServices {
    http: reqwest::Client,
    credential: Option<Arc<dyn TokenCredential>>,
}

impl AzureServices {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("nosql-demo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            credential: None,
        })
    }

    /// Use a fixed credential instead of resolving one from the environment.
    pub fn with_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }
}

impl ServiceFactory for AzureServices {
    /// A fresh `DefaultAzureCredential` per call, so each run sees the
    /// current environment.
    fn credential(&self) -> Arc<dyn TokenCredential> {
        match &self.credential {
            Some(c) => c.clone(),
            None => Arc::new(DefaultAzureCredential::from_env(self.http.clone())),
        }
    }

    fn container(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        database: &str,
        container: &str,
    ) -> nosql_demo_core::Result<Box<dyn Container>> {
        let client =
            CosmosContainer::new(self.http.clone(), endpoint, credential, database, container)?;
        Ok(Box::new(client))
    }

    fn chat_client(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
        deployment: &str,
    ) -> nosql_demo_core::Result<Box<dyn ChatClient>> {
        let client = AzureOpenAiChat::new(self.http.clone(), endpoint, credential, deployment)?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nosql_demo_core::{DemoError, Item};

    #[test]
    fn invalid_endpoint_surfaces_as_configuration_error() {
        let services = AzureServices::new().unwrap();
        let err = services
            .container("not-a-url", services.credential(), "db", "c")
            .err()
            .unwrap();
        assert!(matches!(err, DemoError::InvalidEndpoint { .. }));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn factory_clients_share_the_injected_credential() {
        struct Denied;

        #[async_trait::async_trait]
        impl TokenCredential for Denied {
            async fn get_token(
                &self,
                _scopes: &[&str],
            ) -> nosql_demo_core::Result<nosql_demo_core::AccessToken> {
                Err(DemoError::Credential("denied".into()))
            }
        }

        let services = AzureServices::new().unwrap().with_credential(Arc::new(Denied));
        let container = services
            .container(
                "http://127.0.0.1:9/",
                services.credential(),
                "db",
                "c",
            )
            .unwrap();
        // The credential fails before any request is sent.
        let err = container.upsert_item(&Item::demo()).await.unwrap_err();
        assert!(matches!(err, DemoError::Credential(_)));
    }
}
