//! `nosql-demo-core`: configuration, domain types and the demo run itself.
//!
//! ```text
//! appsettings.json, appsettings.{Env}.json, env vars
//!     │
//!     ▼
//! ConfigMap ──► ConnectionSettings
//!                   │
//!                   ▼
//! ServiceFactory ─► Demo::run ─► Console
//! ```
//!
//! Nothing in this crate performs network I/O; the Azure adapters live in
//! `nosql-demo-azure`.

pub mod console;
pub mod demo;
pub mod error;
pub mod item;
pub mod services;
pub mod settings;

pub use console::{Console, ConsoleLine, ConsoleLog, MemoryConsole};
pub use demo::{Demo, DemoSummary};
pub use error::{DemoError, Result};
pub use item::Item;
pub use services::{
    AccessToken, ChatClient, ChatCompletion, Container, ContentPart, ItemResponse,
    ServiceFactory, TokenCredential, TokenUsage,
};
pub use settings::{ConfigMap, ConnectionSettings, SettingsSources};
