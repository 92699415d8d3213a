use std::sync::Arc;

use tracing::{debug, info};

use crate::console::{Console, ConsoleLine};
use crate::error::Result;
use crate::item::Item;
use crate::services::ServiceFactory;
use crate::settings::ConnectionSettings;

pub const WELCOME_MESSAGE: &str = "Welcome to the Azure Cosmos DB for NoSQL demo!";
pub const FINISHED_MESSAGE: &str = "Demo finished!";
pub const PROMPT: &str = "Translate \"Hello, how are you?\" to German and Spanish.";

/// What a successful run wrote, read back, and received from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoSummary {
    pub written: Item,
    pub read: Item,
    pub response: String,
}

/// Token counts are shown with at least three digits. Values above 999 keep
/// all their digits (`1234` stays `1234`).
pub fn format_token_count(count: u32) -> String {
    format!("{count:03}")
}

/// The demo run: one upsert, one point read, one chat completion, each
/// reported to the console before the next begins.
pub struct Demo {
    settings: Arc<ConnectionSettings>,
    services: Arc<dyn ServiceFactory>,
    console: Arc<dyn Console>,
}

impl Demo {
    pub fn new(
        settings: Arc<ConnectionSettings>,
        services: Arc<dyn ServiceFactory>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            settings,
            services,
            console,
        }
    }

    fn write(&self, message: impl Into<String>) {
        let line = ConsoleLine::plain(message);
        debug!(message = %line.message, "console");
        self.console.write(line);
    }

    fn highlight(&self, message: impl Into<String>) {
        let line = ConsoleLine::highlighted(message);
        debug!(message = %line.message, "console");
        self.console.write(line);
    }

    /// Run the whole sequence.
    ///
    /// On error the run stops where it failed: lines already written stay in
    /// the console, the loading flag stays set, and earlier writes to the
    /// database are not undone.
    pub async fn run(&self) -> Result<DemoSummary> {
        self.console.set_loading(true);
        self.console.clear();

        self.highlight(WELCOME_MESSAGE);

        let credential = self.services.credential();

        let settings = &self.settings;
        let cosmos_endpoint = settings.cosmos_endpoint()?;
        let database_name = settings.cosmos_database_name()?;
        let container_name = settings.cosmos_container_name()?;

        self.write("Connecting to Azure Cosmos DB for NoSQL client...");
        self.write(format!("Azure Cosmos DB for NoSQL Endpoint: {cosmos_endpoint}"));

        let container = self.services.container(
            cosmos_endpoint,
            credential.clone(),
            database_name,
            container_name,
        )?;

        self.write(format!(
            "Associated with {container_name} container of {database_name} database."
        ));

        let item = Item::demo();
        let id = item.id.clone();
        let partition_key = item.partition_key().to_string();

        self.write(format!("Creating item: {item}"));

        let write_response = container.upsert_item(&item).await?;
        info!(
            activity_id = %write_response.activity_id,
            request_charge = write_response.request_charge,
            "upsert complete"
        );

        self.highlight("Upsert opertaion done");
        self.write(format!(
            "Request charge of the operation: {:.2}",
            write_response.request_charge
        ));
        self.write(format!(
            "Activity ID of the operation: {}",
            write_response.activity_id
        ));

        self.write(format!(
            "Point reading item id \"{id}\" and partition key \"{partition_key}\""
        ));

        let read_response = container.read_item(&id, &partition_key).await?;
        info!(
            activity_id = %read_response.activity_id,
            request_charge = read_response.request_charge,
            "point read complete"
        );

        self.highlight("Read operation done");
        self.write(format!(
            "Request charge of the operation: {:.2}",
            read_response.request_charge
        ));
        self.write(format!(
            "Activity ID of the operation: {}",
            read_response.activity_id
        ));

        let openai_endpoint = settings.openai_endpoint()?;
        let deployment_name = settings.openai_deployment_name()?;

        self.write("Connecting to Azure OpenAI client...");
        self.write(format!("Azure OpenAI Endpoint: {openai_endpoint}"));

        let chat = self
            .services
            .chat_client(openai_endpoint, credential, deployment_name)?;

        self.write(format!("Associated with {deployment_name} deployment."));

        self.write(format!("Prompt sent: {PROMPT}"));

        let completion = chat.complete_chat(PROMPT).await?;
        info!(
            completion_id = %completion.id,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "chat completion complete"
        );

        self.highlight("Chat completion done");
        self.write(format!("Chat completion ID: {}", completion.id));
        self.write(format!(
            "Chat completion content count: {}",
            completion.content.len()
        ));
        self.write(format!(
            "Input token usage: {}",
            format_token_count(completion.usage.input_tokens)
        ));
        self.write(format!(
            "Output token usage: {}",
            format_token_count(completion.usage.output_tokens)
        ));

        let response = completion.response_text();

        self.write(format!("Chat completion response: {response}"));

        self.highlight(FINISHED_MESSAGE);
        self.console.set_loading(false);

        Ok(DemoSummary {
            written: write_response.resource,
            read: read_response.resource,
            response,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
