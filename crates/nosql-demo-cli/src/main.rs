mod host;

use clap::Parser;
use nosql_demo_azure::AzureServices;
use nosql_demo_core::settings::DEFAULT_ENVIRONMENT;
use nosql_demo_server::AppState;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "nosql-demo",
    about = "Web demo: Azure Cosmos DB for NoSQL and Azure OpenAI with Entra ID credentials",
    version
)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "APP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 lets the OS pick)
    #[arg(long, short = 'p', env = "APP_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory holding appsettings.json (default: current directory)
    #[arg(long, env = "APP_CONTENT_ROOT")]
    content_root: Option<PathBuf>,

    /// Environment name; selects appsettings.{environment}.json
    #[arg(long, env = "APP_ENVIRONMENT", default_value = DEFAULT_ENVIRONMENT)]
    environment: String,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let content_root = match cli.content_root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let settings = host::load_settings(content_root, &cli.environment, host::utf8_env_vars())?;
    let services = AzureServices::new()?;
    let state = AppState::new(Arc::new(settings), Arc::new(services));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port)).await?;

        tokio::select! {
            result = nosql_demo_server::serve_on(listener, state) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
