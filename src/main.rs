use clap::Parser;
use llm_router::{build_router, ApiCallLedger, AppState, Gateway, GatewayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "llm-router",
    about = "Multi-provider LLM API gateway with ordered failover",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llm_router=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in llm_router::config::config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let ledger = ApiCallLedger::open(config.billing.ledger_file.clone())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        providers = config.providers.len(),
        models = config.models.len(),
        logging = ?config.server.logging,
        "starting llm-router"
    );
    if let Some(ref path) = config.billing.ledger_file {
        info!(path = %path.display(), records = ledger.len(), "billing ledger opened");
    }

    // No overall timeout: streamed generations can run for minutes.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let gateway = Gateway::new(config, Arc::new(ledger)).with_client(client);
    let app = build_router(Arc::new(AppState::new(gateway)));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
