use clap::Parser;
use proxy_router::config::config_search_paths;
use proxy_router::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "proxy-router",
    about = "Schema-translating proxy between Anthropic-style clients and an OpenAI-style gateway",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream gateway URL (overrides config)
    #[arg(long)]
    target: Option<String>,

    /// External model prefix (overrides config)
    #[arg(long)]
    prefix: Option<String>,

    /// Log file path
    #[arg(long, default_value = "proxy-router.log")]
    log_file: PathBuf,

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
                .unwrap_or_else(|_| "proxy_router=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(target) = cli.target {
        config.target_url = target;
    }
    if let Some(prefix) = cli.prefix {
        config.prefix = prefix;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    let client = config.http_client()?;

    // Validates the config before anything binds.
    let state = Arc::new(AppState::new(config.clone(), client, logger.clone())?);

    info!("proxy-router v{}", env!("CARGO_PKG_VERSION"));
    info!("  Port:      {}", config.port);
    info!("  Target:    {}", config.target_url);
    info!("  Prefix:    {}", config.prefix);
    info!("  Dashboard: {}", config.dashboard.display());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting proxy-router target={} prefix={} port={}",
            config.target_url, config.prefix, config.port
        ),
    );

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("Dashboard: http://localhost:{}/dashboard.html", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
