// src/main.rs
// Sentinel - MCP tool server for HTTP-based security research

use anyhow::Result;
use clap::{Parser, Subcommand};
use sentinel_mcp::config::{Config, Transport};
use sentinel_mcp::cookies::CookieProvider;
use sentinel_mcp::mcp::SentinelServer;
use sentinel_mcp::vector::embeddings::{EmbeddingProvider, HttpEmbeddingProvider, NullEmbeddingProvider};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sentinel-mcp", version, about = "MCP tool server for HTTP-based security research")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server (default when no subcommand is given)
    Serve,
    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Cookie session manifest inspection
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration loaded from the environment
    Show,
}

#[derive(Subcommand)]
enum CookieAction {
    /// List configured cookie sessions and flag any that fail to load
    Check,
}

#[derive(Subcommand)]
enum DbAction {
    /// Apply all pending schema migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.sentinel-mcp/.env only, never from CWD: a malicious
    // target directory must not be able to inject API keys or proxy settings.
    if let Some(home) = dirs::home_dir() {
        if let Err(e) = dotenvy::from_path(home.join(".sentinel-mcp/.env")) {
            tracing::trace!("no global .env file loaded: {}", e);
        }
    }

    let cli = Cli::parse();

    let log_level = match &cli.command {
        None | Some(Commands::Serve) => Level::WARN, // quiet: stdout is reserved for MCP stdio framing
        Some(Commands::Config { .. }) | Some(Commands::Cookies { .. }) => Level::WARN,
        Some(Commands::Db { .. }) => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => run_server().await,
        Some(Commands::Config { action: ConfigAction::Show }) => run_config_show(),
        Some(Commands::Cookies { action: CookieAction::Check }) => run_cookies_check().await,
        Some(Commands::Db { action: DbAction::Migrate }) => run_db_migrate().await,
    }
}

fn load_config() -> Result<Config> {
    Config::from_env().map_err(|e| anyhow::anyhow!(e.to_user_string()))
}

fn build_embeddings() -> Arc<dyn EmbeddingProvider> {
    let base_url = std::env::var("SENTINEL_EMBEDDINGS_URL").ok();
    let api_key = std::env::var("SENTINEL_EMBEDDINGS_API_KEY").ok();
    match (base_url, api_key) {
        (Some(base_url), Some(api_key)) if !base_url.is_empty() && !api_key.is_empty() => {
            let model = std::env::var("SENTINEL_EMBEDDINGS_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string());
            let dimensions = std::env::var("SENTINEL_EMBEDDINGS_DIMENSIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(sentinel_mcp::vector::embeddings::DEFAULT_DIMENSIONS);
            info!("Semantic search enabled ({model})");
            Arc::new(HttpEmbeddingProvider::new(base_url, api_key, model, dimensions))
        }
        _ => {
            info!("Semantic search disabled (set SENTINEL_EMBEDDINGS_URL and SENTINEL_EMBEDDINGS_API_KEY to enable)");
            Arc::new(NullEmbeddingProvider::new())
        }
    }
}

fn build_cookie_provider(config: &Config) -> Option<Arc<CookieProvider>> {
    if !config.http_server.cookie_sessions_enabled {
        return None;
    }
    let manifest_path = config.http_server.cookie_sessions_config.clone()?;
    let data_dir = config.application.data_dir.join("cookies");
    Some(Arc::new(CookieProvider::new(manifest_path, data_dir)))
}

async fn run_server() -> Result<()> {
    let config = load_config()?;

    let pool = sentinel_mcp::db::open(&config.database).await?;
    let embeddings = build_embeddings();
    let cookies = build_cookie_provider(&config);

    let server = SentinelServer::new(
        pool,
        Arc::new(config.http_server.clone()),
        embeddings,
        cookies,
    )
    .map_err(|e| anyhow::anyhow!(e.to_user_string()))?;

    match config.http_server.transport {
        Transport::Stdio => {
            info!("Starting sentinel-mcp on stdio transport");
            let transport = rmcp::transport::io::stdio();
            let service = rmcp::serve_server(server, transport).await?;
            service.waiting().await?;
        }
        Transport::Http | Transport::Sse => {
            anyhow::bail!(
                "transport '{:?}' is not yet wired up; use SENTINEL_TRANSPORT=stdio",
                config.http_server.transport
            );
        }
    }

    Ok(())
}

fn run_config_show() -> Result<()> {
    let config = load_config()?;
    let pretty = serde_yaml::to_string(&config)?;
    println!("{pretty}");
    Ok(())
}

async fn run_cookies_check() -> Result<()> {
    let config = load_config()?;
    let Some(provider) = build_cookie_provider(&config) else {
        println!("Cookie sessions are not enabled (SENTINEL_COOKIE_SESSIONS_ENABLED=false)");
        return Ok(());
    };

    let names = provider.list_sessions().await;
    if names.is_empty() {
        println!("No cookie sessions configured");
        return Ok(());
    }

    let mut failures = 0;
    for name in names {
        let session = provider.read(&name).await;
        match session.error {
            Some(reason) => {
                failures += 1;
                println!("✗ {name}: {reason}");
            }
            None => println!("✓ {name}: {} cookies", session.cookies.len()),
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} cookie session(s) failed to load");
    }
    Ok(())
}

async fn run_db_migrate() -> Result<()> {
    let config = load_config()?;
    let pool = sentinel_mcp::db::open(&config.database).await?;
    drop(pool);
    info!("Migrations applied");
    Ok(())
}
