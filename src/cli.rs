//! CLI implementation for kenaz

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kenaz::config::Config;
use kenaz::{reconcile, server};

#[derive(Parser)]
#[command(name = "kenaz")]
#[command(about = "Local-first Markdown knowledge base with live search and graph")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the vault root directory
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Override the SQLite index path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the HTTP port
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server with the file watcher (default)
    Serve,
    /// Rebuild the index from the vault and exit
    Sync,
    /// Show index statistics
    Stats,
    /// Serve LLM tools over stdio (JSON-RPC)
    Mcp,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(vault) = cli.vault {
        config.vault.path = vault;
    }
    if let Some(db) = cli.db {
        config.sqlite.path = db;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    config.validate()?;

    // Log to stderr so stdout stays clean for the MCP transport.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone())),
        )
        .init();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => rt.block_on(server::run(config)),
        Commands::Sync => rt.block_on(cmd_sync(config)),
        Commands::Stats => rt.block_on(cmd_stats(config)),
        Commands::Mcp => rt.block_on(cmd_mcp(config)),
    }
}

async fn cmd_sync(config: Config) -> Result<()> {
    let (vault, index, _service) = server::build_service(&config).await?;
    // build_service already ran a sweep; run one more and report it so the
    // command doubles as a fixpoint check.
    let stats = reconcile::sync(&vault, &index).await?;
    println!(
        "synced: {} indexed, {} removed, {} unchanged",
        stats.indexed, stats.removed, stats.unchanged
    );
    index.close().await;
    Ok(())
}

async fn cmd_stats(config: Config) -> Result<()> {
    let (_vault, index, _service) = server::build_service(&config).await?;
    let stats = index.stats().await?;
    println!("notes:            {}", stats.notes);
    println!("links:            {}", stats.links);
    println!("unresolved links: {}", stats.unresolved_links);
    println!("distinct tags:    {}", stats.tags);
    println!(
        "search backend:   {}",
        if stats.fts_enabled { "fts5" } else { "like" }
    );
    index.close().await;
    Ok(())
}

async fn cmd_mcp(config: Config) -> Result<()> {
    let (_vault, _index, service) = server::build_service(&config).await?;
    kenaz::mcp::serve_stdio(service).await
}
