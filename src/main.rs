//! Polyglot Runes MCP Server - Entry Point
//!
//! Sets up logging, loads the configuration, builds the client pool and the
//! bridge, and serves MCP over stdio until the client disconnects.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use polyglot_runes::bridge::Bridge;
use polyglot_runes::config::BridgeConfig;
use polyglot_runes::language::ConfigLanguageDetector;
use polyglot_runes::lsp::ProcessClientFactory;
use polyglot_runes::mcp::PolyglotRunes;
use polyglot_runes::pool::ClientPool;

/// MCP server for code intelligence across every language in a workspace.
#[derive(Parser, Debug)]
#[command(name = "polyglot-runes")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root directory to navigate.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error. Overrides the config.
    #[arg(long)]
    log_level: Option<String>,

    /// Consecutive failures tolerated before a connection is closed.
    #[arg(long)]
    max_restart_attempts: Option<u32>,

    /// Delay between a connection failure and the next attempt.
    #[arg(long)]
    restart_delay_ms: Option<u64>,

    /// Write the effective configuration to this path and exit.
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

impl Args {
    /// Loads the configuration file, if any, and applies command-line overrides.
    fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(level) = &self.log_level {
            config.global.log_level.clone_from(level);
        }
        if let Some(attempts) = self.max_restart_attempts {
            config.global.max_restart_attempts = attempts;
        }
        if let Some(delay) = self.restart_delay_ms {
            config.global.restart_delay_ms = delay;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Parses a log level string into a tracing Level.
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!("invalid log level: {}", other),
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(level: Level) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "polyglot_runes={level},tower={level},async_lsp={level}"
        ))
    });

    // Logs go to stderr; stdout carries MCP traffic.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}

/// Main entry point.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    if let Some(path) = &args.write_default_config {
        config
            .save(path)
            .with_context(|| format!("failed to write config {}", path.display()))?;
        eprintln!("wrote configuration to {}", path.display());
        return Ok(());
    }

    init_tracing(parse_log_level(&config.global.log_level)?)?;

    let workspace = args.workspace.canonicalize().context(format!(
        "failed to canonicalize workspace path: {}",
        args.workspace.display()
    ))?;

    info!(
        workspace = %workspace.display(),
        languages = ?config.language_servers.keys().collect::<Vec<_>>(),
        max_restart_attempts = config.global.max_restart_attempts,
        "starting polyglot-runes MCP server"
    );

    let config = Arc::new(config);
    let factory = Arc::new(ProcessClientFactory::new(
        workspace.clone(),
        config.init_timeout(),
        config.request_timeout(),
    ));
    let pool = Arc::new(ClientPool::new(config.clone(), factory));
    let detector = Arc::new(ConfigLanguageDetector::new(config.extension_map()));
    let bridge = Arc::new(Bridge::new(pool.clone(), detector, workspace));

    let shutdown = CancellationToken::new();
    let server = PolyglotRunes::new(bridge, shutdown.clone());

    info!("starting MCP server with stdio transport");
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;

    info!("MCP server started, waiting for messages");
    let quit_reason = service.waiting().await;

    // Abort in-flight tool calls before the servers go away.
    shutdown.cancel();
    pool.close_all().await;

    quit_reason.context("MCP service terminated abnormally")?;
    info!("MCP server shut down gracefully");

    Ok(())
}
