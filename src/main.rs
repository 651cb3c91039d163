//! instagram-mcp: MCP server for AI-assisted Instagram business account management
//!
//! Exposes profile, media, insights, publishing and direct messaging
//! operations of the Instagram Graph API as MCP tools, resources and prompts.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use instagram_mcp::config::{self, LogFormat};
use instagram_mcp::graph::GraphClient;
use instagram_mcp::mcp::server::McpServer;

/// MCP server for AI-assisted Instagram business account management.
///
/// Reads its access token from the configuration file or the
/// `INSTAGRAM_ACCESS_TOKEN` environment variable.
#[derive(Parser, Debug)]
#[command(name = "instagram-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Start without checking the access token against the Graph API
    #[arg(long)]
    skip_token_check: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Output goes to `file` when one is configured and to stderr otherwise;
/// stdout carries the MCP message stream.
fn init_tracing(level: Level, format: LogFormat, file: Option<File>) {
    let to_terminal = file.is_none();
    let writer = match file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(io::stderr),
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(to_terminal)
        .with_writer(writer);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Checks the token before serving. Returns `false` if the platform rejected it.
async fn check_token(client: &GraphClient) -> bool {
    match client.validate_access_token().await {
        Ok(status) if status.valid => {
            info!(user_id = status.user_id.as_deref().unwrap_or("unknown"), "Access token valid");
            true
        }
        Ok(status) => {
            error!(
                reason = status.reason.as_deref().unwrap_or("unknown"),
                "Access token rejected by the Graph API"
            );
            false
        }
        Err(e) => {
            warn!(error = %e, "Could not validate access token, continuing");
            true
        }
    }
}

/// Entry point for the instagram-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    let log_file = match &cfg.logging.file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to open log file {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };
    init_tracing(log_level, cfg.logging.format, log_file);

    let client_config = match cfg.client_config() {
        Ok(client_config) => client_config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api_version = %client_config.credentials.api_version,
        "Starting instagram-mcp server"
    );

    let client = match GraphClient::new(client_config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to create Graph API client");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    if !args.skip_token_check && !runtime.block_on(check_token(&client)) {
        return ExitCode::FAILURE;
    }

    let mut server = McpServer::new(Arc::clone(&client));

    info!("MCP server ready, waiting for client connection...");

    let result = runtime.block_on(server.run());
    drop(server);

    if let Ok(client) = Arc::try_unwrap(client) {
        client.close();
    }

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
