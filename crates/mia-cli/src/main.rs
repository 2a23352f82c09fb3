//! MIA CLI - Command-line interface
//!
//! Usage:
//!   mia query <text> [--top-k N] [--filter JSON] [--show-log] [--synthesize]
//!   mia config check

use anyhow::Context;
use clap::{Parser, Subcommand};
use mia_core::{config::AppConfig, telemetry, RawRequest};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mia")]
#[command(about = "Semantic search over recorded memories")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the response envelope
    Query {
        /// Text to search for
        text: String,

        /// Number of matches to return
        #[arg(long)]
        top_k: Option<u64>,

        /// Metadata filter as a JSON object
        #[arg(long)]
        filter: Option<String>,

        /// Log each match
        #[arg(long)]
        show_log: bool,

        /// Synthesize an answer from the matches
        #[arg(long)]
        synthesize: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate configuration and print it with secrets masked
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;

    // stdout carries the envelope
    telemetry::init_tracing(&config.logging, std::io::stderr)?;

    match cli.command {
        Commands::Query {
            text,
            top_k,
            filter,
            show_log,
            synthesize,
        } => {
            if synthesize {
                config.rag.synthesize_answer = true;
            }
            let raw = build_request(text, top_k, filter.as_deref(), show_log)?;

            let pipeline = mia_rag::build_pipeline(&config)
                .await
                .context("Failed to initialize query pipeline")?;
            let envelope = pipeline.handle(raw).await;

            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Check => {
                let redacted = config.redacted();
                println!("{}", serde_json::to_string_pretty(&redacted)?);
                config.validate()?;
                println!("Configuration OK");
            }
        },
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

/// Build the request object the HTTP endpoint would receive
fn build_request(
    text: String,
    top_k: Option<u64>,
    filter: Option<&str>,
    show_log: bool,
) -> anyhow::Result<RawRequest> {
    let mut body = Map::new();
    body.insert("query_text".to_string(), Value::String(text));
    if let Some(top_k) = top_k {
        body.insert("query_top_k".to_string(), Value::from(top_k));
    }
    if let Some(filter) = filter {
        let filter: Value = serde_json::from_str(filter).context("--filter is not valid JSON")?;
        body.insert("query_filter".to_string(), filter);
    }
    body.insert("show_log".to_string(), Value::Bool(show_log));
    Ok(RawRequest::Object(body))
}
