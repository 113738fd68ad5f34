//! idp-router CLI
//!
//! Routes a request payload against a router configuration and prints the
//! decision, or validates a configuration file.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use idp_router::{DocumentAnalysis, DocumentRouter, RouterConfig};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};

/// How a routing decision is printed.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Full analysis including per-page metrics
    Analysis,
    /// Flat audit record
    Audit,
    /// Metadata record merged into the payload's `documentMetadata`
    Metadata,
}

#[derive(Parser)]
#[command(name = "idp-router")]
#[command(version, about = "Route documents to a parsing strategy", long_about = None)]
struct Cli {
    /// Log routing internals at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one payload and print the decision as JSON
    Route {
        /// Payload JSON file, or '-' for stdin
        payload: PathBuf,

        /// Object key; defaults to the payload's s3.object.key
        #[arg(short, long)]
        key: Option<String>,

        /// Router configuration (.toml, .yaml, .yml or .json); discovered when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "analysis")]
        format: OutputFormat,
    },

    /// Validate a configuration file and print a summary
    CheckConfig {
        /// Router configuration (.toml, .yaml, .yml or .json); discovered when omitted
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RouterConfig> {
    match path {
        Some(path) => {
            RouterConfig::from_file(path).with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => match RouterConfig::discover().context("Failed to discover configuration")? {
            Some(config) => Ok(config),
            None => {
                tracing::warn!("No idp-router.toml found, using default configuration");
                Ok(RouterConfig::default())
            }
        },
    }
}

fn read_payload(path: &Path) -> Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read payload from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read payload {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

fn object_key(payload: &Value, key: Option<String>) -> Result<String> {
    if let Some(key) = key {
        return Ok(key);
    }
    match payload.pointer("/s3/object/key").and_then(Value::as_str) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => bail!("No object key given and payload has no s3.object.key"),
    }
}

fn render(analysis: &DocumentAnalysis, payload: &Value, format: OutputFormat) -> Result<Value> {
    let rendered = match format {
        OutputFormat::Analysis => serde_json::to_value(analysis)?,
        OutputFormat::Audit => serde_json::to_value(analysis.to_audit_record())?,
        OutputFormat::Metadata => {
            let base = payload
                .get("documentMetadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);
            Value::Object(analysis.to_metadata_record(&base)?)
        }
    };
    Ok(rendered)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Route {
            payload,
            key,
            config,
            format,
        } => {
            let config = load_config(config.as_deref())?;
            let router = DocumentRouter::new(config).context("Invalid router configuration")?;
            let payload = read_payload(&payload)?;
            let key = object_key(&payload, key)?;

            let analysis = router.route_configured(&payload, &key);
            let rendered = render(&analysis, &payload, format)?;
            println!("{}", serde_json::to_string_pretty(&rendered)?);
            Ok(())
        }

        Commands::CheckConfig { config } => {
            let config = load_config(config.as_deref())?;
            let router = DocumentRouter::new(config).context("Invalid router configuration")?;
            let config = router.config();

            println!("Configuration is valid");
            println!("  mode: {:?}", config.mode);
            println!("  analyser: {}", router.analyser_name());
            println!("  fallback strategy: {}", config.fallback_strategy.name);
            if let Some(static_strategy) = &config.static_strategy {
                println!("  static strategy: {}", static_strategy.name);
            }
            println!("  request override flag: {}", config.request_override_flag_name);
            println!("  pattern overrides: {}", router.overrides().len());
            for (category, strategy) in &config.default_strategy_map {
                println!("  {} -> {}", category, strategy.name);
            }
            Ok(())
        }
    }
}
