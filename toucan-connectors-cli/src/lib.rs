//! Command-line front end of the connector catalog.
//!
//! The binary lives in `main.rs`; parsing and command handlers live here so
//! they can be exercised in-process.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use toucan_connectors_core::logging::LogFormat;
use toucan_connectors_core::registry::KNOWN_BACKENDS;
use toucan_connectors_core::schema::check_document;
use toucan_connectors_core::{Catalog, ConnectorsError, Registry};
use tracing::{debug, info};

/// Environment variable holding the catalog path.
pub const CONFIG_ENV: &str = "TOUCAN_CONNECTORS_CONFIG";

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "toucan-connectors")]
#[command(about = "Inspect, check and run Toucan connector catalogs")]
#[command(version)]
#[command(long_about = "
Toucan connectors - validated data-source configuration

A catalog file is a JSON document with two arrays:
- connectors: how to reach a backend (host, credentials, ...)
- data_sources: one query each, bound to a connector by name

Passwords are masked in every report and never written to logs.

EXAMPLES:
  toucan-connectors list
  toucan-connectors schema Postgres
  toucan-connectors check --config catalog.json
  toucan-connectors retrieve --config catalog.json sales --limit 20
")]
pub struct Cli {
    /// Flags accepted by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List backends and whether this build supports them
    List,
    /// Print the JSON Schema of a backend's records
    Schema(SchemaArgs),
    /// Validate a catalog file and report every violation
    Check(CheckArgs),
    /// Run a data source and print its result as JSON
    Retrieve(RetrieveArgs),
}

/// Arguments of `schema`.
#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Backend identifier, e.g. Postgres
    #[arg(value_name = "BACKEND")]
    pub backend: String,
}

/// Location of the catalog file.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Catalog file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = CONFIG_ENV,
        default_value = "toucan-connectors.json"
    )]
    pub config: PathBuf,
}

/// Arguments of `check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Catalog to validate
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments of `retrieve`.
#[derive(Debug, Args)]
pub struct RetrieveArgs {
    /// Catalog holding the data source
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Domain of the data source to run
    #[arg(value_name = "DOMAIN")]
    pub domain: String,

    /// Rows to skip
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Maximum number of rows to print
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Logging flags shared by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Only log errors")]
    pub quiet: bool,

    /// Emit log events as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Log output shape selected by the flags.
    pub fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Runs `cli`, writing command output to `out`.
///
/// Returns `false` when the command ran but found problems, e.g. catalog
/// violations.
///
/// # Errors
/// Returns an error when the command could not run.
pub async fn run(cli: &Cli, out: &mut dyn Write) -> Result<bool> {
    let registry = Registry::with_default_backends();
    debug!(backends = ?registry.backends(), "Registry ready");

    match &cli.command {
        Command::List => list_backends(&registry, out),
        Command::Schema(args) => print_schema(&registry, &args.backend, out),
        Command::Check(args) => check_catalog(&registry, &args.config.config, out).await,
        Command::Retrieve(args) => retrieve(&registry, args, out).await,
    }
}

fn list_backends(registry: &Registry, out: &mut dyn Write) -> Result<bool> {
    let enabled = registry.backends();
    for (backend, feature) in KNOWN_BACKENDS {
        if enabled.contains(backend) {
            writeln!(out, "{backend:<10} enabled")?;
        } else {
            writeln!(out, "{backend:<10} disabled (--features {feature})")?;
        }
    }
    Ok(true)
}

fn print_schema(registry: &Registry, backend: &str, out: &mut dyn Write) -> Result<bool> {
    let description = registry.describe(backend)?;
    serde_json::to_writer_pretty(&mut *out, &description.json_schema())?;
    writeln!(out)?;
    Ok(true)
}

async fn read_document(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Catalog file {} is not valid JSON", path.display()))
}

/// Checks each record against its backend's exported JSON Schema.
///
/// Secrets are masked before checking since messages quote values.
fn schema_messages(registry: &Registry, document: &Value) -> Result<Vec<String>> {
    let mut messages = Vec::new();
    let mut backends: HashMap<&str, &str> = HashMap::new();

    let connectors = document.get("connectors").and_then(Value::as_array);
    for (index, raw) in connectors.into_iter().flatten().enumerate() {
        let Some(backend) = raw.get("type").and_then(Value::as_str) else {
            continue;
        };
        let schema = registry.describe(backend)?.connector;
        if let Some(name) = raw.get("name").and_then(Value::as_str) {
            backends.insert(name, backend);
        }
        for message in check_document(&schema.json_schema(), &schema.mask_secrets(raw))? {
            messages.push(format!("connectors[{index}]: {message}"));
        }
    }

    let data_sources = document.get("data_sources").and_then(Value::as_array);
    for (index, raw) in data_sources.into_iter().flatten().enumerate() {
        let backend = raw
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| backends.get(name).copied())
            .or_else(|| raw.get("type").and_then(Value::as_str));
        let Some(backend) = backend else {
            continue;
        };
        let schema = registry.describe(backend)?.data_source;
        for message in check_document(&schema.json_schema(), &schema.mask_secrets(raw))? {
            messages.push(format!("data_sources[{index}]: {message}"));
        }
    }
    Ok(messages)
}

async fn check_catalog(registry: &Registry, path: &Path, out: &mut dyn Write) -> Result<bool> {
    info!(path = %path.display(), "Checking catalog");
    let document = read_document(path).await?;

    match Catalog::from_value(registry, &document) {
        Ok(catalog) => {
            let messages = schema_messages(registry, &document)?;
            if !messages.is_empty() {
                writeln!(out, "{}: schema check failed", path.display())?;
                for message in &messages {
                    writeln!(out, "  {message}")?;
                }
                return Ok(false);
            }
            writeln!(
                out,
                "{}: {} connector(s), {} data source(s), no violations",
                path.display(),
                catalog.connectors().len(),
                catalog.data_sources().count()
            )?;
            Ok(true)
        }
        Err(ConnectorsError::Validation(errors)) => {
            writeln!(out, "{}: {} violation(s)", path.display(), errors.len())?;
            for violation in errors.violations() {
                writeln!(out, "  {violation}")?;
            }
            Ok(false)
        }
        Err(other) => Err(other.into()),
    }
}

async fn retrieve(registry: &Registry, args: &RetrieveArgs, out: &mut dyn Write) -> Result<bool> {
    let catalog = Catalog::load(registry, &args.config.config).await?;

    if args.offset > 0 || args.limit.is_some() {
        let slice = catalog
            .retrieve_slice(&args.domain, args.offset, args.limit)
            .await?;
        info!(
            domain = %args.domain,
            rows = slice.table.num_rows(),
            total = slice.total_count,
            "Retrieved slice"
        );
        serde_json::to_writer_pretty(&mut *out, &slice)?;
    } else {
        let table = catalog.retrieve(&args.domain).await?;
        info!(domain = %args.domain, rows = table.num_rows(), "Retrieved data");
        serde_json::to_writer_pretty(&mut *out, &table)?;
    }
    writeln!(out)?;
    Ok(true)
}
