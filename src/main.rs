//! Command-line front end: list, describe and call the tools of one API.
//!
//! ```bash
//! api-toolkit --config github.json list
//! api-toolkit --config github.json call getUser --args '{"username": "octocat"}'
//! RUST_LOG=api_toolkit=debug api-toolkit --config github.json call listRepos
//! ```

use anyhow::{Context, Result};
use api_toolkit::{ApiConfig, ToolCatalog};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Call remote API endpoints as tools
#[derive(Parser, Debug)]
#[command(name = "api-toolkit", version)]
struct Cli {
    /// Path to the API config file (JSON)
    #[arg(long, short, env = "API_TOOLKIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available tools
    List,
    /// Print a tool's name, description and argument schema
    Describe {
        /// Tool name
        tool: String,
    },
    /// Call a tool and print the result
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Print the JSON schema of the config file
    Schema,
}

fn load_catalog(path: Option<&PathBuf>) -> Result<ToolCatalog> {
    let path = path.context("--config is required for this command")?;
    let config = ApiConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok(ToolCatalog::new(config)?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Schema => print_json(&ApiConfig::json_schema())?,
        Command::List => {
            let catalog = load_catalog(cli.config.as_ref())?;
            for definition in catalog.definitions() {
                println!("{}: {}", definition.name, definition.description);
            }
        }
        Command::Describe { tool } => {
            let catalog = load_catalog(cli.config.as_ref())?;
            let definition = catalog.describe(&tool)?;
            print_json(&serde_json::to_value(definition)?)?;
        }
        Command::Call { tool, args } => {
            let catalog = load_catalog(cli.config.as_ref())?;
            let args: Value = serde_json::from_str(&args).context("--args must be valid JSON")?;
            match catalog.execute(&tool, &args).await {
                Ok(output) => print_json(&output)?,
                Err(error) => {
                    print_json(&error.error_payload())?;
                    return Err(anyhow::Error::new(error).context("call failed"));
                }
            }
        }
    }

    Ok(())
}
