//! CLI command definitions and handlers

mod score;
mod serve;

use crate::config::ServiceConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};

/// Careline - readmission risk scoring and patient records
#[derive(Parser, Debug)]
#[command(name = "careline")]
#[command(
    version,
    about = "Hospital readmission risk scoring, care recommendations and tenant-scoped patient records",
    after_help = "\
Examples:
  careline serve                          Start the HTTP API on 127.0.0.1:8080
  careline serve --port 9000 --db p.redb  Custom port and database file
  careline score patient.json             Score an assessment input
  cat patient.json | careline score -f json
  careline rules                          Show the active scoring rules
  careline config init                    Write an example config file"
)]
pub struct Cli {
    /// Config file (default: ./careline.toml, then ~/.config/careline/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address (overrides [server].host)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides [server].port)
        #[arg(long)]
        port: Option<u16>,

        /// Database file (overrides [storage].path)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Score a JSON assessment input from a file or stdin
    Score {
        /// Input file (default: stdin)
        file: Option<PathBuf>,

        /// Evaluation time, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Show every rule and whether it fired (text output only)
        #[arg(long)]
        explain: bool,
    },

    /// Print the active scoring rule table
    Rules {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example config file (to --config, or the user config path)
    Init,
    /// Show config paths and the effective configuration
    Show,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { host, port, db } => {
            let mut config = ServiceConfig::load(config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db) = db {
                config.storage.path = db;
            }
            serve::run(config)
        }

        Commands::Score {
            file,
            now,
            format,
            explain,
        } => {
            let config = ServiceConfig::load(config_path)?;
            score::run(&config, file.as_deref(), now.as_deref(), &format, explain)
        }

        Commands::Rules { format } => {
            let config = ServiceConfig::load(config_path)?;
            score::print_rules(&config, &format)
        }

        Commands::Config { action } => run_config_action(action, config_path),

        Commands::Version => {
            println!("careline {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_config_action(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = ServiceConfig::init(config_path)?;
            println!("{} Config written to: {}", style("✓").green(), path.display());
            println!("\nAI recommendations read their key from the environment, e.g.:");
            println!("  export ANTHROPIC_API_KEY=\"sk-ant-...\"");
            Ok(())
        }
        ConfigAction::Show => show_config(config_path),
    }
}

fn show_config(config_path: Option<&Path>) -> Result<()> {
    let config = ServiceConfig::load(config_path)?;

    println!("{}", style("Config paths:").bold());
    if let Some(path) = config_path {
        println!("  Explicit: {} {}", path.display(), style("✓").green());
    }
    let local = Path::new(crate::config::CONFIG_FILE_NAME);
    println!("  Local:    ./{} {}", local.display(), found_marker(local));
    if let Some(user_path) = ServiceConfig::user_config_path() {
        println!("  User:     {} {}", user_path.display(), found_marker(&user_path));
    }
    println!();

    let backend = config.ai.client_config()?.backend;
    let key_status = if !backend.requires_api_key() {
        style("not needed".to_string()).dim()
    } else if std::env::var(backend.env_key()).is_ok_and(|k| !k.trim().is_empty()) {
        style(format!("{} ✓", backend.env_key())).green()
    } else {
        style(format!("{} not set", backend.env_key())).yellow()
    };
    println!("{} {} ({})", style("AI backend:").bold(), backend, key_status);
    println!();

    print!("{}", config.to_toml());
    Ok(())
}

fn found_marker(path: &Path) -> console::StyledObject<&'static str> {
    if path.exists() {
        style("✓").green()
    } else {
        style("(not found)").dim()
    }
}
