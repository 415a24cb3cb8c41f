//! Command line front end: drives a tracker against a real endpoint and
//! inspects the offline queue.

pub mod config;
pub mod initialization;
pub mod logging_system;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use initialization::InitializationError;
pub use logging_system::{LoggingSystem, setup_logging_safe};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::dispatch::BasicEvent;
use crate::tracker::Tracker;

#[derive(Parser, Debug)]
#[command(author, version, about = "Telemetry hit tracker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build and send one hit
    Send {
        /// Volatile parameter as key=value, repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Send a screen view with this name
        #[arg(long)]
        screen: Option<String>,
    },
    /// Resend every stored hit
    Flush,
    /// Number of stored hits
    Count,
    /// Print stored hits, oldest first
    List,
    /// Delete stored hits
    Purge {
        /// Only hits older than this many days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("Expected key=value, got '{input}'")),
    }
}

pub struct App {
    tracker: Tracker,
}

impl App {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Tracker::builder()
            .configuration(config.to_configuration())
            .storage(config.storage_config())
            .retry(config.retry_config())
            .client(config.client_config());
        if let Some(retention) = config.retention() {
            builder = builder.retention(retention);
        }

        let tracker = builder.build().await.context("Failed to start tracker")?;
        Ok(Self { tracker })
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Send { params, screen } => {
                for (key, value) in &params {
                    self.tracker.set_param(key, value.as_str());
                }
                if let Some(name) = screen {
                    self.tracker.add_event(BasicEvent::screen(&name));
                }
                let report = self.tracker.dispatch().await?;
                println!(
                    "hits={} delivered={} stored={} failed={}",
                    report.hits, report.delivered, report.stored, report.failed
                );
            }
            Command::Flush => {
                let report = self.tracker.offline().dispatch().await;
                println!(
                    "delivered={} failed={} remaining={}",
                    report.delivered, report.failed, report.remaining
                );
            }
            Command::Count => println!("{}", self.tracker.offline().count()),
            Command::List => {
                for hit in self.tracker.offline().get() {
                    println!("{}\tretry={}\t{}", hit.created_at.to_rfc3339(), hit.retry_count, hit.url);
                }
            }
            Command::Purge { older_than_days } => {
                let offline = self.tracker.offline();
                let removed = match older_than_days {
                    Some(days) => offline.delete_older_than_days(days),
                    None => offline.delete(),
                };
                anyhow::ensure!(removed >= 0, "Offline storage failed while purging");
                println!("{removed}");
            }
        }
        Ok(())
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = cli.config.resolve()?;

    if let Err(e) = setup_logging_safe(config.log_level, config.log_format) {
        eprintln!("Warning: {e}");
    }
    info!("Starting hit-tracker v{}", get_version());

    let app = App::from_config(&config).await?;
    app.run(cli.command).await?;
    app.tracker().wait_idle().await?;
    Ok(())
}
