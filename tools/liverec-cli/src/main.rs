//! liverec CLI: record live streams once, or watch channels and record
//! every broadcast.
//!
//! Usage:
//!   liverec record <URL> [OPTIONS]     Record one live stream
//!   liverec monitor -c <CONFIG>        Watch up to five channels
//!   liverec validate <CONFIG>          Validate a fleet configuration
//!   liverec check                      Check that recording will work

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use liverec_common::config::{Credentials, FleetConfig, LoggingConfig, Quality};

mod commands;

#[derive(Parser)]
#[command(
    name = "liverec",
    about = "Record live streams, once or by watching channels",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Cookie options shared by the recording commands.
#[derive(Args, Debug, Clone, Default)]
struct CookieArgs {
    /// Netscape-format cookies file for members-only or age-restricted streams
    #[arg(long, conflicts_with = "cookies_from_browser")]
    cookies: Option<PathBuf>,

    /// Browser to read cookies from (e.g. firefox, chrome)
    #[arg(long)]
    cookies_from_browser: Option<String>,
}

impl CookieArgs {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.cookies, &self.cookies_from_browser) {
            (Some(path), _) => Some(Credentials::CookieFile(path.clone())),
            (None, Some(browser)) => Some(Credentials::Browser(browser.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record one live stream until it ends, the time limit passes, or Ctrl+C
    Record {
        /// Stream URL, video id or channel id
        url: String,

        /// Output directory
        #[arg(short, long, default_value = "./recordings")]
        output: PathBuf,

        /// Stop after this many seconds
        #[arg(short = 't', long = "time", value_parser = clap::value_parser!(u64).range(1..))]
        time: Option<u64>,

        /// Quality: best, 1080p, 720p, 480p or 360p
        #[arg(short, long, default_value = "best")]
        quality: Quality,

        /// Name used for the output file (defaults to the channel name)
        #[arg(long)]
        name: Option<String>,

        /// Start recording without checking that the stream is live
        #[arg(long)]
        skip_live_check: bool,

        #[command(flatten)]
        cookies: CookieArgs,
    },

    /// Watch the channels in a configuration file and record every broadcast
    Monitor {
        /// Fleet configuration (.toml or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Polling interval in seconds (overrides the configuration)
        #[arg(long, value_parser = clap::value_parser!(u64).range(10..))]
        interval: Option<u64>,

        #[command(flatten)]
        cookies: CookieArgs,
    },

    /// Validate a fleet configuration file
    Validate {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Check that the engine and output directory are usable
    Check {
        /// Output directory to check
        #[arg(short, long, default_value = "./recordings")]
        output: PathBuf,
    },
}

/// Logging settings: the fleet configuration's `[logging]` section when
/// monitoring, overridden by command-line flags.
fn logging_config(cli: &Cli) -> LoggingConfig {
    let mut logging = match &cli.command {
        Commands::Monitor { config, .. } => FleetConfig::load(config)
            .map(|c| c.logging)
            .unwrap_or_default(),
        _ => LoggingConfig::default(),
    };

    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    if let Some(file) = &cli.log_file {
        logging.file = Some(file.clone());
    }
    logging
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    liverec_common::logging::init_logging(&logging_config(&cli));

    match cli.command {
        Commands::Record {
            url,
            output,
            time,
            quality,
            name,
            skip_live_check,
            cookies,
        } => {
            commands::record::run(commands::record::RecordArgs {
                url,
                output,
                duration_secs: time,
                quality,
                name,
                skip_live_check,
                credentials: cookies.credentials(),
            })
            .await
        }
        Commands::Monitor {
            config,
            interval,
            cookies,
        } => commands::monitor::run(config, interval, cookies.credentials()).await,
        Commands::Validate { config } => commands::validate::run(config),
        Commands::Check { output } => commands::check::run(output).await,
    }
}
