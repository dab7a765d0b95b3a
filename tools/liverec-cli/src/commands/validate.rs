//! Validate a fleet configuration file.

use std::path::PathBuf;

use liverec_common::config::{Credentials, FleetConfig};

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration at: {}", path.display());

    let config =
        FleetConfig::load(&path).map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    println!("  Channels: {}", config.channels.len());
    for channel in &config.channels {
        println!("    - {} ({})", channel.name, channel.channel_id);
    }
    let settings = &config.settings;
    println!("  Output: {}", settings.output_dir.display());
    println!("  Quality: {}", settings.quality);
    println!("  Interval: {}s", settings.poll_interval_secs);
    match &settings.credentials {
        Some(Credentials::CookieFile(path)) => println!("  Cookies: {}", path.display()),
        Some(Credentials::Browser(browser)) => println!("  Cookies: from {browser}"),
        None => println!("  Cookies: none"),
    }

    match config.validate() {
        Ok(()) => {
            println!("\nConfiguration is valid.");
            Ok(())
        }
        Err(e) => {
            println!("\nValidation failed:");
            println!("  - {e}");
            Err(e.into())
        }
    }
}
