//! Watch channels and record every live broadcast.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use liverec_common::config::{Credentials, FleetConfig};
use liverec_monitor::{cancel_on_shutdown, FleetSupervisor, StopCause, YtDlpProbe};
use tokio_util::sync::CancellationToken;

pub async fn run(
    config_path: PathBuf,
    interval: Option<u64>,
    credentials: Option<Credentials>,
) -> anyhow::Result<()> {
    let mut config = FleetConfig::load(&config_path)?;
    if let Some(interval) = interval {
        config.settings.poll_interval_secs = interval;
    }
    if credentials.is_some() {
        config.settings.credentials = credentials;
    }
    config.validate()?;
    config.settings.ensure_output_dir()?;

    println!("Monitoring {} channel(s):", config.channels.len());
    for channel in &config.channels {
        println!("  - {} ({})", channel.name, channel.channel_id);
    }
    println!("  Output: {}", config.settings.output_dir.display());
    println!("  Interval: {}s", config.settings.poll_interval_secs);
    println!();
    println!("Press Ctrl+C to stop monitoring...");
    println!();

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone())?;

    let probe = Arc::new(YtDlpProbe::new(config.settings.credentials.clone()));
    let fleet = FleetSupervisor::new(probe, super::ytdlp_session(&config.settings));
    let report = fleet
        .run(&config.channels, &config.settings, cancel)
        .await?;

    println!();
    println!("Monitoring stopped.");
    for monitor in &report.monitors {
        println!(
            "  {}: {} ({} polls, {} recordings)",
            monitor.channel, monitor.cause, monitor.polls, monitor.recordings
        );
    }

    if report
        .monitors
        .iter()
        .all(|m| matches!(m.cause, StopCause::GaveUp { .. }))
    {
        bail!("Every channel stopped on an error");
    }
    Ok(())
}
