//! Record a single live stream.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use liverec_capture_engine::{CaptureOutcome, SingleShotRunner};
use liverec_common::clock::format_duration;
use liverec_common::config::{Credentials, Quality, Settings};
use liverec_monitor::{cancel_on_shutdown, resolve_target, LivenessProbe, Target, YtDlpProbe};
use tokio_util::sync::CancellationToken;

pub struct RecordArgs {
    pub url: String,
    pub output: PathBuf,
    pub duration_secs: Option<u64>,
    pub quality: Quality,
    pub name: Option<String>,
    pub skip_live_check: bool,
    pub credentials: Option<Credentials>,
}

pub async fn run(args: RecordArgs) -> anyhow::Result<()> {
    let settings = Settings {
        output_dir: args.output,
        quality: args.quality,
        credentials: args.credentials,
        ..Settings::default()
    };
    settings.validate()?;
    settings.ensure_output_dir()?;

    let target = resolve_target(&args.url);
    let mut stream = target.url().to_string();
    let mut name = args.name;

    if args.skip_live_check {
        tracing::info!("Skipping live check");
    } else {
        let probe = YtDlpProbe::new(settings.credentials.clone());
        let status = match &target {
            Target::Channel { id, .. } => probe.check(id).await?,
            _ => probe.probe_video(target.url()).await?,
        };
        if !status.is_live {
            bail!("Stream is not currently live: {}", args.url);
        }
        if let Some(reference) = status.stream_reference {
            stream = reference;
        }
        if let Some(title) = &status.title {
            println!("Live: {title}");
        }
        if name.is_none() {
            name = status.channel_name;
        }
    }
    let name = name.unwrap_or_else(|| target.name_hint().to_string());

    let duration_limit = args.duration_secs.map(Duration::from_secs);

    println!("Recording: {stream}");
    println!("  Output: {}", settings.output_dir.display());
    println!("  Quality: {}", settings.quality);
    if let Some(limit) = duration_limit {
        println!("  Duration limit: {}", format_duration(limit));
    }
    println!();
    println!("Press Ctrl+C to stop recording...");
    println!();

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone())?;

    let runner = SingleShotRunner::new(super::ytdlp_session(&settings));
    let result = runner
        .run(&stream, &name, &settings, duration_limit, cancel)
        .await;

    println!();
    match &result.outcome {
        CaptureOutcome::Failed { kind, reason } => {
            if let Some(partial) = &result.partial_path {
                println!("Partial recording kept at: {}", partial.display());
            }
            bail!("Recording failed ({kind}): {reason}");
        }
        outcome => {
            match &result.final_path {
                Some(path) => println!("Recording saved to: {}", path.display()),
                None => println!("Nothing was recorded."),
            }
            println!("  Outcome: {}", outcome.label());
            println!("  Duration: {}", format_duration(result.elapsed));
            println!("  Size: {:.1} MB", result.bytes_written as f64 / (1024.0 * 1024.0));
        }
    }

    Ok(())
}
