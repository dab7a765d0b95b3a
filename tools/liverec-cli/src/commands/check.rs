//! Check that recording will work on this machine.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use liverec_capture_engine::disk::{bytes_to_mb, DiskSpace, StatvfsDiskSpace};
use liverec_capture_engine::YtDlpEngine;
use liverec_common::config::Settings;

/// Something liverec may need.
#[derive(Debug, Clone)]
struct Capability {
    name: String,
    description: String,
    available: bool,
    required: bool,
    fix_instructions: Option<String>,
}

pub async fn run(output: PathBuf) -> anyhow::Result<()> {
    println!("liverec System Check");
    println!("{}", "=".repeat(50));

    let capabilities = vec![
        check_engine().await,
        check_ffmpeg().await,
        check_output_dir(&output),
    ];

    print_capability_report(&capabilities);

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. liverec is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}

async fn check_engine() -> Capability {
    let version = YtDlpEngine::new().version().await;

    Capability {
        name: "yt-dlp".to_string(),
        description: match &version {
            Ok(v) => format!("stream downloader, version {v}"),
            Err(_) => "stream downloader".to_string(),
        },
        available: version.is_ok(),
        required: true,
        fix_instructions: version.err().map(|e| format!("{e}. Install it: pip install -U yt-dlp")),
    }
}

async fn check_ffmpeg() -> Capability {
    let available = tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    Capability {
        name: "ffmpeg".to_string(),
        description: "used by yt-dlp to mux separate audio and video streams".to_string(),
        available,
        required: false,
        fix_instructions: if !available {
            Some("Install ffmpeg: sudo apt install ffmpeg".to_string())
        } else {
            None
        },
    }
}

fn check_output_dir(output: &Path) -> Capability {
    let settings = Settings {
        output_dir: output.to_path_buf(),
        ..Settings::default()
    };

    let name = format!("Output directory {}", output.display());
    if let Err(e) = settings.ensure_output_dir() {
        return Capability {
            name,
            description: "recordings are written here".to_string(),
            available: false,
            required: true,
            fix_instructions: Some(e.to_string()),
        };
    }

    match StatvfsDiskSpace.available_bytes(output) {
        Ok(bytes) => {
            let free_mb = bytes_to_mb(bytes);
            let available = free_mb >= settings.min_free_space_mb;
            Capability {
                name,
                description: format!("{free_mb} MB free"),
                available,
                required: true,
                fix_instructions: if !available {
                    Some(format!(
                        "Free up space: at least {} MB is needed to start a recording",
                        settings.min_free_space_mb
                    ))
                } else {
                    None
                },
            }
        }
        Err(e) => Capability {
            name,
            description: format!("writable, free space unknown ({e})"),
            available: true,
            required: true,
            fix_instructions: None,
        },
    }
}

fn print_capability_report(capabilities: &[Capability]) {
    println!("liverec Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}
