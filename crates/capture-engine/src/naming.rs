//! Output file naming.
//!
//! Final files are `{name}_{YYYYMMDD}_{HHMMSS}.{ext}`. While a capture is in
//! progress the engine writes to a hidden sibling `.{final}.tmp` in the same
//! directory, so promotion never crosses filesystems. Neither reserving a name
//! nor promoting into it ever replaces an existing file.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use liverec_common::clock::RecordingClock;
pub use liverec_common::config::sanitize_name;

/// Path of the in-progress file for a final target.
pub fn temp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{file_name}.tmp"))
}

/// `target` with `_{n}` inserted before the extension.
fn suffixed(target: &Path, n: u32) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match target.extension() {
        Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{n}"),
    };
    target.with_file_name(file_name)
}

/// Pick a final path in `dir` and reserve it by creating its empty temp file.
///
/// A name is free when neither the final file nor its temp file exists. The
/// temp file is created with `create_new`, so two callers racing for the same
/// second never get the same path. Collisions get `_1`, `_2`, ... before the
/// extension.
pub fn reserve_target_path(
    dir: &Path,
    name: &str,
    clock: &RecordingClock,
    ext: &str,
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let base = dir.join(format!("{}_{}.{ext}", sanitize_name(name), clock.file_stamp()));

    let mut suffix = 0u32;
    loop {
        let candidate = if suffix == 0 {
            base.clone()
        } else {
            suffixed(&base, suffix)
        };

        if !candidate.exists() {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(temp_path_for(&candidate))
            {
                Ok(_) => {
                    if suffix > 0 {
                        tracing::debug!(path = %candidate.display(), "Output name collided, using suffix");
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        suffix += 1;
    }
}

/// Move `temp` to `target` without ever replacing an existing file.
///
/// If `target` is already taken the next free `_N` sibling is used instead.
/// Returns the path the output ended up at.
pub fn promote(temp: &Path, target: &Path) -> io::Result<PathBuf> {
    let mut candidate = target.to_path_buf();
    let mut suffix = 0u32;
    loop {
        match std::fs::hard_link(temp, &candidate) {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(temp) {
                    tracing::warn!(temp = %temp.display(), "Failed to remove temp file: {e}");
                }
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
            // No hard links on this filesystem.
            Err(_) if !candidate.exists() => {
                std::fs::rename(temp, &candidate)?;
                break;
            }
            Err(_) => {}
        }
        suffix += 1;
        candidate = suffixed(target, suffix);
    }

    if suffix > 0 {
        tracing::warn!(
            wanted = %target.display(),
            path = %candidate.display(),
            "Output path already existed, kept both files"
        );
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("liverec-naming-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn clock() -> RecordingClock {
        RecordingClock::from_start(Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let target = Path::new("/rec/lofi_20240102_030405.mp4");
        assert_eq!(
            temp_path_for(target),
            PathBuf::from("/rec/.lofi_20240102_030405.mp4.tmp")
        );
    }

    #[test]
    fn test_reserve_target_path_suffixes_collisions() {
        let dir = scratch("collide");
        let first = reserve_target_path(&dir, "Lofi Girl", &clock(), "mp4").unwrap();
        assert_eq!(first, dir.join("Lofi Girl_20240102_030405.mp4"));
        assert!(temp_path_for(&first).exists());

        // The reservation alone keeps the name taken.
        let second = reserve_target_path(&dir, "Lofi Girl", &clock(), "mp4").unwrap();
        assert_eq!(second, dir.join("Lofi Girl_20240102_030405_1.mp4"));

        std::fs::remove_file(temp_path_for(&second)).unwrap();
        std::fs::write(&second, b"done").unwrap();
        let third = reserve_target_path(&dir, "Lofi Girl", &clock(), "mp4").unwrap();
        assert_eq!(third, dir.join("Lofi Girl_20240102_030405_2.mp4"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_names_that_sanitize_alike_get_distinct_paths() {
        let dir = scratch("alike");
        let a = reserve_target_path(&dir, "a/b", &clock(), "mp4").unwrap();
        let b = reserve_target_path(&dir, "a_b", &clock(), "mp4").unwrap();
        assert_eq!(a, dir.join("a_b_20240102_030405.mp4"));
        assert_eq!(b, dir.join("a_b_20240102_030405_1.mp4"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_concurrent_reservations_are_distinct() {
        let dir = scratch("race");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    reserve_target_path(&dir, "news", &clock(), "mp4").unwrap()
                })
            })
            .collect();
        let mut paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_promote_moves_temp_into_place() {
        let dir = scratch("promote");
        let target = dir.join("a_20240102_030405.mp4");
        let temp = temp_path_for(&target);
        std::fs::write(&temp, b"video").unwrap();

        assert_eq!(promote(&temp, &target).unwrap(), target);
        assert_eq!(std::fs::read(&target).unwrap(), b"video");
        assert!(!temp.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_promote_never_replaces_existing_file() {
        let dir = scratch("no-replace");
        let target = dir.join("a_20240102_030405.mp4");
        std::fs::write(&target, b"first").unwrap();
        let temp = temp_path_for(&target);
        std::fs::write(&temp, b"second").unwrap();

        let moved = promote(&temp, &target).unwrap();
        assert_eq!(moved, dir.join("a_20240102_030405_1.mp4"));
        assert_eq!(std::fs::read(&target).unwrap(), b"first");
        assert_eq!(std::fs::read(&moved).unwrap(), b"second");
        assert!(!temp.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_promote_missing_temp_is_an_error() {
        let dir = scratch("missing");
        let target = dir.join("a_20240102_030405.mp4");
        let err = promote(&temp_path_for(&target), &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!target.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
