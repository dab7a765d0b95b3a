//! Free disk space queries.

use std::io;
use std::path::Path;

/// Reports free space available to unprivileged writers.
pub trait DiskSpace: Send + Sync {
    fn available_bytes(&self, dir: &Path) -> io::Result<u64>;
}

/// Queries the filesystem with `statvfs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsDiskSpace;

impl DiskSpace for StatvfsDiskSpace {
    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn available_bytes(&self, dir: &Path) -> io::Result<u64> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let path = CString::new(dir.as_os_str().as_bytes())?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space query is not supported on this platform",
        ))
    }
}

/// Always reports the same amount of free space.
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskSpace(pub u64);

impl DiskSpace for FixedDiskSpace {
    fn available_bytes(&self, _dir: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

/// Convert bytes to whole mebibytes, rounding down.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}
