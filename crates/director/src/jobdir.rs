//! Per-run job directories.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fdp_common::ResourceError;
use rand::Rng;
use tracing::debug;

/// Directories are never cleaned up automatically; a run's artifacts stay
/// inspectable after it ends.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Create a fresh job directory under `base`.
///
/// The name is a random 31-bit number; collisions with leftover directories
/// from earlier runs retry with a new name.
pub fn create_job_directory(base: &Path) -> Result<PathBuf, ResourceError> {
    fs::create_dir_all(base).map_err(|e| ResourceError::DirectoryCreateFailed {
        path: base.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut rng = rand::rng();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let name = rng.random::<u32>() & 0x7fff_ffff;
        let path = base.join(name.to_string());
        match fs::create_dir(&path) {
            Ok(()) => {
                debug!(dir = %path.display(), operator = "JobDirectory", "created");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ResourceError::DirectoryCreateFailed {
                    path,
                    reason: e.to_string(),
                })
            }
        }
    }
    Err(ResourceError::DirectoryCreateFailed {
        path: base.to_path_buf(),
        reason: format!("no unused name after {MAX_NAME_ATTEMPTS} attempts"),
    })
}

/// Default base directory for job directories: the user's home, falling
/// back to the system temp directory.
pub fn default_base_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .unwrap_or_else(std::env::temp_dir)
        .join(".fdp")
        .join("jobs")
}
