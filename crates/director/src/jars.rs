//! Classpath assembly for submitted jobs.

use std::path::{Path, PathBuf};

use fdp_common::ResourceError;
use tracing::debug;

/// Resolve and deduplicate the jars shipped with one run.
///
/// Inputs are taken in order: mandatory infrastructure jars, the director's
/// include list, then per-job jars. Absolute paths must exist as given;
/// relative paths are matched by filename against the search directories.
/// The output order is the first-occurrence order of the inputs, so the
/// same inputs always produce the same list.
pub fn assemble_jar_list(
    mandatory: &[PathBuf],
    include: &[PathBuf],
    job_jars: &[PathBuf],
    search_dirs: &[PathBuf],
) -> Result<Vec<PathBuf>, ResourceError> {
    let mut resolved: Vec<PathBuf> = Vec::new();
    for jar in mandatory.iter().chain(include).chain(job_jars) {
        let path = resolve_jar(jar, search_dirs)?;
        if !resolved.contains(&path) {
            resolved.push(path);
        }
    }
    debug!(jars = resolved.len(), operator = "JarAssembly", "classpath assembled");
    Ok(resolved)
}

fn resolve_jar(jar: &Path, search_dirs: &[PathBuf]) -> Result<PathBuf, ResourceError> {
    if jar.is_absolute() {
        if jar.is_file() {
            return Ok(jar.to_path_buf());
        }
        return Err(ResourceError::JarNotFound(jar.to_path_buf()));
    }
    for dir in search_dirs {
        let candidate = dir.join(jar);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ResourceError::JarNotFound(jar.to_path_buf()))
}
