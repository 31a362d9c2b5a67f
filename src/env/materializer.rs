//! Namespace file materialization.
//!
//! # Responsibilities
//! - Render a snapshot as `key=value` lines
//! - Replace a namespace file so readers see the old or the new content
//!
//! # Design Decisions
//! - Write to a temp file in the target directory, then rename over the target
//! - A failed write leaves the previous file untouched
//! - Synchronizers write through `materialize_async`, which runs the fsync and
//!   rename on the blocking pool

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::client::ConfigSnapshot;
use crate::observability::metrics;

const NAMESPACE_FILE_PREFIX: &str = "apollo.config.";
const TEMP_PREFIX: &str = ".lapollo-";

#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Errors writing materialized files.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("namespace write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl MaterializeError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        MaterializeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// `{directory}/apollo.config.{namespace}`
pub fn namespace_file(directory: &Path, namespace: &str) -> PathBuf {
    directory.join(format!("{}{}", NAMESPACE_FILE_PREFIX, namespace))
}

/// Canonical text for a snapshot.
pub fn render(snapshot: &ConfigSnapshot) -> String {
    let mut out = String::new();
    for (key, value) in snapshot {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Replace the namespace file with the rendered snapshot.
pub fn materialize(
    directory: &Path,
    namespace: &str,
    snapshot: &ConfigSnapshot,
) -> Result<PathBuf, MaterializeError> {
    let path = namespace_file(directory, namespace);
    let result = write_atomic(&path, render(snapshot).as_bytes());
    metrics::record_materialize(result.is_ok());
    result?;
    tracing::debug!(path = %path.display(), keys = snapshot.len(), "Namespace file written");
    Ok(path)
}

/// [`materialize`] on the blocking pool, for callers on the runtime.
pub async fn materialize_async(
    directory: PathBuf,
    namespace: String,
    snapshot: ConfigSnapshot,
) -> Result<PathBuf, MaterializeError> {
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| materialize(&directory, &namespace, &snapshot))
    })
    .await?
}

/// Create or truncate the namespace file to empty content at task start.
pub fn initialize(directory: &Path, namespace: &str) -> Result<PathBuf, MaterializeError> {
    fs::create_dir_all(directory).map_err(|e| MaterializeError::io(directory, e))?;
    let path = namespace_file(directory, namespace);
    write_atomic(&path, &[])?;
    Ok(path)
}

/// Write `contents` to `path` through a temp file and rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), MaterializeError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| MaterializeError::io(path, e))?;
    temp.write_all(contents).map_err(|e| MaterializeError::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| MaterializeError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(FILE_MODE))
            .map_err(|e| MaterializeError::io(path, e))?;
    }

    temp.persist(path).map_err(|e| MaterializeError::io(path, e.error))?;
    Ok(())
}
