//! Effective environment rebuild and process manager reload.
//!
//! # Responsibilities
//! - Concatenate an application's namespace files in configured order
//! - Atomically replace the application's environment file
//! - Ask the process manager to reload, tolerating its absence
//!
//! # Design Decisions
//! - One lock per application directory, held across read, merge, write
//!   and the reload command
//! - Namespace files are always re-read; the caller's event says nothing
//!   about which namespace changed
//! - An unchanged merge result skips both the write and the reload

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::config::ReloadConfig;
use crate::env::materializer::{namespace_file, write_atomic, MaterializeError};
use crate::observability::metrics;
use crate::sync::AppTarget;

/// Errors rebuilding the environment or reloading the managed process.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] MaterializeError),

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// What the process manager did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    /// No process manager on this host.
    Unavailable,
}

/// Result of one `Reloader::reload` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReport {
    /// The merged environment equals the current file.
    Unchanged,
    Written(ReloadOutcome),
}

/// External process manager that picks up the new environment.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn reload(&self) -> Result<ReloadOutcome, ReloadError>;
}

/// Runs `supervisorctl reload` (or the configured command) when the
/// supervisor control socket exists.
#[derive(Debug, Clone)]
pub struct Supervisorctl {
    command: String,
    args: Vec<String>,
    socket_path: PathBuf,
}

impl Supervisorctl {
    pub fn new(config: &ReloadConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            socket_path: config.socket_path.clone(),
        }
    }
}

#[async_trait]
impl ProcessManager for Supervisorctl {
    async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        if !tokio::fs::try_exists(&self.socket_path).await.unwrap_or(false) {
            tracing::info!(
                socket = %self.socket_path.display(),
                "No process manager on this host, skipping reload"
            );
            return Ok(ReloadOutcome::Unavailable);
        }

        let output = Command::new(&self.command)
            .args(&self.args)
            .output()
            .await
            .map_err(|source| ReloadError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ReloadError::CommandFailed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(command = %self.command, "Process manager reloaded");
        Ok(ReloadOutcome::Reloaded)
    }
}

/// Rebuilds effective environment files, one application at a time.
pub struct Reloader {
    manager: Arc<dyn ProcessManager>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Reloader {
    pub fn new(manager: Arc<dyn ProcessManager>) -> Self {
        Self {
            manager,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, directory: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(directory.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Rebuild `app`'s environment file and notify the process manager.
    pub async fn reload(&self, app: &AppTarget) -> Result<ReloadReport, ReloadError> {
        let lock = self.lock_for(&app.directory);
        let _guard = lock.lock().await;

        let merged = merge(&app.directory, &app.namespaces)?;
        if read_optional(&app.env_file)?.as_deref() == Some(merged.as_slice()) {
            tracing::debug!(app_id = %app.app_id, "Environment unchanged");
            return Ok(ReloadReport::Unchanged);
        }

        write_atomic(&app.env_file, &merged)?;
        tracing::info!(
            app_id = %app.app_id,
            env_file = %app.env_file.display(),
            bytes = merged.len(),
            "Environment file updated"
        );

        let result = self.manager.reload().await;
        let outcome = match &result {
            Ok(ReloadOutcome::Reloaded) => "reloaded",
            Ok(ReloadOutcome::Unavailable) => "unavailable",
            Err(_) => "failed",
        };
        metrics::record_reload(outcome);

        result.map(ReloadReport::Written)
    }
}

/// Concatenation of the namespace files in list order. Missing files
/// contribute nothing.
pub fn merge(directory: &Path, namespaces: &[String]) -> Result<Vec<u8>, ReloadError> {
    let mut contents = Vec::new();
    for namespace in namespaces {
        if let Some(bytes) = read_optional(&namespace_file(directory, namespace))? {
            contents.extend_from_slice(&bytes);
        }
    }
    Ok(contents)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ReloadError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ReloadError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::materializer::materialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn app(dir: &Path, namespaces: &[&str]) -> AppTarget {
        AppTarget {
            app_id: "shop".into(),
            directory: dir.to_path_buf(),
            env_file: dir.join(".env"),
            namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn write(dir: &Path, namespace: &str, pairs: &[(&str, &str)]) {
        let snapshot = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        materialize(dir, namespace, &snapshot).unwrap();
    }

    #[derive(Default)]
    struct CountingManager {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProcessManager for CountingManager {
        async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ReloadOutcome::Reloaded)
        }
    }

    #[tokio::test]
    async fn test_merge_follows_namespace_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ns2", &[("b", "2")]);
        write(dir.path(), "ns1", &[("a", "1")]);

        let manager = Arc::new(CountingManager::default());
        let reloader = Reloader::new(manager.clone());
        let report = reloader.reload(&app(dir.path(), &["ns1", "ns2", "missing"])).await.unwrap();

        assert_eq!(report, ReloadReport::Written(ReloadOutcome::Reloaded));
        assert_eq!(std::fs::read_to_string(dir.path().join(".env")).unwrap(), "a=1\nb=2\n");
        assert_eq!(manager.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unchanged_environment_skips_reload() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ns1", &[("a", "1")]);

        let manager = Arc::new(CountingManager::default());
        let reloader = Reloader::new(manager.clone());
        let target = app(dir.path(), &["ns1"]);

        reloader.reload(&target).await.unwrap();
        write(dir.path(), "ns1", &[("a", "1")]);
        assert_eq!(reloader.reload(&target).await.unwrap(), ReloadReport::Unchanged);
        assert_eq!(manager.calls.load(Ordering::SeqCst), 1);
    }

    /// Changes a namespace file from inside the critical section so every
    /// queued reload sees new content, and records overlapping calls.
    struct OverlapProbe {
        directory: PathBuf,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProcessManager for OverlapProbe {
        async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            write(&self.directory, "ns1", &[("n", &n.to_string())]);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ReloadOutcome::Reloaded)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_reload_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ns1", &[("n", "start")]);

        let probe = Arc::new(OverlapProbe {
            directory: dir.path().to_path_buf(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });
        let reloader = Arc::new(Reloader::new(probe.clone()));
        let target = app(dir.path(), &["ns1"]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reloader = reloader.clone();
                let target = target.clone();
                tokio::spawn(async move { reloader.reload(&target).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(probe.calls.load(Ordering::SeqCst), 8);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supervisorctl_without_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Supervisorctl::new(&ReloadConfig {
            socket_path: dir.path().join("supervisor.sock"),
            command: "definitely-not-a-real-command".into(),
            ..ReloadConfig::default()
        });
        assert_eq!(manager.reload().await.unwrap(), ReloadOutcome::Unavailable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervisorctl_reports_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("supervisor.sock");
        std::fs::write(&socket, b"").unwrap();

        let failing = Supervisorctl::new(&ReloadConfig {
            socket_path: socket.clone(),
            command: "false".into(),
            args: vec![],
            ..ReloadConfig::default()
        });
        assert!(matches!(failing.reload().await, Err(ReloadError::CommandFailed { .. })));

        let ok = Supervisorctl::new(&ReloadConfig {
            socket_path: socket,
            command: "true".into(),
            args: vec![],
            ..ReloadConfig::default()
        });
        assert_eq!(ok.reload().await.unwrap(), ReloadOutcome::Reloaded);
    }
}
