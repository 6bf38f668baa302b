use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::browser::poll::{self, PollError, Poller};
use crate::error::{PipelineError, PipelineResult};
use crate::notify::StatusNotifier;
use crate::telemetry::metrics::DOWNLOAD_WAIT_DURATION;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(2);

/// Suffixes browsers give files that are still being written.
const IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".part", ".download", ".tmp"];
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "xlsx", "txt", "csv", "html"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub is_file: bool,
}

#[async_trait::async_trait]
pub trait FileSystem: Send + Sync {
    async fn list(&self, directory: &Path) -> io::Result<Vec<FileEntry>>;

    async fn size(&self, path: &Path) -> io::Result<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait::async_trait]
impl FileSystem for LocalFileSystem {
    async fn list(&self, directory: &Path) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(directory).await?;
        while let Some(entry) = dir.next_entry().await? {
            // Entries can vanish between listing and stat.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            entries.push(FileEntry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified_at: DateTime::<Utc>::from(modified),
                is_file: metadata.is_file(),
            });
        }
        Ok(entries)
    }

    async fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// A completed export found in the download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_in_progress(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IN_PROGRESS_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn has_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Newest regular file modified strictly after `triggered_at`.
/// Equal modification times fall back to the larger name.
fn newest_candidate(entries: Vec<FileEntry>, triggered_at: DateTime<Utc>) -> Option<FileEntry> {
    entries
        .into_iter()
        .filter(|e| e.is_file && e.modified_at > triggered_at)
        .filter(|e| !is_hidden(&e.name) && !is_in_progress(&e.name))
        .max_by(|a, b| {
            a.modified_at
                .cmp(&b.modified_at)
                .then_with(|| a.name.cmp(&b.name))
        })
}

/// Watches a directory for the export that a click just triggered.
#[derive(Clone)]
pub struct DownloadWatcher {
    fs: Arc<dyn FileSystem>,
    notifier: StatusNotifier,
    poll_interval: Duration,
    settle_interval: Duration,
}

impl DownloadWatcher {
    pub fn new(fs: Arc<dyn FileSystem>, notifier: StatusNotifier) -> Self {
        Self {
            fs,
            notifier,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, settle_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.settle_interval = settle_interval;
        self
    }

    #[tracing::instrument(
        name = "pipeline_stage download",
        skip(self, cancel),
        fields(
            pipeline.stage = "download",
            download.dir = %directory.display(),
            download.file,
        )
    )]
    pub async fn wait_for_download(
        &self,
        directory: &Path,
        triggered_at: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> PipelineResult<DownloadedArtifact> {
        self.notifier
            .notify(format!("Monitoring download folder: {}", directory.display()));
        let started = std::time::Instant::now();

        let result = Poller::new(self.poll_interval, timeout)
            .until(cancel, || async move {
                self.probe(directory, triggered_at, cancel).await
            })
            .await;

        DOWNLOAD_WAIT_DURATION.record(started.elapsed().as_secs_f64(), &[]);

        match result {
            Ok(artifact) => {
                tracing::Span::current()
                    .record("download.file", tracing::field::display(artifact.path.display()));
                tracing::info!(size = artifact.size, "download complete");
                self.notifier.notify(format!(
                    "File downloaded successfully: {}",
                    file_name(&artifact.path)
                ));
                Ok(artifact)
            }
            Err(PollError::Cancelled) => {
                self.notifier
                    .notify("Download wait interrupted before a file was detected.");
                Err(PipelineError::Cancelled)
            }
            Err(PollError::TimedOut) => {
                tracing::warn!(?timeout, "no completed download detected");
                self.notifier
                    .notify("Download timeout reached. No valid file detected.");
                Err(PipelineError::DownloadTimeout(timeout))
            }
        }
    }

    async fn probe(
        &self,
        directory: &Path,
        triggered_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Option<DownloadedArtifact> {
        let entries = match self.fs.list(directory).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(error = %e, "download directory not readable");
                return None;
            }
        };
        let candidate = newest_candidate(entries, triggered_at)?;
        self.accept(candidate, cancel).await
    }

    async fn accept(
        &self,
        candidate: FileEntry,
        cancel: &CancellationToken,
    ) -> Option<DownloadedArtifact> {
        poll::sleep(self.settle_interval, cancel).await.ok()?;

        let settled = self.fs.size(&candidate.path).await.ok()?;
        if settled != candidate.size {
            tracing::debug!(file = %candidate.name, before = candidate.size, after = settled, "download still growing");
            return None;
        }

        if !has_allowed_extension(&candidate.name) {
            tracing::debug!(file = %candidate.name, "ignoring download with unexpected extension");
            return None;
        }

        Some(DownloadedArtifact {
            path: candidate.path,
            modified_at: candidate.modified_at,
            size: settled,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
