//! Download task - synchronizes a single manifest entry
//!
//! A task walks Start -> CheckExisting -> Prepare -> Fetch -> Verify. An
//! existing file with the right checksum is left alone. Anything else is
//! resumed from its current length with a `Range` request. A `416` answer, a
//! partial response starting at the wrong byte, or a checksum mismatch after
//! the transfer deletes the local file and starts the task over, at most
//! `max_restarts` times. Every other failure ends the task. A `416` for a
//! request from byte 0 means the remote file is empty.

use crate::engine::metering_stream::MeteringStream;
use crate::engine::rate_meter::RateMeter;
use crate::engine::verify::{hash_file, verify_file};
use crate::error::SyncError;
use fastsync_types::{ManifestEntry, TaskOutcome};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Collaborators shared by every task of a run
#[derive(Clone, Debug)]
pub struct TaskContext {
    client: Client,
    meter: RateMeter,
    /// Bounds how many tasks may be in Fetch at once
    download_slots: Arc<Semaphore>,
    max_restarts: u32,
}

impl TaskContext {
    pub fn new(
        client: Client,
        meter: RateMeter,
        max_concurrent_downloads: usize,
        max_restarts: u32,
    ) -> Self {
        Self {
            client,
            meter,
            download_slots: Arc::new(Semaphore::new(max_concurrent_downloads)),
            max_restarts,
        }
    }

    /// Download slots not currently held by a transfer
    pub fn available_download_slots(&self) -> usize {
        self.download_slots.available_permits()
    }
}

/// Result of one pass through the state machine
enum Attempt {
    Skipped,
    Downloaded { bytes: u64, resumed_from: u64 },
}

/// Bytes moved by a single Fetch
struct Transfer {
    bytes: u64,
    resumed_from: u64,
}

/// Synchronizes one manifest entry into the local root
#[derive(Debug)]
pub struct DownloadTask {
    entry: ManifestEntry,
    base_url: Url,
    local_root: PathBuf,
    cancel: CancellationToken,
}

impl DownloadTask {
    pub fn new(entry: ManifestEntry, base_url: Url, local_root: PathBuf) -> Self {
        Self {
            entry,
            base_url,
            local_root,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the task's cancellation token, usually with a child of the
    /// session token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn entry(&self) -> &ManifestEntry {
        &self.entry
    }

    /// Token that stops this task at its next request or network read
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the task to a terminal outcome
    pub async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, SyncError> {
        // Start
        let relative = normalize_entry_path(&self.entry.path)?;
        let local_path = self.local_root.join(&relative);
        let url = remote_url(&self.base_url, &relative)?;
        debug!("Resolved {} to {} from {}", self.entry.path, local_path.display(), url);

        let mut restarts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.attempt(ctx, &local_path, &url).await {
                Ok(Attempt::Skipped) => {
                    info!("{} is up to date, skipping", self.entry.path);
                    return Ok(TaskOutcome::Skipped);
                }
                Ok(Attempt::Downloaded {
                    bytes,
                    resumed_from,
                }) => {
                    info!(
                        "{} verified ({} bytes fetched, resumed at {})",
                        self.entry.path, bytes, resumed_from
                    );
                    return Ok(TaskOutcome::Downloaded {
                        bytes,
                        resumed_from,
                        restarts,
                    });
                }
                Err(e) if e.is_corruption() => {
                    remove_if_exists(&local_path).await?;
                    if restarts >= ctx.max_restarts {
                        return Err(SyncError::RetriesExhausted {
                            attempts: restarts + 1,
                            last: Box::new(e),
                        });
                    }
                    restarts += 1;
                    warn!(
                        "{}: {}. Deleted local copy, restarting (attempt {}/{})",
                        self.entry.path,
                        e,
                        restarts + 1,
                        ctx.max_restarts + 1
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &TaskContext,
        local_path: &Path,
        url: &Url,
    ) -> Result<Attempt, SyncError> {
        // CheckExisting
        match fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => {
                let actual = hash_file(local_path).await?;
                if actual == self.entry.checksum {
                    return Ok(Attempt::Skipped);
                }
                debug!(
                    "{}: local checksum {} differs, resuming from {} bytes",
                    self.entry.path,
                    actual,
                    meta.len()
                );
            }
            // Not a regular file: opening it below reports the problem
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Prepare
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(local_path)
            .await?;
        let offset = file.metadata().await?.len();

        // Fetch
        let transfer = self.fetch(ctx, &mut file, url, offset).await?;
        drop(file);

        // Verify
        verify_file(local_path, &self.entry.checksum).await?;

        Ok(Attempt::Downloaded {
            bytes: transfer.bytes,
            resumed_from: transfer.resumed_from,
        })
    }

    async fn fetch(
        &self,
        ctx: &TaskContext,
        file: &mut File,
        url: &Url,
        offset: u64,
    ) -> Result<Transfer, SyncError> {
        let _slot = tokio::select! {
            slot = ctx.download_slots.acquire() => slot.map_err(|_| SyncError::Cancelled)?,
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
        };

        debug!("GET {} (Range: bytes={}-)", url, offset);
        let request = ctx
            .client
            .get(url.clone())
            .header(RANGE, format!("bytes={}-", offset));
        let response = tokio::select! {
            response = request.send() => response?,
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
        };

        let resumed_from = match response.status() {
            StatusCode::PARTIAL_CONTENT => match content_range_start(response.headers()) {
                Some(start) if start != offset => {
                    return Err(SyncError::UnexpectedRange {
                        expected: offset,
                        actual: start,
                    });
                }
                _ => offset,
            },
            StatusCode::OK => {
                if offset > 0 {
                    // Full body despite the range: drop the stale prefix
                    warn!("{}: server ignored range request, refetching whole file", self.entry.path);
                    file.set_len(0).await?;
                }
                0
            }
            // An empty resource has no satisfiable range at all; Verify
            // decides whether the empty local file is the right content
            StatusCode::RANGE_NOT_SATISFIABLE if offset == 0 => {
                debug!("{}: remote file is empty", self.entry.path);
                return Ok(Transfer {
                    bytes: 0,
                    resumed_from: 0,
                });
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Err(SyncError::RangeNotSatisfiable { offset });
            }
            status => {
                return Err(SyncError::ServerError {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
        };

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        let mut reader = MeteringStream::new(StreamReader::new(Box::pin(body)), ctx.meter.clone());
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        loop {
            let n = tokio::select! {
                read = reader.read(&mut buf) => read.map_err(SyncError::Stream)?,
                _ = self.cancel.cancelled() => {
                    file.flush().await?;
                    return Err(SyncError::Cancelled);
                }
            };
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok(Transfer {
            bytes: reader.total(),
            resumed_from,
        })
    }
}

/// Clean a manifest path into a relative path of plain components.
///
/// Leading separators are ignored so `/mods/a.pbo` and `mods/a.pbo` are the
/// same entry. Anything that normalizes to the root itself or climbs out of
/// it is rejected.
pub fn normalize_entry_path(path: &str) -> Result<PathBuf, SyncError> {
    let cleaned = path_clean::clean(path.trim_start_matches('/'));

    let mut components = cleaned.components().peekable();
    let proper = components.peek().is_some()
        && components.all(|c| matches!(c, Component::Normal(_)));
    if !proper {
        return Err(SyncError::PathEscapesRoot(path.to_string()));
    }

    Ok(cleaned)
}

/// Append the components of a normalized relative path to the server base URL
pub fn remote_url(base: &Url, relative: &Path) -> Result<Url, SyncError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SyncError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        );
    Ok(url)
}

/// First byte position of a `Content-Range: bytes <start>-<end>/<len>` header
fn content_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let range = value.trim().strip_prefix("bytes ")?;
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}

async fn remove_if_exists(path: &Path) -> Result<(), SyncError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_leading_slash_and_dots() {
        assert_eq!(
            normalize_entry_path("/mods/./a.pbo").unwrap(),
            PathBuf::from("mods/a.pbo")
        );
        assert_eq!(
            normalize_entry_path("mods/x/../a.pbo").unwrap(),
            PathBuf::from("mods/a.pbo")
        );
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        for path in ["../a", "/../../etc/passwd", "mods/../../a", "/", "", ".", "mods/.."] {
            assert!(
                matches!(normalize_entry_path(path), Err(SyncError::PathEscapesRoot(_))),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_remote_url_joins_segments() {
        let base = Url::parse("http://x/").unwrap();
        let url = remote_url(&base, Path::new("mods/a.pbo")).unwrap();
        assert_eq!(url.as_str(), "http://x/mods/a.pbo");

        let base = Url::parse("http://x/repo/").unwrap();
        let url = remote_url(&base, Path::new("mods/a b.pbo")).unwrap();
        assert_eq!(url.as_str(), "http://x/repo/mods/a%20b.pbo");

        let base = Url::parse("http://x/repo").unwrap();
        let url = remote_url(&base, Path::new("a.pbo")).unwrap();
        assert_eq!(url.as_str(), "http://x/repo/a.pbo");
    }

    #[test]
    fn test_content_range_start() {
        use reqwest::header::HeaderValue;

        let mut headers = HeaderMap::new();
        assert_eq!(content_range_start(&headers), None);

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 2-4/5"));
        assert_eq!(content_range_start(&headers), Some(2));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */5"));
        assert_eq!(content_range_start(&headers), None);
    }

    #[test]
    fn test_remote_url_rejects_opaque_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(matches!(
            remote_url(&base, Path::new("a")),
            Err(SyncError::InvalidUrl(_))
        ));
    }
}
