//! Byte transfer to disk: retries with exponential backoff, an overwrite
//! guard, progress bars and bounded-concurrency bulk downloads.

pub mod command;
pub mod release;

use crate::http::{HttpClient, HttpError};
use indicatif::{ProgressBar, ProgressStyle};
use percent_encoding::percent_decode_str;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("File already exists: {0} (use --overwrite to replace it)")]
    AlreadyExists(PathBuf),
    #[error("Refusing to write outside the output directory: {0}")]
    UnsafePath(String),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Download did not run")]
    NotRun,
}

impl DownloadError {
    /// Client errors other than timeouts and rate limits will not change on retry.
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Http(HttpError::Status { status, .. }) => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            DownloadError::Http(_) | DownloadError::Io { .. } => true,
            DownloadError::AlreadyExists(_) | DownloadError::UnsafePath(_) | DownloadError::NotRun => {
                false
            }
        }
    }
}

/// An open response body.
pub struct Body {
    pub reader: Box<dyn Read + Send>,
    pub len: Option<u64>,
}

/// Something that can stream the bytes behind a URL. Implemented by [`HttpClient`].
pub trait ByteSource: Sync {
    fn open(&self, url: &str) -> Result<Body, HttpError>;
}

impl ByteSource for HttpClient {
    fn open(&self, url: &str) -> Result<Body, HttpError> {
        let response = self.get(url)?;
        let len = response.content_length();
        Ok(Body {
            reader: Box::new(response),
            len,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadPolicy {
    /// Total attempts per file, at least one.
    pub retries: u32,
    pub overwrite: bool,
    /// Wait after the n-th failed attempt is `backoff * 2^n`.
    pub backoff: Duration,
    pub concurrency: usize,
    pub show_progress: bool,
}

impl DownloadPolicy {
    /// Wait before retrying after the given failed attempt, saturating on overflow.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            overwrite: false,
            backoff: Duration::from_secs(1),
            concurrency: 4,
            show_progress: true,
        }
    }
}

pub struct Downloader<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    policy: DownloadPolicy,
}

impl<'a, S: ByteSource + ?Sized> Downloader<'a, S> {
    pub fn new(source: &'a S, policy: DownloadPolicy) -> Self {
        Self { source, policy }
    }

    /// Download one file with a byte progress bar. Returns the bytes written.
    pub fn download(&self, job: &DownloadJob) -> Result<u64, DownloadError> {
        let bar = self.policy.show_progress.then(|| {
            let bar = bytes_bar();
            bar.set_message(display_name(&job.destination));
            bar
        });

        let result = self.download_with(job, bar.as_ref());
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result
    }

    /// Download every job, at most `concurrency` at a time. Results are in job order.
    pub fn download_all(&self, jobs: &[DownloadJob]) -> Vec<Result<u64, DownloadError>> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let overall = self.policy.show_progress.then(|| files_bar(jobs.len() as u64));
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Result<u64, DownloadError>>>> =
            Mutex::new((0..jobs.len()).map(|_| None).collect());
        let workers = self.policy.concurrency.clamp(1, jobs.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };

                    let result = self.download_with(job, None);
                    if let Some(bar) = &overall {
                        if let Err(e) = &result {
                            bar.println(format!("  {} {}", display_name(&job.destination), e));
                        }
                        bar.inc(1);
                    }
                    if let Ok(mut slots) = slots.lock() {
                        slots[index] = Some(result);
                    }
                });
            }
        });

        if let Some(bar) = overall {
            bar.finish_and_clear();
        }

        slots
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(DownloadError::NotRun)))
            .collect()
    }

    fn download_with(&self, job: &DownloadJob, bar: Option<&ProgressBar>) -> Result<u64, DownloadError> {
        if !self.policy.overwrite && job.destination.exists() {
            return Err(DownloadError::AlreadyExists(job.destination.clone()));
        }

        let attempts = self.policy.retries.max(1);
        let mut attempt = 1;
        loop {
            match self.transfer(job, bar) {
                Ok(written) => {
                    debug!(url = %job.url, bytes = written, attempt, "Downloaded");
                    return Ok(written);
                }
                Err(e) if attempt < attempts && e.is_retryable() => {
                    let wait = self.policy.backoff_for(attempt);
                    warn!(url = %job.url, attempt, error = %e, ?wait, "Download failed, retrying");
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream into `<name>.part` and rename once complete.
    fn transfer(&self, job: &DownloadJob, bar: Option<&ProgressBar>) -> Result<u64, DownloadError> {
        let mut body = self.source.open(&job.url)?;

        let destination = &job.destination;
        let io_error = |source| DownloadError::Io {
            path: destination.clone(),
            source,
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let partial = partial_path(destination);
        let file = File::create(&partial).map_err(io_error)?;

        let copied = match bar {
            Some(bar) => {
                bar.reset();
                if let Some(len) = body.len {
                    bar.set_length(len);
                }
                let mut writer = bar.wrap_write(file);
                io::copy(&mut body.reader, &mut writer).and_then(|n| writer.flush().map(|_| n))
            }
            None => {
                let mut writer = file;
                io::copy(&mut body.reader, &mut writer).and_then(|n| writer.flush().map(|_| n))
            }
        };

        match copied {
            Ok(written) => {
                fs::rename(&partial, destination).map_err(io_error)?;
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(io_error(e))
            }
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

fn display_name(path: &Path) -> String {
    path.display().to_string()
}

fn bytes_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╌"),
    );
    bar
}

fn files_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("Files [{bar:40.green/white}] {pos}/{len} {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━╌"),
    );
    bar
}

/// Join a listing-relative path onto `base`, refusing anything that would
/// land outside it.
pub fn resolve_output_path(base: &Path, relative: &str) -> Result<PathBuf, DownloadError> {
    let mut resolved = base.to_path_buf();
    let mut pushed = false;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(DownloadError::UnsafePath(relative.to_string()));
            }
        }
    }

    if !pushed {
        return Err(DownloadError::UnsafePath(relative.to_string()));
    }
    Ok(resolved)
}

/// Last non-empty path segment of a URL, decoded and made safe for the
/// filesystem. Falls back to `download`.
pub fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .map(|segment| sanitize_filename(&percent_decode_str(&segment).decode_utf8_lossy()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.replace("..", "_");

    match cleaned.strip_prefix('.') {
        Some(rest) => format!("_{}", rest),
        None => cleaned,
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < MB {
        format!("{:.2} KB", b / KB)
    } else if b < GB {
        format!("{:.2} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_file_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
