//! Parallel upload engine.
//!
//! A producer thread walks the configured sources into a bounded queue; a fixed
//! pool of workers, each with its own backend connection, drains it.
//! - Backpressure: the producer blocks while the queue holds `4 × workers` jobs.
//! - Drain: workers stop once the queue is closed and empty, or on cancellation.
//! - Per-job failures are logged and counted; they never stop other jobs.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use crate::backends::{open_backend, Storage, StorageError};
use crate::cancel::CancelToken;
use crate::config::{Config, Mode};
use crate::dircache::DirCache;

/// Queue slots per worker.
pub const QUEUE_FACTOR: usize = 4;

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub local: PathBuf,
    /// `/`-separated path relative to the configured root.
    pub remote: String,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("no workers left to take jobs")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("stat {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    #[error("mkdir {path}: {source}")]
    CreateDirectory { path: String, source: StorageError },

    #[error("exists {path}: {source}")]
    Exists { path: String, source: StorageError },

    #[error("upload {local} -> {remote}: {source}")]
    Upload {
        local: PathBuf,
        remote: String,
        source: StorageError,
    },
}

/// Run-wide counters, updated atomically by the workers.
#[derive(Debug, Default)]
pub struct RunStats {
    total: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: u64,
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunStats {
    pub fn snapshot(&self) -> Summary {
        Summary {
            total: self.total.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// How a run ended. Cancellation wins even if every started job succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(Summary),
    Cancelled(Summary),
}

impl Outcome {
    pub fn summary(&self) -> Summary {
        match *self {
            Outcome::Completed(s) | Outcome::Cancelled(s) => s,
        }
    }
}

/// Upload everything in `config.list` using the backend the config selects.
/// Relative source paths are resolved against `base_dir`.
pub fn run(config: Arc<Config>, base_dir: &Path, cancel: &CancelToken) -> Outcome {
    let worker_cancel = cancel.clone();
    run_with(config, base_dir, cancel, move |cfg: &Config| {
        open_backend(cfg, &worker_cancel)
    })
}

/// [`run`] with a caller-supplied backend constructor, invoked once per worker.
pub fn run_with<S, F>(config: Arc<Config>, base_dir: &Path, cancel: &CancelToken, open: F) -> Outcome
where
    S: Storage + 'static,
    F: Fn(&Config) -> Result<S, StorageError> + Send + Sync + 'static,
{
    let workers = config.workers();
    info!("workers={} mode={}", workers, config.mode);

    let (tx, rx) = bounded::<Job>(workers * QUEUE_FACTOR);
    let stats = Arc::new(RunStats::default());
    let dirs = Arc::new(DirCache::new());
    let open = Arc::new(open);

    let mut handles = Vec::with_capacity(workers);
    for id in 0..workers {
        let rx = rx.clone();
        let config = Arc::clone(&config);
        let stats = Arc::clone(&stats);
        let dirs = Arc::clone(&dirs);
        let open = Arc::clone(&open);
        let cancel = cancel.clone();
        handles.push(thread::spawn(move || {
            let mut storage = match open(&config) {
                Ok(s) => s,
                Err(e) => {
                    error!("[ERR] worker {} could not open backend: {}", id, e);
                    return;
                }
            };
            worker_loop(&mut storage, &config, &rx, &dirs, &stats, &cancel);
            storage.close();
            debug!("worker {} exiting", id);
        }));
    }
    // Only workers hold receivers, so if they all exit the producer's send fails.
    drop(rx);

    let sources: Vec<PathBuf> = config
        .list
        .iter()
        .map(|s| resolve_source(base_dir, s))
        .collect();
    let producer_cancel = cancel.clone();
    let producer = thread::spawn(move || produce(&sources, tx, &producer_cancel));

    if producer.join().is_err() {
        error!("producer thread panicked");
    }
    for (i, handle) in handles.into_iter().enumerate() {
        if handle.join().is_err() {
            error!("worker {} panicked", i);
        }
    }

    let summary = stats.snapshot();
    info!(
        "total={} succeeded={} skipped={} failed={}",
        summary.total, summary.succeeded, summary.skipped, summary.failed
    );
    if cancel.is_cancelled() {
        Outcome::Cancelled(summary)
    } else {
        Outcome::Completed(summary)
    }
}

fn worker_loop<S: Storage + ?Sized>(
    storage: &mut S,
    config: &Config,
    rx: &Receiver<Job>,
    dirs: &DirCache,
    stats: &RunStats,
    cancel: &CancelToken,
) {
    while !cancel.is_cancelled() {
        let job = match rx.recv() {
            Ok(job) => job,
            Err(_) => break,
        };
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = process_job(storage, config, &job, dirs, stats, cancel) {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            error!("[ERR] {}", e);
        }
    }
}

/// Walk each source in order and queue its regular files. Closes the queue when done.
fn produce(sources: &[PathBuf], tx: Sender<Job>, cancel: &CancelToken) {
    for src in sources {
        if cancel.is_cancelled() {
            break;
        }
        match enqueue_source(src, &tx, cancel) {
            Ok(()) => {}
            Err(ScanError::Cancelled) => break,
            Err(ScanError::Disconnected) => {
                warn!("no workers running, stopping at {}", src.display());
                break;
            }
            Err(e) => error!("[ERR] add {}: {}", src.display(), e),
        }
    }
    drop(tx);
}

/// Queue the jobs for one source entry: every regular file below a directory,
/// or the file itself. Anything else is ignored.
pub fn enqueue_source(src: &Path, tx: &Sender<Job>, cancel: &CancelToken) -> Result<(), ScanError> {
    if cancel.is_cancelled() {
        return Err(ScanError::Cancelled);
    }
    let src = clean_path(src);
    let meta = fs::metadata(&src)?;
    let base = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if meta.is_dir() {
        for entry in WalkDir::new(&src) {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&src).unwrap_or(entry.path());
            let job = Job {
                local: entry.path().to_path_buf(),
                remote: remote_child(&base, rel),
            };
            tx.send(job).map_err(|_| ScanError::Disconnected)?;
        }
        return Ok(());
    }

    if meta.is_file() {
        let job = Job {
            local: src.clone(),
            remote: base,
        };
        tx.send(job).map_err(|_| ScanError::Disconnected)?;
    }
    Ok(())
}

/// Upload (or skip) one job. The caller counts the failure when this errors.
pub fn process_job<S: Storage + ?Sized>(
    storage: &mut S,
    config: &Config,
    job: &Job,
    dirs: &DirCache,
    stats: &RunStats,
    cancel: &CancelToken,
) -> Result<(), JobError> {
    let meta = fs::metadata(&job.local).map_err(|source| JobError::Stat {
        path: job.local.clone(),
        source,
    })?;
    if !meta.is_file() {
        return Ok(());
    }
    stats.total.fetch_add(1, Ordering::SeqCst);

    let remote = remote_path(&config.root, &job.remote);
    if let Some(parent) = remote_parent(&remote) {
        dirs.ensure(parent, cancel, |dir| storage.create_directory(dir))
            .map_err(|source| JobError::CreateDirectory {
                path: parent.to_string(),
                source,
            })?;
    }

    if config.mode == Mode::Skip {
        let present = storage.exists(&remote).map_err(|source| JobError::Exists {
            path: remote.clone(),
            source,
        })?;
        if present {
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            info!("[SKIP] {} -> {}", job.local.display(), remote);
            return Ok(());
        }
    }

    storage
        .upload(&job.local, &remote, meta.len())
        .map_err(|source| JobError::Upload {
            local: job.local.clone(),
            remote: remote.clone(),
            source,
        })?;
    stats.succeeded.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

/// `<root>/<rel>` with `.`, `..` and repeated slashes resolved lexically.
pub fn remote_path(root: &str, rel: &str) -> String {
    if root.is_empty() {
        clean_remote(rel)
    } else {
        clean_remote(&format!("{root}/{rel}"))
    }
}

/// A leading `/` is kept. `..` never climbs above a rooted path; in a relative
/// path it is kept once nothing is left to pop.
fn clean_remote(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segs: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match segs.last() {
                Some(&last) if last != ".." => {
                    segs.pop();
                }
                _ if rooted => {}
                _ => segs.push(".."),
            },
            seg => segs.push(seg),
        }
    }
    let joined = segs.join("/");
    if rooted {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Parent directory of a remote path, unless it is the top level.
pub fn remote_parent(remote: &str) -> Option<&str> {
    let (parent, _) = remote.rsplit_once('/')?;
    if parent.trim_matches('/').is_empty() {
        None
    } else {
        Some(parent)
    }
}

/// `base/rel` with `/` separators; just `base` for the root itself.
fn remote_child(base: &str, rel: &Path) -> String {
    let mut out = base.to_string();
    for comp in rel.components() {
        if let Component::Normal(seg) = comp {
            out.push('/');
            out.push_str(&seg.to_string_lossy());
        }
    }
    out
}

fn resolve_source(base_dir: &Path, entry: &str) -> PathBuf {
    let path = Path::new(entry);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Lexically drop `.` components and trailing separators so the base name is stable.
fn clean_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
