/// Project overview:
/// - A single executable that carries its own configuration as a trailer on its binary image
/// - Walks the configured local files/directories and uploads them in parallel
/// - Producer-consumer model: one walker thread, a bounded queue, a fixed pool of workers
/// - Backends: WebDAV (HTTP), FTP, and SMB (behind the `smb` feature)
///
/// Key behaviors:
/// - Mode "over" uploads unconditionally; mode "skip" leaves existing remote objects alone
/// - Remote directories are created once per run through a shared cache
/// - WebDAV and SMB calls are retried with 1s/2s/4s backoff; FTP calls are not
/// - Ctrl-C stops new work; uploads already in flight finish first
pub mod backends;
pub mod cancel;
pub mod config;
pub mod dircache;
pub mod retry;
pub mod trailer;
pub mod upload;
pub mod utils;

pub use backends::{open_backend, resolve_kind, Backend, BackendKind, Storage, StorageError};
pub use cancel::{CancelToken, Cancelled};
pub use config::{Config, ConfigDoc, ConfigError, Mode};
pub use dircache::DirCache;
pub use upload::{run, run_with, Job, Outcome, Summary};
