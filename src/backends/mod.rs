pub mod ftp;
pub mod smb;
pub mod webdav;

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::cancel::{CancelToken, Cancelled};
use crate::config::Config;

pub use ftp::{FtpBackend, FtpTarget};
#[cfg(feature = "smb")]
pub use smb::SmbBackend;
pub use smb::SmbTarget;
pub use webdav::WebDavBackend;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url}: {status}")]
    Status {
        method: &'static str,
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("ftp error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[cfg(feature = "smb")]
    #[error("smb error: {0}")]
    Smb(#[from] pavao::SmbError),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{0} support is not compiled in")]
    Unsupported(&'static str),

    #[error("connection already closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for StorageError {
    fn from(_: Cancelled) -> Self {
        StorageError::Cancelled
    }
}

/// Operations every remote store offers. One instance belongs to one worker.
pub trait Storage: Send {
    /// Create `dir`; succeeds when it already exists.
    fn create_directory(&mut self, dir: &str) -> Result<(), StorageError>;

    /// Whether an object exists at `path`; not-found is `Ok(false)`.
    fn exists(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Stream `local` to `remote`, replacing any existing object.
    fn upload(&mut self, local: &Path, remote: &str, size: u64) -> Result<(), StorageError>;

    /// Release the connection. Never fails, may be called more than once.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    WebDav,
    Ftp,
    Smb,
}

impl AsRef<str> for BackendKind {
    fn as_ref(&self) -> &str {
        match *self {
            Self::WebDav => "dav",
            Self::Ftp => "ftp",
            Self::Smb => "smb",
        }
    }
}

/// Pick the backend: an explicit `typ` wins, otherwise the URL scheme decides.
pub fn resolve_kind(typ: &str, url: &str) -> BackendKind {
    let typ = typ.trim().to_lowercase();
    if !typ.is_empty() {
        return match typ.as_str() {
            "ftp" => BackendKind::Ftp,
            "smb" => BackendKind::Smb,
            _ => BackendKind::WebDav,
        };
    }

    let url = url.trim().to_lowercase();
    if url.starts_with("ftp://") {
        BackendKind::Ftp
    } else if url.starts_with("smb://") || url.starts_with(r"\\") {
        BackendKind::Smb
    } else {
        BackendKind::WebDav
    }
}

/// A connected backend of any supported protocol.
pub enum Backend {
    WebDav(WebDavBackend),
    Ftp(FtpBackend),
    #[cfg(feature = "smb")]
    Smb(SmbBackend),
}

/// Build and connect the backend selected by `config`.
pub fn open_backend(config: &Config, cancel: &CancelToken) -> Result<Backend, StorageError> {
    match resolve_kind(&config.typ, &config.url) {
        BackendKind::WebDav => Ok(Backend::WebDav(WebDavBackend::new(config, cancel.clone())?)),
        BackendKind::Ftp => Ok(Backend::Ftp(FtpBackend::connect(config)?)),
        #[cfg(feature = "smb")]
        BackendKind::Smb => Ok(Backend::Smb(SmbBackend::connect(config, cancel.clone())?)),
        #[cfg(not(feature = "smb"))]
        BackendKind::Smb => Err(StorageError::Unsupported("smb")),
    }
}

impl Storage for Backend {
    fn create_directory(&mut self, dir: &str) -> Result<(), StorageError> {
        match self {
            Backend::WebDav(b) => b.create_directory(dir),
            Backend::Ftp(b) => b.create_directory(dir),
            #[cfg(feature = "smb")]
            Backend::Smb(b) => b.create_directory(dir),
        }
    }

    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        match self {
            Backend::WebDav(b) => b.exists(path),
            Backend::Ftp(b) => b.exists(path),
            #[cfg(feature = "smb")]
            Backend::Smb(b) => b.exists(path),
        }
    }

    fn upload(&mut self, local: &Path, remote: &str, size: u64) -> Result<(), StorageError> {
        match self {
            Backend::WebDav(b) => b.upload(local, remote, size),
            Backend::Ftp(b) => b.upload(local, remote, size),
            #[cfg(feature = "smb")]
            Backend::Smb(b) => b.upload(local, remote, size),
        }
    }

    fn close(&mut self) {
        match self {
            Backend::WebDav(b) => b.close(),
            Backend::Ftp(b) => b.close(),
            #[cfg(feature = "smb")]
            Backend::Smb(b) => b.close(),
        }
    }
}
