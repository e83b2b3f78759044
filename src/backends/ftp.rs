use std::fs::File;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::{Duration, Instant};

use log::debug;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::{Storage, StorageError};
use crate::config::Config;
use crate::utils::log_upload;

pub const DEFAULT_PORT: u16 = 21;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to connect and which directory every remote path lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpTarget {
    /// `host:port`
    pub addr: String,
    /// Base directory without surrounding slashes; may be empty.
    pub base: String,
}

impl FtpTarget {
    /// Accepts `ftp://[user[:pass]@]host[:port][/base]` or a bare `host[:port]`.
    /// Credentials in the URL are ignored; login uses the configured user.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let trimmed = raw.trim();
        let rest = match trimmed.get(..6) {
            Some(scheme) if scheme.eq_ignore_ascii_case("ftp://") => &trimmed[6..],
            _ => trimmed,
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let host = authority.rsplit('@').next().unwrap_or_default();
        if host.is_empty() {
            return Err(StorageError::InvalidTarget(raw.to_string()));
        }

        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{DEFAULT_PORT}")
        };
        Ok(Self {
            addr,
            base: path.trim_matches('/').to_string(),
        })
    }

    pub fn full_path(&self, rel: &str) -> String {
        if self.base.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{}", self.base, rel.trim_start_matches('/'))
        }
    }
}

/// Plain FTP session. Calls are not retried: a failed command can leave the
/// control connection mid-transfer.
pub struct FtpBackend {
    stream: Option<FtpStream>,
    target: FtpTarget,
}

impl FtpBackend {
    pub fn connect(config: &Config) -> Result<Self, StorageError> {
        let target = FtpTarget::parse(&config.url)?;
        let sock = target
            .addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| StorageError::InvalidTarget(target.addr.clone()))?;

        let mut stream = FtpStream::connect_timeout(sock, CONNECT_TIMEOUT)?;
        let (user, pass) = if config.user.is_empty() {
            ("anonymous", "anonymous")
        } else {
            (config.user.as_str(), config.pass.as_str())
        };
        if let Err(e) = stream.login(user, pass) {
            let _ = stream.quit();
            return Err(e.into());
        }
        stream.transfer_type(FileType::Binary)?;
        debug!("ftp session open to {}", target.addr);

        Ok(Self {
            stream: Some(stream),
            target,
        })
    }

    fn stream(&mut self) -> Result<&mut FtpStream, StorageError> {
        self.stream.as_mut().ok_or(StorageError::Closed)
    }
}

fn error_text(err: &FtpError) -> String {
    err.to_string().to_lowercase()
}

/// Servers word "file missing" differently; 550 is the common reply code.
pub fn is_not_found(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("550") || text.contains("not found") || text.contains("no such file")
}

impl Storage for FtpBackend {
    fn create_directory(&mut self, dir: &str) -> Result<(), StorageError> {
        if dir.is_empty() {
            return Ok(());
        }
        let path = self.target.full_path(dir);
        match self.stream()?.mkdir(&path) {
            Ok(()) => Ok(()),
            Err(e) if error_text(&e).contains("exist") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        let path = self.target.full_path(path);
        match self.stream()?.size(&path) {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&error_text(&e)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn upload(&mut self, local: &Path, remote: &str, size: u64) -> Result<(), StorageError> {
        let path = self.target.full_path(remote);
        debug!("STOR {} -> ftp:{} ({} bytes)", local.display(), path, size);
        let mut file = File::open(local)?;
        let started = Instant::now();
        self.stream()?.put_file(&path, &mut file)?;
        log_upload(local, &format!("ftp:{path}"), size, started.elapsed());
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.quit() {
                debug!("ftp quit: {}", e);
            }
        }
    }
}
