use super::StorageError;

pub const SMB_PORT: u16 = 445;

/// Server, share and base directory of an SMB destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbTarget {
    pub host: String,
    pub share: String,
    /// `/`-separated directory inside the share; may be empty.
    pub base: String,
}

impl SmbTarget {
    /// Accepts `smb://host/share[/base]` or `\\host\share[\base]`.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        let trimmed = raw.trim();
        let bad = || StorageError::InvalidTarget(raw.to_string());

        if trimmed
            .get(..6)
            .is_some_and(|s| s.eq_ignore_ascii_case("smb://"))
        {
            let rest = &trimmed[6..];
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            // drop credentials and port; the session always dials 445
            let host = authority.rsplit('@').next().unwrap_or_default();
            let host = host.split(':').next().unwrap_or_default();
            if host.is_empty() {
                return Err(bad());
            }
            let path = path.trim_matches('/');
            if path.is_empty() {
                return Err(bad());
            }
            let (share, base) = path.split_once('/').unwrap_or((path, ""));
            return Ok(Self {
                host: host.to_string(),
                share: share.to_string(),
                base: base.trim_matches('/').to_string(),
            });
        }

        let unc = trimmed.strip_prefix(r"\\").unwrap_or(trimmed);
        let mut parts = unc.splitn(3, '\\');
        let host = parts.next().unwrap_or_default();
        let share = parts.next().unwrap_or_default();
        if host.is_empty() || share.is_empty() {
            return Err(bad());
        }
        let base = parts.next().unwrap_or_default().replace('\\', "/");
        Ok(Self {
            host: host.to_string(),
            share: share.to_string(),
            base: base.trim_matches('/').to_string(),
        })
    }

    /// Absolute path inside the share for a remote relative path.
    pub fn full_path(&self, rel: &str) -> String {
        let rel = rel.trim_matches('/');
        match (self.base.is_empty(), rel.is_empty()) {
            (true, _) => format!("/{rel}"),
            (false, true) => format!("/{}", self.base),
            (false, false) => format!("/{}/{}", self.base, rel),
        }
    }
}

#[cfg(feature = "smb")]
pub use session::SmbBackend;

#[cfg(feature = "smb")]
mod session {
    use std::fs::File;
    use std::io::{self, ErrorKind};
    use std::path::Path;
    use std::time::Instant;

    use log::debug;
    use pavao::{SmbClient, SmbCredentials, SmbError, SmbMode, SmbOpenOptions, SmbOptions};

    use super::{SmbTarget, SMB_PORT};
    use crate::backends::{Storage, StorageError};
    use crate::cancel::CancelToken;
    use crate::config::Config;
    use crate::retry::{retry, NETWORK_ATTEMPTS};
    use crate::utils::log_upload;

    /// A mounted share authenticated with NTLM credentials.
    pub struct SmbBackend {
        client: Option<SmbClient>,
        target: SmbTarget,
        cancel: CancelToken,
    }

    fn io_kind(err: &SmbError) -> Option<ErrorKind> {
        match err {
            SmbError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }

    impl SmbBackend {
        pub fn connect(config: &Config, cancel: CancelToken) -> Result<Self, StorageError> {
            let target = SmbTarget::parse(&config.url)?;
            let credentials = SmbCredentials::default()
                .server(format!("smb://{}:{}", target.host, SMB_PORT))
                .share(format!("/{}", target.share))
                .username(&config.user)
                .password(&config.pass);
            let client = SmbClient::new(credentials, SmbOptions::default().one_share_per_server(true))?;
            // the context connects lazily; touch the share so bad credentials fail here
            client.stat("/")?;
            debug!("smb share //{}/{} mounted", target.host, target.share);

            Ok(Self {
                client: Some(client),
                target,
                cancel,
            })
        }

        fn client(&self) -> Result<&SmbClient, StorageError> {
            self.client.as_ref().ok_or(StorageError::Closed)
        }
    }

    impl Storage for SmbBackend {
        fn create_directory(&mut self, dir: &str) -> Result<(), StorageError> {
            if dir.is_empty() {
                return Ok(());
            }
            let full = self.target.full_path(dir);
            retry(NETWORK_ATTEMPTS, &self.cancel, || {
                let client = self.client()?;
                let mut prefix = String::with_capacity(full.len());
                for seg in full.split('/').filter(|s| !s.is_empty()) {
                    prefix.push('/');
                    prefix.push_str(seg);
                    match client.mkdir(&prefix, SmbMode::from(0o755)) {
                        Ok(()) => {}
                        Err(e) if io_kind(&e) == Some(ErrorKind::AlreadyExists) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            })
        }

        fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
            let full = self.target.full_path(path);
            retry(NETWORK_ATTEMPTS, &self.cancel, || {
                match self.client()?.open_with(&full, SmbOpenOptions::default().read(true)) {
                    Ok(_) => Ok(true),
                    Err(e) if io_kind(&e) == Some(ErrorKind::NotFound) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
        }

        fn upload(&mut self, local: &Path, remote: &str, size: u64) -> Result<(), StorageError> {
            let full = self.target.full_path(remote);
            debug!("PUT {} -> smb:{} ({} bytes)", local.display(), full, size);
            retry(NETWORK_ATTEMPTS, &self.cancel, || {
                let mut input = File::open(local)?;
                let mut output = self.client()?.open_with(
                    &full,
                    SmbOpenOptions::default().create(true).write(true).truncate(true),
                )?;
                let started = Instant::now();
                let copied = io::copy(&mut input, &mut output)?;
                log_upload(local, &format!("smb:{full}"), copied, started.elapsed());
                Ok(())
            })
        }

        fn close(&mut self) {
            // unmount and logoff happen when the context is freed
            self.client.take();
        }
    }
}
