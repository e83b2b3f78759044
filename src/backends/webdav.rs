use std::fs::File;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use log::debug;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};

use super::{Storage, StorageError};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::retry::{retry, NETWORK_ATTEMPTS};
use crate::utils::log_upload;

/// WebDAV over HTTP(S). Every request is retried on failure.
pub struct WebDavBackend {
    client: Option<Client>,
    base: Url,
    user: String,
    pass: String,
    mkcol: Method,
    cancel: CancelToken,
}

impl WebDavBackend {
    pub fn new(config: &Config, cancel: CancelToken) -> Result<Self, StorageError> {
        let base = parse_base(&config.url)?;
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| StorageError::InvalidTarget(e.to_string()))?;
        Ok(Self {
            client: Some(build_client(config.workers())?),
            base,
            user: config.user.clone(),
            pass: config.pass.clone(),
            mkcol,
            cancel,
        })
    }

    fn client(&self) -> Result<&Client, StorageError> {
        self.client.as_ref().ok_or(StorageError::Closed)
    }

    fn request(&self, method: Method, url: &Url) -> Result<RequestBuilder, StorageError> {
        let req = self.client()?.request(method, url.clone());
        if self.user.is_empty() {
            Ok(req)
        } else {
            Ok(req.basic_auth(&self.user, Some(&self.pass)))
        }
    }
}

/// Connection pool scaled to the worker count. No overall timeout: large uploads
/// may legitimately take hours.
fn build_client(workers: usize) -> Result<Client, StorageError> {
    let workers = workers.max(1);
    Ok(Client::builder()
        .pool_max_idle_per_host(workers * 2)
        .timeout(None::<Duration>)
        .build()?)
}

fn parse_base(raw: &str) -> Result<Url, StorageError> {
    let url = Url::parse(raw.trim().trim_end_matches('/'))
        .map_err(|e| StorageError::InvalidTarget(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StorageError::InvalidTarget(raw.to_string()));
    }
    Ok(url)
}

/// Append each `/`-separated segment of `rel` to `base`, percent-escaping it.
pub fn resource_url(base: &Url, rel: &str) -> Result<Url, StorageError> {
    let mut url = base.clone();
    {
        let mut segs = url
            .path_segments_mut()
            .map_err(|_| StorageError::InvalidTarget(base.to_string()))?;
        segs.pop_if_empty();
        for seg in rel.split('/').filter(|s| !s.is_empty()) {
            segs.push(seg);
        }
    }
    Ok(url)
}

fn drain(mut resp: Response) -> StatusCode {
    let status = resp.status();
    let _ = io::copy(&mut resp, &mut io::sink());
    status
}

impl Storage for WebDavBackend {
    fn create_directory(&mut self, dir: &str) -> Result<(), StorageError> {
        if dir.is_empty() {
            return Ok(());
        }
        let url = resource_url(&self.base, dir)?;
        debug!("MKCOL {}", url);
        retry(NETWORK_ATTEMPTS, &self.cancel, || {
            let status = drain(self.request(self.mkcol.clone(), &url)?.send()?);
            match status {
                // 405: already a collection
                StatusCode::METHOD_NOT_ALLOWED
                | StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT => Ok(()),
                s if s.is_success() => Ok(()),
                s => Err(StorageError::Status {
                    method: "MKCOL",
                    url: url.to_string(),
                    status: s,
                }),
            }
        })
    }

    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        let url = resource_url(&self.base, path)?;
        retry(NETWORK_ATTEMPTS, &self.cancel, || {
            let status = drain(self.request(Method::HEAD, &url)?.send()?);
            match status {
                StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
                s if s.is_success() => Ok(true),
                s => Err(StorageError::Status {
                    method: "HEAD",
                    url: url.to_string(),
                    status: s,
                }),
            }
        })
    }

    fn upload(&mut self, local: &Path, remote: &str, size: u64) -> Result<(), StorageError> {
        let url = resource_url(&self.base, remote)?;
        debug!("PUT {} -> {} ({} bytes)", local.display(), url, size);
        retry(NETWORK_ATTEMPTS, &self.cancel, || {
            let file = File::open(local)?;
            let started = Instant::now();
            let req = self
                .request(Method::PUT, &url)?
                .body(Body::sized(file, size));
            let status = drain(req.send()?);
            if !status.is_success() {
                return Err(StorageError::Status {
                    method: "PUT",
                    url: url.to_string(),
                    status,
                });
            }
            log_upload(local, url.as_str(), size, started.elapsed());
            Ok(())
        })
    }

    fn close(&mut self) {
        // Dropping the client releases its pooled connections.
        self.client.take();
    }
}
