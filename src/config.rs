use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trailer::{self, TrailerError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trailer error: {0}")]
    Trailer(#[from] TrailerError),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config url empty")]
    EmptyUrl,

    #[error("config list empty")]
    EmptyList,

    #[error("config mode `{0}` invalid, valid: over, skip")]
    BadMode(String),
}

/// The JSON document carried in the trailer. Every field may be absent.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ConfigDoc {
    pub url: String,
    pub user: String,
    pub pass: String,
    pub root: String,
    pub mode: String,
    pub thr: i64,
    pub typ: String,
    pub list: Vec<String>,
    pub debug: bool,
}

impl ConfigDoc {
    /// Defaults the configuration editor fills in before embedding a document.
    /// These differ from what the reader assumes for an empty `mode`.
    pub fn with_editor_defaults(mut self) -> Self {
        if self.mode.is_empty() {
            self.mode = "skip".to_string();
        }
        if self.thr <= 0 {
            self.thr = 4;
        }
        if self.typ.is_empty() {
            self.typ = "dav".to_string();
        }
        self
    }
}

/// Upload policy for objects that already exist remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Overwrite,
    Skip,
}

impl Mode {
    /// Normalize a raw mode value; empty means overwrite.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_lowercase().as_str() {
            "" | "over" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            _ => Err(ConfigError::BadMode(raw.to_string())),
        }
    }
}

impl AsRef<str> for Mode {
    fn as_ref(&self) -> &str {
        match *self {
            Self::Overwrite => "over",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Validated run configuration, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub user: String,
    pub pass: String,
    pub root: String,
    pub mode: Mode,
    /// Requested worker count; zero or negative means one per logical core.
    pub thr: i64,
    pub typ: String,
    pub list: Vec<String>,
    pub debug: bool,
}

impl Config {
    pub fn from_doc(doc: ConfigDoc) -> Result<Self, ConfigError> {
        if doc.url.is_empty() {
            return Err(ConfigError::EmptyUrl);
        }
        if doc.list.is_empty() {
            return Err(ConfigError::EmptyList);
        }
        let mode = Mode::parse(&doc.mode)?;
        Ok(Self {
            url: doc.url,
            user: doc.user,
            pass: doc.pass,
            root: doc.root,
            mode,
            thr: doc.thr,
            typ: doc.typ,
            list: doc.list,
            debug: doc.debug,
        })
    }

    pub fn from_json(payload: &[u8]) -> Result<Self, ConfigError> {
        let doc: ConfigDoc = serde_json::from_slice(payload)?;
        Self::from_doc(doc)
    }

    /// Number of workers to run: the configured value, or the logical core count.
    pub fn workers(&self) -> usize {
        if self.thr > 0 {
            self.thr as usize
        } else {
            num_cpus::get().max(1)
        }
    }
}

/// Load and validate the configuration embedded in `host`.
pub fn load(host: &Path) -> Result<Config, ConfigError> {
    let payload = trailer::read_payload(host)?;
    Config::from_json(&payload)
}

/// Produce host bytes carrying `doc` as their trailer, the way the editor does.
pub fn embed(host: &[u8], doc: ConfigDoc) -> Result<Vec<u8>, ConfigError> {
    let doc = doc.with_editor_defaults();
    if doc.url.is_empty() {
        return Err(ConfigError::EmptyUrl);
    }
    if doc.list.is_empty() {
        return Err(ConfigError::EmptyList);
    }
    let payload = serde_json::to_vec_pretty(&doc)?;
    Ok(trailer::write(host, &payload)?)
}
