//! Configuration trailer appended to the end of a host file.
//!
//! Layout: `[host bytes] ["CFG_TAIL1"] [u32 big-endian length] [length bytes of JSON]`.
//! Only the last occurrence of the magic is authoritative; anything in front of it,
//! including an older trailer, belongs to the host.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

pub const MAGIC: &[u8] = b"CFG_TAIL1";

/// Size of the length field that follows the magic.
pub const LEN_FIELD: usize = 4;

/// Only the tail of the host file is scanned for the magic.
pub const SCAN_WINDOW: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum TrailerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no trailer: file is only {0} bytes")]
    TooSmall(u64),

    #[error("trailer magic not found")]
    MagicNotFound,

    #[error("trailer length field missing")]
    LengthMissing,

    #[error("trailer length {0} out of range")]
    LengthOutOfRange(usize),

    #[error("payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
}

/// Read the payload of the last trailer in `path`.
pub fn read_payload(path: &Path) -> Result<Vec<u8>, TrailerError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size <= (MAGIC.len() + LEN_FIELD) as u64 {
        return Err(TrailerError::TooSmall(size));
    }

    let window = size.min(SCAN_WINDOW);
    file.seek(SeekFrom::Start(size - window))?;
    let mut buf = vec![0u8; window as usize];
    file.read_exact(&mut buf)?;

    find_payload(&buf).map(<[u8]>::to_vec)
}

/// Locate the payload of the last trailer inside an in-memory buffer.
pub fn find_payload(buf: &[u8]) -> Result<&[u8], TrailerError> {
    let idx = rfind_magic(buf).ok_or(TrailerError::MagicNotFound)?;
    let pos = idx + MAGIC.len();
    let len_bytes: [u8; LEN_FIELD] = buf
        .get(pos..pos + LEN_FIELD)
        .and_then(|b| b.try_into().ok())
        .ok_or(TrailerError::LengthMissing)?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    let start = pos + LEN_FIELD;
    if len == 0 || start + len > buf.len() {
        return Err(TrailerError::LengthOutOfRange(len));
    }
    Ok(&buf[start..start + len])
}

/// Host bytes with any trailer removed.
pub fn strip(host: &[u8]) -> &[u8] {
    match rfind_magic(host) {
        Some(idx) => &host[..idx],
        None => host,
    }
}

/// Replace any trailer on `host` with one carrying `payload`.
pub fn write(host: &[u8], payload: &[u8]) -> Result<Vec<u8>, TrailerError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| TrailerError::PayloadTooLarge(payload.len()))?;

    let head = strip(host);
    let mut out = Vec::with_capacity(head.len() + MAGIC.len() + LEN_FIELD + payload.len());
    out.extend_from_slice(head);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn rfind_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).rposition(|w| w == MAGIC)
}
