use std::fs;

use tailpush::config::{self, Config, ConfigDoc, ConfigError, Mode};
use tailpush::trailer::{self, TrailerError, MAGIC, SCAN_WINDOW};
use tempfile::tempdir;

const PAYLOAD: &[u8] = br#"{"url":"http://x/dav","list":["dirA"]}"#;

#[test]
fn test_write_then_find_returns_payload() {
    let host = b"\x7fELF some binary bytes".to_vec();
    let out = trailer::write(&host, PAYLOAD).unwrap();

    assert!(out.starts_with(&host));
    assert_eq!(trailer::find_payload(&out).unwrap(), PAYLOAD);

    let len_at = host.len() + MAGIC.len();
    assert_eq!(&out[len_at..len_at + 4], &(PAYLOAD.len() as u32).to_be_bytes());
}

#[test]
fn test_second_write_replaces_stale_trailer() {
    let host = b"host".to_vec();
    let first = trailer::write(&host, br#"{"url":"a"}"#).unwrap();
    let second = trailer::write(&first, br#"{"url":"b"}"#).unwrap();

    assert_eq!(trailer::find_payload(&second).unwrap(), br#"{"url":"b"}"#);
    assert_eq!(trailer::strip(&second), b"host");
    // exactly one trailer left
    let count = second.windows(MAGIC.len()).filter(|w| *w == MAGIC).count();
    assert_eq!(count, 1);
}

#[test]
fn test_strip_without_trailer_is_identity() {
    assert_eq!(trailer::strip(b"plain host"), b"plain host");
}

#[test]
fn test_read_payload_from_large_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent");
    let host = vec![0xabu8; (SCAN_WINDOW as usize) * 3];
    fs::write(&path, trailer::write(&host, PAYLOAD).unwrap()).unwrap();

    assert_eq!(trailer::read_payload(&path).unwrap(), PAYLOAD);
}

#[test]
fn test_magic_outside_scan_window_is_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent");
    let mut bytes = trailer::write(b"host", PAYLOAD).unwrap();
    bytes.extend(vec![0u8; SCAN_WINDOW as usize + 16]);
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        trailer::read_payload(&path),
        Err(TrailerError::MagicNotFound)
    ));
}

#[test]
fn test_tiny_file_has_no_trailer() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiny");
    fs::write(&path, b"CFG_TAIL1\0\0\0").unwrap();

    assert!(matches!(
        trailer::read_payload(&path),
        Err(TrailerError::TooSmall(12))
    ));
}

#[test]
fn test_truncated_trailer_is_rejected() {
    let mut bytes = trailer::write(b"host", PAYLOAD).unwrap();
    bytes.truncate(bytes.len() - 3);
    assert!(matches!(
        trailer::find_payload(&bytes),
        Err(TrailerError::LengthOutOfRange(_))
    ));

    let mut short = b"hostCFG_TAIL1".to_vec();
    short.extend_from_slice(&[0, 0]);
    assert!(matches!(
        trailer::find_payload(&short),
        Err(TrailerError::LengthMissing)
    ));
}

#[test]
fn test_zero_length_is_rejected() {
    let bytes = trailer::write(b"host", b"").unwrap();
    assert!(matches!(
        trailer::find_payload(&bytes),
        Err(TrailerError::LengthOutOfRange(0))
    ));
}

#[test]
fn test_load_parses_and_defaults_mode() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent");
    fs::write(&path, trailer::write(b"binary", PAYLOAD).unwrap()).unwrap();

    let cfg = config::load(&path).unwrap();
    assert_eq!(cfg.url, "http://x/dav");
    assert_eq!(cfg.list, vec!["dirA".to_string()]);
    assert_eq!(cfg.mode, Mode::Overwrite);
    assert_eq!(cfg.thr, 0);
    assert!(cfg.workers() >= 1);
    assert!(!cfg.debug);
}

#[test]
fn test_mode_normalization() {
    for raw in ["OVER", " over ", ""] {
        assert_eq!(Mode::parse(raw).unwrap(), Mode::Overwrite, "{raw:?}");
    }
    assert_eq!(Mode::parse(" Skip").unwrap(), Mode::Skip);
    assert!(matches!(Mode::parse("bogus"), Err(ConfigError::BadMode(_))));
}

#[test]
fn test_validation_errors() {
    assert!(matches!(
        Config::from_json(br#"{"list":["a"]}"#),
        Err(ConfigError::EmptyUrl)
    ));
    assert!(matches!(
        Config::from_json(br#"{"url":"ftp://h","list":[]}"#),
        Err(ConfigError::EmptyList)
    ));
    assert!(matches!(
        Config::from_json(br#"{"url":"ftp://h","list":["a"],"mode":"bogus"}"#),
        Err(ConfigError::BadMode(_))
    ));
    assert!(matches!(
        Config::from_json(b"{not json"),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_embed_applies_editor_defaults() {
    let doc = ConfigDoc {
        url: "http://x/dav".into(),
        list: vec!["dirA".into()],
        ..Default::default()
    };
    let bytes = config::embed(b"template", doc).unwrap();
    let payload = trailer::find_payload(&bytes).unwrap();
    let written: ConfigDoc = serde_json::from_slice(payload).unwrap();

    assert_eq!(written.mode, "skip");
    assert_eq!(written.thr, 4);
    assert_eq!(written.typ, "dav");

    let cfg = Config::from_json(payload).unwrap();
    assert_eq!(cfg.mode, Mode::Skip);
    assert_eq!(cfg.workers(), 4);
}
