use gemwire::protocol::header::{MAX_META_SIZE, format_header, parse_header};
use gemwire::{Error, StatusCode};

#[tokio::test]
async fn test_parse_success_header() {
    let mut input: &[u8] = b"20 text/gemini; lang=en\r\n# Title";

    let (code, meta) = parse_header(&mut input).await.unwrap();

    assert_eq!(code, StatusCode::Success);
    assert_eq!(meta, "text/gemini; lang=en");
    assert_eq!(input, b"# Title");
}

#[tokio::test]
async fn test_parse_formatted_header() {
    let line = format_header(StatusCode::Redirect, "gemini://example.com/next");
    let mut input = line.as_bytes();

    let (code, meta) = parse_header(&mut input).await.unwrap();

    assert_eq!(code, StatusCode::Redirect);
    assert_eq!(meta, "gemini://example.com/next");
}

#[tokio::test]
async fn test_empty_meta_is_allowed() {
    let mut input: &[u8] = b"51 \r\n";
    let (code, meta) = parse_header(&mut input).await.unwrap();
    assert_eq!(code, StatusCode::NotFound);
    assert_eq!(meta, "");
}

#[tokio::test]
async fn test_meta_at_limit_is_accepted() {
    let header = format!("20 {}\r\n", "a".repeat(MAX_META_SIZE));
    let mut input = header.as_bytes();

    let (_, meta) = parse_header(&mut input).await.unwrap();
    assert_eq!(meta.len(), MAX_META_SIZE);
}

#[tokio::test]
async fn test_meta_over_limit_is_too_large() {
    let header = format!("20 {}\r\n", "a".repeat(MAX_META_SIZE + 1));
    let mut input = header.as_bytes();

    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::HeaderTooLarge));
    assert!(err.is_size_limit());
}

#[tokio::test]
async fn test_unregistered_status_is_invalid() {
    let mut input: &[u8] = b"25 text/gemini\r\n";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_non_digit_status_is_invalid() {
    let mut input: &[u8] = b"2x text/gemini\r\n";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_missing_space_is_invalid() {
    let mut input: &[u8] = b"20text/gemini\r\n";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_bare_lf_is_invalid() {
    let mut input: &[u8] = b"20 text/gemini\n";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_cr_without_lf_is_invalid() {
    let mut input: &[u8] = b"20 text/gemini\rX";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_truncated_header_keeps_io_source() {
    let mut input: &[u8] = b"20 text/gem";
    let err = parse_header(&mut input).await.unwrap_err();

    assert!(matches!(err, Error::InvalidResponse { .. }));
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_non_utf8_meta_is_invalid() {
    let mut input: &[u8] = b"20 \xff\xfe\r\n";
    let err = parse_header(&mut input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse { .. }));
}
