//! Ready-made handlers and response helpers.

use std::collections::BTreeSet;
use std::path::Path;

use bytes::Bytes;
use url::Url;

use crate::error::Result;
use crate::protocol::header::MIME_GEMTEXT;
use crate::protocol::request::Request;
use crate::protocol::status::StatusCode;
use crate::protocol::writer::ResponseWriter;
use crate::server::{Handler, handler_fn};

/// Handler answering every request with `20 <content_type>` and `content`.
pub fn serve_content(content_type: impl Into<String>, content: impl Into<Bytes>) -> impl Handler {
    let content_type = content_type.into();
    let content = content.into();

    handler_fn(move |_ctx, rw, _req| {
        let content_type = content_type.clone();
        let content = content.clone();
        Box::pin(async move {
            rw.write_status(StatusCode::Success, &content_type).await?;
            rw.write(&content).await?;
            Ok(())
        })
    })
}

/// Media type for a file served as-is.
///
/// `.gmi` and `.gemini` files are gemtext. Anything else is sniffed from its
/// first bytes: a few well-known binary signatures, UTF-8 text, or
/// `application/octet-stream`.
pub fn content_type(path: &Path, content: &[u8]) -> &'static str {
    if matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("gmi" | "gemini")
    ) {
        return MIME_GEMTEXT;
    }

    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
    ];
    let head = &content[..content.len().min(SNIFF_LEN)];
    if let Some(&(_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return mime;
    }

    if is_text(head) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// Bytes inspected when sniffing a media type.
const SNIFF_LEN: usize = 512;

fn is_text(head: &[u8]) -> bool {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // a multi-byte character cut at the sniff boundary
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c' | '\x1b'))
}

/// Sends the client to `target`.
///
/// With [`StatusCode::Success`] a gemtext page holding a single link is
/// written instead of a redirect header. A relative target is resolved
/// against the request path, keeping the request query.
pub async fn redirect(
    rw: &mut ResponseWriter,
    req: &Request,
    target: &str,
    code: StatusCode,
) -> Result<()> {
    if code == StatusCode::Success {
        rw.write_status(StatusCode::Success, MIME_GEMTEXT).await?;
        rw.write_str(&format!("=> {target} redirect\r\n")).await?;
        return Ok(());
    }

    match Url::parse(target) {
        Ok(_) => rw.write_status(code, target).await,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut location = req.url.clone();
            location.set_path(&join_path(req.path(), target));
            rw.write_status(code, location.as_str()).await
        }
        Err(e) => {
            tracing::debug!(target = %target, error = %e, "redirect target is not a URL");
            rw.write_status(code, target).await
        }
    }
}

/// Replies `51 <url> is not found`.
pub async fn not_found(rw: &mut ResponseWriter, req: &Request) -> Result<()> {
    rw.write_status(StatusCode::NotFound, &format!("{} is not found", req.url))
        .await
}

/// Query parameters used as bare flags: keys whose values are all empty,
/// sorted and without duplicates.
///
/// `?a&b=1&c=&a` yields `["a", "c"]`.
pub fn query_keys(url: &Url) -> Vec<String> {
    let mut flags = BTreeSet::new();
    let mut valued = BTreeSet::new();
    for (key, value) in url.query_pairs() {
        if value.is_empty() {
            flags.insert(key.into_owned());
        } else {
            valued.insert(key.into_owned());
        }
    }
    flags.difference(&valued).cloned().collect()
}

/// Joins a relative target onto a directory-like base path, resolving `.`
/// and `..` without climbing above the root. An absolute target replaces the
/// base.
fn join_path(base: &str, target: &str) -> String {
    let start = if target.starts_with('/') { "" } else { base };
    let mut segments: Vec<&str> = Vec::new();
    for segment in start.split('/').chain(target.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_keys_keeps_flags_only() {
        let url = Url::parse("gemini://example.com/?b&a&x=1&a&c=").unwrap();
        assert_eq!(query_keys(&url), vec!["a", "b", "c"]);

        let url = Url::parse("gemini://example.com/?a&a=1").unwrap();
        assert!(query_keys(&url).is_empty());

        let url = Url::parse("gemini://example.com/").unwrap();
        assert!(query_keys(&url).is_empty());
    }

    #[test]
    fn content_type_by_extension_then_content() {
        assert_eq!(content_type(Path::new("index.gmi"), b"\x00\x01"), "text/gemini");
        assert_eq!(content_type(Path::new("a/b.gemini"), b""), "text/gemini");
        assert_eq!(
            content_type(Path::new("notes.txt"), "plain text, caf\u{e9}\n".as_bytes()),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            content_type(Path::new("logo"), b"\x89PNG\r\n\x1a\n\x00\x00"),
            "image/png"
        );
        assert_eq!(
            content_type(Path::new("blob.bin"), &[0x00, 0xfe, 0x10]),
            "application/octet-stream"
        );
    }

    #[test]
    fn sniffing_tolerates_a_cut_character() {
        let mut content = "a".repeat(SNIFF_LEN - 1).into_bytes();
        content.extend_from_slice("\u{e9}".as_bytes());
        assert_eq!(content_type(Path::new("long"), &content), "text/plain; charset=utf-8");
    }

    #[test]
    fn join_path_resolves_relative_targets() {
        assert_eq!(join_path("/docs", "intro"), "/docs/intro");
        assert_eq!(join_path("/docs/a", "../b"), "/docs/b");
        assert_eq!(join_path("/docs", "/abs"), "/abs");
        assert_eq!(join_path("/", "../../x"), "/x");
    }
}
