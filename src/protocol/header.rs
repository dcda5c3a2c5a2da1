//! Response header codec: `<2-digit code><SP><meta><CRLF>`.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::protocol::status::StatusCode;

/// Maximum size of the meta field in bytes.
pub const MAX_META_SIZE: usize = 1024;

/// Maximum size of a whole header line: code, space, meta and CRLF.
pub const MAX_HEADER_SIZE: usize = 3 + MAX_META_SIZE + 2;

/// Media type of gemtext documents, the default meta of `Success` responses.
pub const MIME_GEMTEXT: &str = "text/gemini";

/// Reads one response header from `reader`.
///
/// Bytes are consumed one at a time, so on success the reader is positioned
/// exactly after the terminating `\n` and no body byte has been read. Wrap
/// raw sockets in a buffered reader before calling this.
///
/// A meta that exceeds [`MAX_META_SIZE`] without terminating yields
/// [`Error::HeaderTooLarge`]; every other grammar violation is
/// [`Error::InvalidResponse`], with the underlying I/O error as its source
/// when the stream failed.
pub async fn parse_header<R>(reader: &mut R) -> Result<(StatusCode, String)>
where
    R: AsyncRead + Unpin,
{
    let code = parse_status_code(reader).await?;

    expect_byte(reader, b' ').await?;

    let mut meta = Vec::with_capacity(64);
    loop {
        let byte = read_byte(reader).await?;
        match byte {
            b'\r' => break,
            b'\n' => {
                return Err(Error::invalid_response("unexpected LF before CR in meta"));
            }
            _ if meta.len() >= MAX_META_SIZE => return Err(Error::HeaderTooLarge),
            _ => meta.push(byte),
        }
    }

    expect_byte(reader, b'\n').await?;

    let meta = String::from_utf8(meta)
        .map_err(|_| Error::invalid_response("meta is not valid UTF-8"))?;

    Ok((code, meta))
}

/// Serializes a status line. The caller is responsible for keeping CR and LF
/// out of `meta`.
pub fn format_header(code: StatusCode, meta: &str) -> String {
    format!("{:02} {}\r\n", code.as_u8(), meta)
}

async fn parse_status_code<R>(reader: &mut R) -> Result<StatusCode>
where
    R: AsyncRead + Unpin,
{
    let high = read_byte(reader).await?;
    let low = read_byte(reader).await?;

    if !high.is_ascii_digit() || !low.is_ascii_digit() {
        return Err(Error::invalid_response(format!(
            "unexpected status string: {:?}",
            String::from_utf8_lossy(&[high, low])
        )));
    }

    let value = (high - b'0') * 10 + (low - b'0');
    StatusCode::from_u8(value)
        .ok_or_else(|| Error::invalid_response(format!("unexpected status {value}")))
}

async fn expect_byte<R>(reader: &mut R, expected: u8) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let got = read_byte(reader).await?;
    if got != expected {
        return Err(Error::invalid_response(format!(
            "{:?} is expected, got {:?}",
            expected as char, got as char
        )));
    }
    Ok(())
}

async fn read_byte<R>(reader: &mut R) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    reader
        .read_u8()
        .await
        .map_err(|e| Error::invalid_response_io("reading header", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leaves_body_untouched() {
        let mut input: &[u8] = b"20 text/plain\r\nbody";

        let (code, meta) = parse_header(&mut input).await.unwrap();

        assert_eq!(code, StatusCode::Success);
        assert_eq!(meta, "text/plain");
        assert_eq!(input, b"body");
    }

    #[test]
    fn formats_status_line() {
        assert_eq!(format_header(StatusCode::NotFound, "gone"), "51 gone\r\n");
    }
}
