//! Exact-count primitives over a stream transport.
//!
//! Generic over the underlying reader/writer type - works with TCP, in-memory
//! duplex pipes, or any `AsyncRead`/`AsyncWrite`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{WireError, DEVICE_ID_LENGTH, MAX_CHUNK_SIZE, USER_ID_LENGTH};

/// Reads exactly `n` bytes, failing with [`WireError::UnexpectedEof`] if the
/// peer closes the stream early.
pub async fn read_exact_bytes<R: AsyncRead + Unpin>(
    reader: &mut R,
    n: usize,
) -> Result<Vec<u8>, WireError> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::UnexpectedEof
        } else {
            WireError::Io(error)
        }
    })?;
    Ok(buf)
}

/// Writes the whole buffer, split so that no single write exceeds
/// [`MAX_CHUNK_SIZE`] bytes.
pub async fn write_chunked<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), WireError> {
    for chunk in bytes.chunks(MAX_CHUNK_SIZE) {
        writer.write_all(chunk).await?;
    }
    Ok(())
}

pub(crate) fn parse_decimal(bytes: &[u8]) -> Result<u64, WireError> {
    // strict: digits only, no sign, no whitespace
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return Err(WireError::BadDecimal(
            String::from_utf8_lossy(bytes).into_owned(),
        ));
    }
    let text = std::str::from_utf8(bytes).expect("ascii digits are valid UTF-8");
    text.parse::<u64>()
        .map_err(|_| WireError::BadDecimal(text.to_string()))
}

/// Reads a zero-padded ASCII decimal of exactly `width` characters.
pub async fn read_decimal<R: AsyncRead + Unpin>(
    reader: &mut R,
    width: usize,
) -> Result<u64, WireError> {
    let bytes = read_exact_bytes(reader, width).await?;
    parse_decimal(&bytes)
}

/// Renders `value` as a zero-padded decimal of exactly `width` characters.
pub fn format_decimal(value: u64, width: usize) -> Result<String, WireError> {
    let text = format!("{value:0width$}");
    if text.len() > width {
        return Err(WireError::FieldOverflow { value, width });
    }
    Ok(text)
}

pub async fn write_decimal<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: u64,
    width: usize,
) -> Result<(), WireError> {
    let text = format_decimal(value, width)?;
    writer.write_all(text.as_bytes()).await?;
    Ok(())
}

/// Reads and validates a 128-character user id. The all-zero sentinel is
/// legal; anything outside `[0-9a-zA-Z]` is not.
pub async fn read_user_id<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, WireError> {
    let bytes = read_exact_bytes(reader, USER_ID_LENGTH).await?;
    if !bytes.iter().all(u8::is_ascii_alphanumeric) {
        return Err(WireError::BadUserId);
    }
    String::from_utf8(bytes).map_err(|_| WireError::BadUserId)
}

pub async fn write_user_id<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: &str,
) -> Result<(), WireError> {
    debug_assert_eq!(id.len(), USER_ID_LENGTH);
    writer.write_all(id.as_bytes()).await?;
    Ok(())
}

/// Reads a device id field: `Some(n)` for an assigned id, `None` for the
/// `-1` enrolment sentinel.
pub async fn read_device_id<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<u32>, WireError> {
    let bytes = read_exact_bytes(reader, DEVICE_ID_LENGTH).await?;
    if bytes == b"-1" {
        return Ok(None);
    }
    Ok(Some(parse_decimal(&bytes)? as u32))
}

pub async fn write_device_id<W: AsyncWrite + Unpin>(
    writer: &mut W,
    id: Option<u32>,
) -> Result<(), WireError> {
    match id {
        None => writer.write_all(b"-1").await?,
        Some(id) => write_decimal(writer, u64::from(id), DEVICE_ID_LENGTH).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exact_bytes_round_trip() {
        // arbitrary payloads must come back byte-identical regardless of how
        // the writer fragments them
        for n in [0usize, 1, 999, 1000, 1001, 4096] {
            let payload: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            let (mut client, mut server) = tokio::io::duplex(64);
            let expected = payload.clone();
            let writer = tokio::spawn(async move {
                write_chunked(&mut client, &payload).await.unwrap();
            });
            let got = read_exact_bytes(&mut server, n).await.unwrap();
            writer.await.unwrap();
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn short_stream_is_unexpected_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, b"abc")
            .await
            .unwrap();
        drop(client);
        let error = read_exact_bytes(&mut server, 4).await.unwrap_err();
        assert!(matches!(error, WireError::UnexpectedEof));
    }

    #[tokio::test]
    async fn decimal_fields() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_decimal(&mut client, 42, 8).await.unwrap();
        assert_eq!(read_decimal(&mut server, 8).await.unwrap(), 42);
    }

    #[test]
    fn decimal_rejects_non_digits() {
        assert!(parse_decimal(b"12a4").is_err());
        assert!(parse_decimal(b"+123").is_err());
        assert!(parse_decimal(b" 123").is_err());
        assert!(parse_decimal(b"").is_err());
        assert_eq!(parse_decimal(b"00000042").unwrap(), 42);
    }

    #[test]
    fn decimal_overflow_is_rejected() {
        assert!(format_decimal(100, 2).is_err());
        assert_eq!(format_decimal(99, 2).unwrap(), "99");
        assert_eq!(format_decimal(7, 2).unwrap(), "07");
    }

    #[tokio::test]
    async fn device_id_sentinel() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_device_id(&mut client, None).await.unwrap();
        write_device_id(&mut client, Some(0)).await.unwrap();
        write_device_id(&mut client, Some(17)).await.unwrap();
        assert_eq!(read_device_id(&mut server).await.unwrap(), None);
        assert_eq!(read_device_id(&mut server).await.unwrap(), Some(0));
        assert_eq!(read_device_id(&mut server).await.unwrap(), Some(17));
    }

    #[tokio::test]
    async fn user_id_validation() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let id = crate::unassigned_user_id();
        write_user_id(&mut client, &id).await.unwrap();
        assert_eq!(read_user_id(&mut server).await.unwrap(), id);

        let (mut client, mut server) = tokio::io::duplex(256);
        let mut bad = crate::unassigned_user_id().into_bytes();
        bad[3] = b'!';
        tokio::io::AsyncWriteExt::write_all(&mut client, &bad)
            .await
            .unwrap();
        assert!(matches!(
            read_user_id(&mut server).await.unwrap_err(),
            WireError::BadUserId
        ));
    }
}
