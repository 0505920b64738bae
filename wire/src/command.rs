//! Codec for the replicated change commands.
//!
//! Every record travels as an 8-character zero-padded total length (the
//! length counts its own 8 bytes), a 1-character kind tag, then a
//! kind-specific payload. Modify contents are opaque bytes end to end; a
//! record is never decoded as text past its path fields.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::frame;
use crate::{WireError, COMMAND_LEN_LENGTH, COUNT_LENGTH, PATH_LEN_LENGTH};

const TAG_CREATE: u8 = b'1';
const TAG_DELETE: u8 = b'2';
const TAG_MODIFY: u8 = b'3';
const TAG_MOVE: u8 = b'4';

/// One atomic folder change, as captured on a device and replayed on its
/// peers. Paths are relative to the folder root and use `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { is_dir: bool, path: String },
    Delete { is_dir: bool, path: String },
    Modify { path: String, contents: Vec<u8> },
    Move { from: String, to: String },
}

impl Command {
    /// Serialises the full record, length prefix included.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut payload = Vec::new();
        match self {
            Command::Create { is_dir, path } => {
                payload.push(TAG_CREATE);
                payload.push(if *is_dir { b'1' } else { b'0' });
                payload.extend_from_slice(path.as_bytes());
            }
            Command::Delete { is_dir, path } => {
                payload.push(TAG_DELETE);
                payload.push(if *is_dir { b'1' } else { b'0' });
                payload.extend_from_slice(path.as_bytes());
            }
            Command::Modify { path, contents } => {
                payload.push(TAG_MODIFY);
                payload.extend_from_slice(
                    frame::format_decimal(path.len() as u64, PATH_LEN_LENGTH)?.as_bytes(),
                );
                payload.extend_from_slice(path.as_bytes());
                payload.extend_from_slice(contents);
            }
            Command::Move { from, to } => {
                payload.push(TAG_MOVE);
                payload.extend_from_slice(
                    frame::format_decimal(from.len() as u64, PATH_LEN_LENGTH)?.as_bytes(),
                );
                payload.extend_from_slice(from.as_bytes());
                payload.extend_from_slice(to.as_bytes());
            }
        }
        let total = (payload.len() + COMMAND_LEN_LENGTH) as u64;
        let mut record = frame::format_decimal(total, COMMAND_LEN_LENGTH)?.into_bytes();
        record.append(&mut payload);
        Ok(record)
    }

    /// Decodes a record body (everything after the 8-character length
    /// prefix).
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        let (&tag, rest) = body
            .split_first()
            .ok_or(WireError::TruncatedCommand(body.len()))?;
        match tag {
            TAG_CREATE | TAG_DELETE => {
                let (&flag, path) = rest
                    .split_first()
                    .ok_or(WireError::TruncatedCommand(body.len()))?;
                let is_dir = match flag {
                    b'0' => false,
                    b'1' => true,
                    other => return Err(WireError::BadDirFlag(char::from(other))),
                };
                let path = decode_path(path)?;
                if tag == TAG_CREATE {
                    Ok(Command::Create { is_dir, path })
                } else {
                    Ok(Command::Delete { is_dir, path })
                }
            }
            TAG_MODIFY => {
                let (path, contents) = split_prefixed_path(rest, body.len())?;
                Ok(Command::Modify {
                    path,
                    contents: contents.to_vec(),
                })
            }
            TAG_MOVE => {
                let (from, to) = split_prefixed_path(rest, body.len())?;
                Ok(Command::Move {
                    from,
                    to: decode_path(to)?,
                })
            }
            other => Err(WireError::UnknownTag(char::from(other))),
        }
    }
}

fn decode_path(bytes: &[u8]) -> Result<String, WireError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| WireError::BadPath)
}

/// Splits `rest` into a 3-character-length-prefixed path and the remaining
/// payload bytes.
fn split_prefixed_path(rest: &[u8], record_len: usize) -> Result<(String, &[u8]), WireError> {
    if rest.len() < PATH_LEN_LENGTH {
        return Err(WireError::TruncatedCommand(record_len));
    }
    let (len_field, rest) = rest.split_at(PATH_LEN_LENGTH);
    let path_len = frame::parse_decimal(len_field)? as usize;
    if rest.len() < path_len {
        return Err(WireError::TruncatedCommand(record_len));
    }
    let (path, remainder) = rest.split_at(path_len);
    Ok((decode_path(path)?, remainder))
}

/// Reads one length-prefixed command record from the stream.
pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Command, WireError> {
    let total = frame::read_decimal(reader, COMMAND_LEN_LENGTH).await? as usize;
    if total <= COMMAND_LEN_LENGTH {
        return Err(WireError::TruncatedCommand(total));
    }
    let body = frame::read_exact_bytes(reader, total - COMMAND_LEN_LENGTH).await?;
    Command::decode(&body)
}

/// Writes one command record, chunking the payload for large contents.
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: &Command,
) -> Result<(), WireError> {
    let record = command.encode()?;
    frame::write_chunked(writer, &record).await
}

/// Reads a batch: a two-digit count followed by that many commands.
pub async fn read_batch<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<Command>, WireError> {
    let count = frame::read_decimal(reader, COUNT_LENGTH).await? as usize;
    let mut commands = Vec::with_capacity(count);
    for _ in 0..count {
        commands.push(read_command(reader).await?);
    }
    Ok(commands)
}

/// Writes a batch of at most [`crate::MAX_BATCH_COMMANDS`] commands.
pub async fn write_batch<W: AsyncWrite + Unpin>(
    writer: &mut W,
    commands: &[Command],
) -> Result<(), WireError> {
    frame::write_decimal(writer, commands.len() as u64, COUNT_LENGTH).await?;
    for command in commands {
        write_command(writer, command).await?;
    }
    Ok(())
}
