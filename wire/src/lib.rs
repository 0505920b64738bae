//! Wire protocol for the rdrive folder synchronization tools.
//!
//! # Protocol Overview
//!
//! Devices talk to the server over plain TCP. Every request starts with the
//! same header, after which the server decides what kind of round this is:
//!
//! ```text
//! Device                                  Server
//!   |                                       |
//!   |  -- user id (128) ------------------> |
//!   |  -- device id (2) ------------------> |
//!   |  -- command batch (2-char count) ---> |  apply, fan out to peers
//!   |                                       |
//!   |  <-- pending peer batch ------------- |
//!   |  <-- 'A' ---------------------------- |  round acknowledged
//! ```
//!
//! A brand-new user sends the all-zero user id sentinel and an empty batch;
//! the server answers with a fresh id and then receives the device's folder.
//! A new device of an existing user sends the `-1` device id sentinel and an
//! empty batch; the server answers with the assigned device id and then
//! sends the authoritative folder. Neither handshake carries the `'A'` byte,
//! the folder transfer is self-delimiting.
//!
//! All protocol integers are zero-padded ASCII decimals of fixed widths, so
//! the framing can be read with exact-count reads only. Large payloads are
//! written in slices of at most [`MAX_CHUNK_SIZE`] bytes; receivers always
//! reassemble by declared length, never by observed fragmentation.
//!
//! # Module Organization
//!
//! - [`frame`] - exact reads/writes and fixed-width decimal fields
//! - [`command`] - the replicated change command codec
//! - [`transfer`] - whole-folder upload/download for onboarding

pub mod command;
pub mod frame;
pub mod transfer;

pub use command::Command;

/// Width of the user id field; ids are drawn from `[0-9a-zA-Z]`.
pub const USER_ID_LENGTH: usize = 128;
/// Width of the device id field; `-1` marks a device requesting enrolment.
pub const DEVICE_ID_LENGTH: usize = 2;
/// Width of the per-batch command count field.
pub const COUNT_LENGTH: usize = 2;
/// Width of the per-command length prefix; the length counts itself.
pub const COMMAND_LEN_LENGTH: usize = 8;
/// Width of the embedded path-length fields in modify and move records.
pub const PATH_LEN_LENGTH: usize = 3;
/// Upper bound on a single write when streaming large payloads.
pub const MAX_CHUNK_SIZE: usize = 1000;
/// Commands a single batch can carry (two decimal digits).
pub const MAX_BATCH_COMMANDS: usize = 99;
/// Acknowledgement byte closing a successful sync round.
pub const ACK: u8 = b'A';
/// Bound on establishing the server connection.
pub const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
/// Bound on waiting for the server reply and acknowledgement.
pub const REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// The sentinel user id a brand-new device announces itself with.
pub fn unassigned_user_id() -> String {
    "0".repeat(USER_ID_LENGTH)
}

/// True for the all-zero sentinel id.
pub fn is_unassigned_user_id(id: &str) -> bool {
    id.len() == USER_ID_LENGTH && id.bytes().all(|b| b == b'0')
}

/// Failures raised by the codec layers.
///
/// Transport-level failures (`UnexpectedEof`, `Io`) abort the current round
/// and are retried on the next tick; everything else is a protocol error and
/// fatal for the connection.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection closed mid-frame")]
    UnexpectedEof,
    #[error("malformed decimal field {0:?}")]
    BadDecimal(String),
    #[error("unknown command tag {0:?}")]
    UnknownTag(char),
    #[error("invalid directory flag {0:?}")]
    BadDirFlag(char),
    #[error("malformed user id")]
    BadUserId,
    #[error("malformed device id {0:?}")]
    BadDeviceId(String),
    #[error("command path is not valid UTF-8")]
    BadPath,
    #[error("command record too short ({0} bytes)")]
    TruncatedCommand(usize),
    #[error("value {value} does not fit in a {width}-character field")]
    FieldOverflow { value: u64, width: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
