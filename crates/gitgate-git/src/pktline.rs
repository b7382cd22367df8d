//! Git pkt-line framing for push request bodies.
//!
//! A `git-receive-pack` request body starts with a pkt-line carrying the
//! ref update command. Each pkt-line is prefixed with a 4-character hex
//! length that counts the prefix itself. Whatever follows the first line is
//! treated as the packfile payload.

use crate::{DecodeError, Result};

/// Width of the hex length prefix.
const LENGTH_PREFIX: usize = 4;

/// Flush packet.
pub const FLUSH: &[u8; 4] = b"0000";

/// The first pkt-line of a push body and the bytes that follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Command line payload, without the length prefix.
    pub line: &'a [u8],
    /// Everything after the first pkt-line. May be empty.
    pub pack: &'a [u8],
}

/// Splits a push body into its first pkt-line and the trailing payload.
pub fn split_frame(body: &[u8]) -> Result<Frame<'_>> {
    let prefix = body
        .get(..LENGTH_PREFIX)
        .ok_or_else(|| DecodeError::Frame(format!("body too short: {} bytes", body.len())))?;

    // from_str_radix tolerates a leading '+', git does not.
    if !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(DecodeError::Frame(format!(
            "non-hex length prefix: {:?}",
            String::from_utf8_lossy(prefix)
        )));
    }

    let len = std::str::from_utf8(prefix)
        .ok()
        .and_then(|hex| u16::from_str_radix(hex, 16).ok())
        .ok_or_else(|| DecodeError::Frame("invalid length prefix".to_string()))?
        as usize;

    if len < LENGTH_PREFIX {
        return Err(DecodeError::Frame(format!("length too small: {}", len)));
    }
    if len > body.len() {
        return Err(DecodeError::Frame(format!(
            "length {} exceeds body of {} bytes",
            len,
            body.len()
        )));
    }

    Ok(Frame {
        line: &body[LENGTH_PREFIX..len],
        pack: &body[len..],
    })
}

/// Encodes `data` as a single pkt-line.
pub fn encode_line(data: &[u8]) -> Vec<u8> {
    let mut result = format!("{:04x}", data.len() + LENGTH_PREFIX).into_bytes();
    result.extend_from_slice(data);
    result
}
