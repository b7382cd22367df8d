//! Push decoding error types.

use thiserror::Error;

/// Errors that can occur while decoding a push request body.
///
/// `Frame` and `CommandFormat` mean the push itself could not be read.
/// The remaining variants only affect commit enrichment and are downgraded
/// by [`PushEvent::decode`](crate::PushEvent::decode).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Invalid pkt-line length prefix.
    #[error("invalid pkt-line frame: {0}")]
    Frame(String),

    /// Command line with fewer than three fields.
    #[error("invalid command line: {0:?}")]
    CommandFormat(String),

    /// No `PACK` signature in the payload.
    #[error("no PACK signature found")]
    SignatureNotFound,

    /// Leading pack entry is not a commit.
    #[error("unsupported leading object: {kind} (type {code})")]
    UnsupportedObjectType {
        /// Raw 3-bit type code.
        code: u8,
        /// Human readable kind.
        kind: &'static str,
    },

    /// Object header runs past the end of the buffer.
    #[error("truncated object header at offset {0}")]
    TruncatedHeader(usize),

    /// zlib stream is corrupt or ends early.
    #[error("inflate failed: {0}")]
    Inflate(#[from] std::io::Error),
}

impl DecodeError {
    /// Returns true if the error means the push could not be read at all.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Frame(_) | Self::CommandFormat(_))
    }
}
