//! Git push decoder for gitgate.
//!
//! Reads the body of a smart HTTP `git-receive-pack` request and recovers
//! the ref update it announces, plus the commit metadata of the leading
//! packfile object when that object is a commit.
//!
//! ```text
//! body ──► pktline::split_frame ──► Command::parse ─────────────┐
//!              │                                                ▼
//!              └─► pack::locate_first_object ─► pack::inflate ─► CommitRecord::decode ─► PushEvent
//! ```
//!
//! Framing errors fail the whole decode. Anything that goes wrong past the
//! command line only drops the commit metadata.

mod command;
mod commit;
mod error;
mod pack;
mod pktline;
mod push;

pub use command::{Command, ZERO_ID};
pub use commit::CommitRecord;
pub use error::DecodeError;
pub use pack::{
    inflate, inflate_with_limit, locate_first_object, ObjectKind, ObjectLocation, PackBuilder,
    MAX_INFLATED_SIZE,
};
pub use pktline::{encode_line, split_frame, Frame, FLUSH};
pub use push::{decode_commit, PushEvent};

/// Result type for push decoding.
pub type Result<T> = std::result::Result<T, DecodeError>;
