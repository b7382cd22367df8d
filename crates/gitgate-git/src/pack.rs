//! Git pack file handling for pushed commits.
//!
//! Only the leading entry of a pack is looked at. Its type/size header is
//! decoded and, when it is a commit, its zlib payload is inflated. Delta
//! entries and the rest of the pack are left alone.
//! See: https://git-scm.com/docs/pack-format

use crate::{DecodeError, Result};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use sha1::{Digest, Sha1};
use std::io::{self, Write};

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Signature, version and object count.
const PACK_HEADER_LEN: usize = 12;
/// Pack file version written by [`PackBuilder`].
const PACK_VERSION: u32 = 2;
/// Output buffer size per inflate step.
const INFLATE_CHUNK: usize = 4096;
/// Largest object [`inflate`] will produce.
pub const MAX_INFLATED_SIZE: usize = 16 * 1024 * 1024;

/// Pack entry type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Type 1.
    Commit,
    /// Type 2.
    Tree,
    /// Type 3.
    Blob,
    /// Type 4.
    Tag,
    /// Type 6, delta against an earlier entry by offset.
    OfsDelta,
    /// Type 7, delta against an object by id.
    RefDelta,
    /// Codes 0 and 5.
    Reserved(u8),
}

impl ObjectKind {
    /// Maps a 3-bit pack type code.
    pub fn from_code(code: u8) -> Self {
        match code & 0x07 {
            1 => Self::Commit,
            2 => Self::Tree,
            3 => Self::Blob,
            4 => Self::Tag,
            6 => Self::OfsDelta,
            7 => Self::RefDelta,
            other => Self::Reserved(other),
        }
    }

    /// Returns the pack type code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta => 6,
            Self::RefDelta => 7,
            Self::Reserved(code) => *code,
        }
    }

    /// Returns the name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
            Self::OfsDelta => "ofs-delta",
            Self::RefDelta => "ref-delta",
            Self::Reserved(_) => "reserved",
        }
    }
}

/// Where the leading pack entry's compressed data starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Entry type. Always [`ObjectKind::Commit`] when returned by
    /// [`locate_first_object`].
    pub kind: ObjectKind,
    /// Inflated size declared by the entry header.
    pub size: u64,
    /// Offset of the zlib stream within the scanned buffer.
    pub data_offset: usize,
}

/// Finds the leading commit entry in a pack payload.
///
/// The payload is scanned for the `PACK` signature; version and object
/// count are skipped without being checked.
pub fn locate_first_object(data: &[u8]) -> Result<ObjectLocation> {
    let start = data
        .windows(PACK_SIGNATURE.len())
        .position(|w| w == PACK_SIGNATURE)
        .ok_or(DecodeError::SignatureNotFound)?;

    let mut pos = start + PACK_HEADER_LEN;
    let first_byte = *data.get(pos).ok_or(DecodeError::TruncatedHeader(pos))?;

    let kind = ObjectKind::from_code(first_byte >> 4);
    if kind != ObjectKind::Commit {
        return Err(DecodeError::UnsupportedObjectType {
            code: kind.code(),
            kind: kind.as_str(),
        });
    }

    // First byte: (MSB=more bytes) (3 bits type) (4 bits size)
    let mut size = u64::from(first_byte & 0x0F);
    let mut shift = 4u32;
    let mut byte = first_byte;

    // Additional size bytes (7 bits each, MSB=continue)
    while byte & 0x80 != 0 {
        pos += 1;
        byte = *data.get(pos).ok_or(DecodeError::TruncatedHeader(pos))?;
        if shift < u64::BITS {
            size |= u64::from(byte & 0x7F) << shift;
        }
        shift = shift.saturating_add(7);
    }

    Ok(ObjectLocation {
        kind,
        size,
        data_offset: pos + 1,
    })
}

/// Inflates a zlib stream, stopping at the stream's end marker.
///
/// Trailing bytes after the end marker (the next pack entry, the pack
/// checksum) are ignored. A stream that runs out of input before its end
/// marker, or that expands past [`MAX_INFLATED_SIZE`], is an error.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    inflate_with_limit(compressed, MAX_INFLATED_SIZE)
}

/// Like [`inflate`], with an explicit ceiling on the output size.
pub fn inflate_with_limit(compressed: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = Decompress::new(true);
    let mut out = Vec::new();
    let mut chunk = [0u8; INFLATE_CHUNK];

    loop {
        let in_before = decoder.total_in();
        let out_before = decoder.total_out();
        let input = &compressed[in_before as usize..];

        let status = decoder
            .decompress(input, &mut chunk, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let produced = (decoder.total_out() - out_before) as usize;
        if out.len() + produced > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("inflated object exceeds {} bytes", limit),
            )
            .into());
        }
        out.extend_from_slice(&chunk[..produced]);

        if status == Status::StreamEnd {
            return Ok(out);
        }

        if decoder.total_in() == in_before && produced == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("zlib stream ended after {} bytes", decoder.total_in()),
            )
            .into());
        }
    }
}

/// Builds a pack file from a sequence of raw entries.
///
/// Writes what [`locate_first_object`] reads: the 12-byte header, each
/// entry's type/size header followed by its zlib payload, and the SHA-1
/// trailer.
pub struct PackBuilder {
    entries: Vec<(ObjectKind, Vec<u8>)>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds an entry to the pack.
    pub fn add(&mut self, kind: ObjectKind, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push((kind, data.into()));
        self
    }

    /// Builds the pack file.
    pub fn build(&self) -> io::Result<Vec<u8>> {
        let mut pack = Vec::new();

        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for (kind, data) in &self.entries {
            pack.extend_from_slice(&encode_entry_header(*kind, data.len() as u64));

            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            pack.extend_from_slice(&encoder.finish()?);
        }

        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);

        Ok(pack)
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a pack entry's type/size header.
pub(crate) fn encode_entry_header(kind: ObjectKind, size: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(10);
    let mut first_byte = ((kind.code() & 0x07) << 4) | (size & 0x0F) as u8;
    let mut remaining = size >> 4;

    if remaining > 0 {
        first_byte |= 0x80;
    }
    header.push(first_byte);

    while remaining > 0 {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        header.push(byte);
    }

    header
}
