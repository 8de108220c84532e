use std::error::Error;
use std::fmt;

/// Error taxonomy for loading, decoding and mutating a .d2s buffer.
///
/// Only `BufferTooShort`, `InvalidSignature` and `UnsupportedVersion` are
/// fatal for the whole file. Everything else is scoped to one section, one
/// item or one operation; batch operations collect these per item instead
/// of aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    BufferTooShort {
        len: usize,
        need: usize,
    },
    InvalidSignature {
        found: [u8; 4],
    },
    UnsupportedVersion {
        found: u32,
    },
    MalformedSection {
        section: &'static str,
        reason: String,
    },
    TruncatedItem {
        offset: usize,
        reason: String,
    },
    UnknownModificationId {
        id: u16,
        bit_offset: usize,
    },
    PlacementFailed {
        item: String,
    },
    ConstraintViolation {
        item: String,
        reason: String,
    },
    BitRange {
        start: usize,
        end: usize,
        len_bits: usize,
    },
    ValueOverflow {
        value: u64,
        width: usize,
    },
    Io {
        context: String,
    },
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort { len, need } => {
                write!(f, "buffer of {len} bytes is too short, need at least {need}")
            }
            Self::InvalidSignature { found } => {
                write!(f, "invalid save signature {found:02X?}")
            }
            Self::UnsupportedVersion { found } => {
                write!(
                    f,
                    "unsupported save version {found}, only version 96 (v1.10-v1.14d) is handled"
                )
            }
            Self::MalformedSection { section, reason } => {
                write!(f, "malformed {section} section: {reason}")
            }
            Self::TruncatedItem { offset, reason } => {
                write!(f, "truncated item at byte offset {offset}: {reason}")
            }
            Self::UnknownModificationId { id, bit_offset } => {
                write!(f, "unknown modification id {id} at bit offset {bit_offset}")
            }
            Self::PlacementFailed { item } => {
                write!(f, "no free storage slot for item '{item}'")
            }
            Self::ConstraintViolation { item, reason } => {
                write!(f, "refused mutation of '{item}': {reason}")
            }
            Self::BitRange { start, end, len_bits } => {
                write!(f, "bit range {start}..{end} is invalid for a {len_bits}-bit buffer")
            }
            Self::ValueOverflow { value, width } => {
                write!(f, "value {value} does not fit in {width} bits")
            }
            Self::Io { context } => write!(f, "io error: {context}"),
        }
    }
}

impl Error for SaveError {}

impl SaveError {
    pub fn io(context: impl Into<String>) -> Self {
        Self::Io {
            context: context.into(),
        }
    }

    pub fn refused(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            item: item.into(),
            reason: reason.into(),
        }
    }
}
