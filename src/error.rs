use std::fmt;
use std::io;
use std::str::Utf8Error;

use thiserror::Error;

/// Phase of an extraction run in which a block failed to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// First pass: filtering entities and collecting referenced ids.
    Candidates,
    /// Intermediate pass: capturing ways that are members of matching relations.
    MemberWays,
    /// Second pass: capturing coordinates of referenced nodes.
    Coordinates,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Candidates => "candidates",
            Phase::MemberWays => "member-ways",
            Phase::Coordinates => "coordinates",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt blob framing at offset {offset}: {reason}")]
    CorruptFraming { offset: u64, reason: String },

    #[error("unsupported blob encoding {encoding} at offset {offset}")]
    UnsupportedBlobEncoding {
        offset: u64,
        encoding: &'static str,
    },

    #[error("truncated primitive in block at offset {offset}: {reason}")]
    TruncatedPrimitive { offset: u64, reason: String },

    #[error("string table index {index} out of range (len {len}) in block at offset {offset}")]
    StringTableIndexOutOfRange { offset: u64, index: usize, len: usize },

    #[error("invalid UTF-8 in string table of block at offset {offset}: {source}")]
    InvalidUtf8 {
        offset: u64,
        #[source]
        source: Utf8Error,
    },

    #[error("block at offset {offset} contains sparse nodes, only dense nodes are supported")]
    UnsupportedSparseNodes { offset: u64 },

    #[error("file requires unsupported feature {feature:?}")]
    UnsupportedFeature { feature: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error("{phase} scan failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn truncated(offset: u64, reason: impl Into<String>) -> Self {
        Error::TruncatedPrimitive {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn in_phase(self, phase: Phase) -> Self {
        match self {
            // already attributed
            e @ Error::Phase { .. } => e,
            e => Error::Phase {
                phase,
                source: Box::new(e),
            },
        }
    }

    /// Returns the innermost error, unwrapping phase attribution.
    pub fn root(&self) -> &Error {
        match self {
            Error::Phase { source, .. } => source.root(),
            e => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
