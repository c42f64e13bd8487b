use thiserror::Error;

use crate::domain::ChunkId;

#[derive(Error, Debug)]
pub enum ChunkStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structure present but invalid: bad magic, checksum mismatch, missing fields.
    #[error("corrupt {what}: {detail}")]
    Corrupt { what: String, detail: String },

    /// A declared length or offset runs past the end of the input.
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: String,
        needed: u64,
        available: u64,
    },

    #[error("digest mismatch for chunk {id}")]
    Verification { id: ChunkId },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("argument error: {0}")]
    Argument(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ChunkStoreError {
    pub fn corrupt(what: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    pub fn truncated(what: impl Into<String>, needed: u64, available: u64) -> Self {
        Self::Truncated {
            what: what.into(),
            needed,
            available,
        }
    }

    /// Corrupt and truncated inputs are both parse failures.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Truncated { .. })
    }

    /// Errors the user can fix by changing the command line.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Argument(_) | Self::Config(_))
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ChunkStoreError>;
