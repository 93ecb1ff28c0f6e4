//! Error taxonomy for the solver core.
//!
//! Four classes, matching how callers are expected to react:
//! - configuration errors, rejected when a [`crate::topology::Topology`] is built
//! - invalid arguments (illegal roll or move, state outside the encodable domain)
//! - lookup misses, which mean a table was populated incompletely
//! - file errors, surfaced before any training work starts

use std::path::PathBuf;

use thiserror::Error;

use crate::store::ValueType;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("illegal roll {roll} (these dice roll {legal:?})")]
    IllegalRoll { roll: u8, legal: Vec<u8> },

    #[error("illegal move from path index {source_index} with roll {roll}")]
    IllegalMove { source_index: u8, roll: u8 },

    #[error("no roll is waiting for a move")]
    NoPendingRoll,

    #[error("a roll of {roll} is already waiting for a move")]
    RollPending { roll: u8 },

    #[error("the game is already finished")]
    GameFinished,

    #[error("invalid game snapshot: {message}")]
    InvalidSnapshot { message: String },

    #[error("key {key:#x} does not encode a state: {message}")]
    NotEncodable { key: u64, message: String },

    #[error("state key {key:#x} (shard {upper}) is missing from the table")]
    MissingState { key: u64, upper: u32 },

    #[error("duplicate key {lower:#x} in shard {upper}")]
    DuplicateKey { upper: u32, lower: u32 },

    #[error("shard {upper} is out of sync with the enumeration at index {index}")]
    ShardOutOfSync { upper: u32, index: usize },

    #[error("raw access is not defined for {value_type} values")]
    RawAccess { value_type: ValueType },

    #[error("expected {expected} values but the table holds {found}")]
    WrongValueType { expected: ValueType, found: ValueType },

    #[error("corrupt file {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn snapshot(message: impl Into<String>) -> Self {
        Error::InvalidSnapshot {
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
