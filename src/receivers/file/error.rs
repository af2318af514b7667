// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid glob pattern `{pattern}`: {source}")]
    InvalidGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("invalid multiline pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("checkpoint data is corrupt: {0}")]
    CheckpointCorrupt(String),

    #[error("downstream pipeline closed")]
    PipelineClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
