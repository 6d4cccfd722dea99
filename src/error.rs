use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetDictError {
    /// A capture record is truncated or its length prefix runs past the end
    /// of the stream.
    #[error(
        "malformed capture {source_name}: record {record} at offset {offset} declares {declared} bytes but only {available} remain"
    )]
    MalformedCapture {
        source_name: String,
        record: usize,
        offset: u64,
        declared: u64,
        available: u64,
    },

    /// Too few capture files to merge.
    #[error("insufficient input: found {found} capture file(s), at least 2 are required to merge")]
    InsufficientInput { found: usize },

    /// No packets were read from any source.
    #[error("no packets found in {sources} capture file(s)")]
    EmptyCapture { sources: usize },

    /// The training primitive rejected its input.
    #[error("dictionary training failed ({context}): {reason}")]
    TrainingFailed { context: String, reason: String },

    /// Every trial of a generation failed to produce a dictionary.
    #[error("trial search exhausted: all {trials} trial(s) of generation {generation} failed")]
    SearchExhausted { generation: usize, trials: usize },

    /// A single file of a debug dump could not be converted.
    #[error("debug dump of '{}' failed: {reason}", path.display())]
    DumpIo { path: PathBuf, reason: String },

    /// Invalid tunables or an unreadable settings file.
    #[error("config error: {0}")]
    Config(String),

    /// Propagated I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetDictError>;
