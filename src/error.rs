//! Error types for the translation pipeline.
//!
//! Every variant is fatal: the pipeline never catches or retries, it hands
//! the error straight back to the caller.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input could not be read or output could not be created
    #[error("cannot access {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The byte stream is not a valid PDF
    #[error("failed to parse PDF {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// No pretrained model exists for the requested language pair
    #[error("no pretrained translation model '{model_id}': {message}")]
    ModelNotFound { model_id: String, message: String },

    /// The model exists but its config, weights or tokenizer are unusable
    #[error("failed to load model '{model_id}': {message}")]
    ModelLoad { model_id: String, message: String },

    /// Character the output font cannot encode
    #[error("character {ch:?} (U+{code:04X}) at position {position} is not supported by the output font", code = codepoint(.ch))]
    Encoding { ch: char, position: usize },

    /// Model runtime failure on a single segment
    #[error("translation failed on segment {index}: {message}")]
    Translation { index: usize, message: String },

    /// The PDF document could not be serialized
    #[error("failed to write PDF {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

fn codepoint(ch: &char) -> u32 {
    *ch as u32
}

impl Error {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }
}
