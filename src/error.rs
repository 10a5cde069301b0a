//! Error types for the conversion pipeline.
//!
//! Fatal errors abort the whole job and are surfaced to the caller as one
//! human-readable message. Unresolved image references and TOC length drift
//! are *not* errors — they are logged as warnings and the job continues.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a conversion job.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The source file could not be read.
    #[error("failed to read input '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input extension is neither `.epub` nor `.txt`.
    #[error("unsupported input type '{0}' (expected .epub or .txt)")]
    UnsupportedInput(PathBuf),

    /// The EPUB container or its manifest could not be parsed.
    #[error("malformed book '{path}': {message}")]
    MalformedBook { path: PathBuf, message: String },

    /// The rendering collaborator failed on a chapter or the TOC. Fatal.
    #[error("render failed for {context}: {message}")]
    Render { context: String, message: String },

    /// Nothing to render: the book has no document items.
    #[error("no renderable content in '{0}'")]
    EmptyBook(PathBuf),

    /// The destination file could not be written.
    #[error("failed to write output '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConvertError {
    /// Shorthand for renderer failures.
    pub fn render(context: impl Into<String>, message: impl Into<String>) -> Self {
        ConvertError::Render {
            context: context.into(),
            message: message.into(),
        }
    }
}
