//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore strutturati della pipeline.
//!
//! ## Responsabilità:
//! - `CompressError`: errori a livello di run (fatali per il documento corrente)
//! - `ValidationError`: input rifiutato prima di qualsiasi modifica
//! - `EntryError`: errori sulla singola entry dell'archivio, sempre recuperati
//!   copiando i byte originali
//!
//! ## Politica di propagazione:
//! - Gli errori di entry non interrompono mai il run
//! - Gli errori di run interrompono il run e tentano il ripristino dal backup
//! - Gli errori di validazione non avviano mai la ricompressione
//!
//! ## Esempio:
//! ```ignore
//! match compressor.compress(&input, &output, sinks).await {
//!     Err(CompressError::Validation(ValidationError::TooLarge { .. })) => skip(),
//!     Err(e) => report(e),
//!     Ok(outcome) => println!("{}", outcome.saved_bytes()),
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Run-level failure of a single document compression.
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Output archive was not produced: {0}")]
    OutputMissing(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CompressError {
    /// True when no backup or output was touched because the input was rejected up front.
    pub fn is_validation(&self) -> bool {
        matches!(self, CompressError::Validation(_))
    }
}

/// Reasons an input document is rejected before any work starts.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("File does not exist: {0}")]
    NotFound(PathBuf),

    #[error("File too large ({size} bytes > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Not a supported Office file (.pptx, .docx, .xlsx): {0}")]
    UnsupportedType(PathBuf),

    #[error("Not a valid ZIP/Office file: {0}")]
    NotAnArchive(String),

    #[error("Not a valid Office file (missing {0})")]
    MissingManifest(String),

    #[error("Output path must differ from the input: {0}")]
    OutputIsInput(PathBuf),
}

/// Failure while recompressing one archive entry. Never escapes the rewriter.
#[derive(thiserror::Error, Debug)]
pub enum EntryError {
    #[error("Image decode error: {0}")]
    Decode(image::ImageError),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error("Transcoder failed: {0}")]
    Transcode(String),

    #[error("Transcoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<png::EncodingError> for EntryError {
    fn from(err: png::EncodingError) -> Self {
        EntryError::Encode(err.to_string())
    }
}
