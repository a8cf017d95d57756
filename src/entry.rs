//! # Archive Entry Types
//!
//! Vista in sola lettura di una entry dell'archivio sorgente e risultato
//! della sua ricompressione.

use zip::CompressionMethod;

/// Metadata carried over when an entry is replaced in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub compression: CompressionMethod,
    pub last_modified: Option<zip::DateTime>,
    pub unix_mode: Option<u32>,
}

/// One stored item of the source archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub raw_bytes: Vec<u8>,
    pub metadata: EntryMetadata,
}

impl ArchiveEntry {
    pub fn size(&self) -> usize {
        self.raw_bytes.len()
    }
}

/// Outcome of recompressing one entry.
///
/// `Replaced` is only ever built through the acceptance gates, so its bytes
/// are always shorter than the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompressionResult {
    /// Copy the original bytes and metadata verbatim
    Unchanged,
    /// Store these bytes instead
    Replaced(Vec<u8>),
}

impl RecompressionResult {
    /// Accept `candidate` only when strictly smaller than the original.
    pub fn accept_if_smaller(original_len: usize, candidate: Vec<u8>) -> Self {
        if candidate.len() < original_len {
            RecompressionResult::Replaced(candidate)
        } else {
            RecompressionResult::Unchanged
        }
    }

    /// Accept `candidate` only when below `original_len * ratio`.
    pub fn accept_if_below_ratio(original_len: usize, candidate: Vec<u8>, ratio: f64) -> Self {
        let ceiling = original_len as f64 * ratio;
        if (candidate.len() as f64) < ceiling && candidate.len() < original_len {
            RecompressionResult::Replaced(candidate)
        } else {
            RecompressionResult::Unchanged
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, RecompressionResult::Replaced(_))
    }
}
