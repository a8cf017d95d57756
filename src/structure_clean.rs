//! # Structure Clean
//!
//! Hook opzionale per ripulire la struttura interna di una presentazione
//! (layout inutilizzati) prima della ricompressione.
//!
//! La pipeline lo invoca solo per i file `.pptx`. Un cleaner che non è disponibile
//! o fallisce restituisce `None` e la pipeline lavora sull'input originale.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A cleaned temporary copy of the input. The scratch directory is removed on drop.
#[derive(Debug)]
pub struct CleanedDocument {
    path: PathBuf,
    _scratch: TempDir,
}

impl CleanedDocument {
    /// Wrap a cleaned file living inside `scratch`.
    pub fn new(path: PathBuf, scratch: TempDir) -> Self {
        Self {
            path,
            _scratch: scratch,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Capability that may rewrite a presentation before recompression
pub trait StructureCleaner: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a cleaned copy of `input`, or `None` when unavailable or failed.
    fn try_clean(&self, input: &Path) -> Option<CleanedDocument>;
}

/// Default cleaner: never available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStructureClean;

impl StructureCleaner for NoStructureClean {
    fn name(&self) -> &str {
        "none"
    }

    fn try_clean(&self, _input: &Path) -> Option<CleanedDocument> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_structure_clean_is_unavailable() {
        let cleaner = NoStructureClean;
        assert_eq!(cleaner.name(), "none");
        assert!(cleaner.try_clean(Path::new("deck.pptx")).is_none());
    }

    #[test]
    fn test_cleaned_document_removes_scratch_on_drop() {
        let scratch = TempDir::new().unwrap();
        let scratch_path = scratch.path().to_path_buf();
        let cleaned_path = scratch_path.join("cleaned.pptx");
        std::fs::write(&cleaned_path, b"pk").unwrap();

        let cleaned = CleanedDocument::new(cleaned_path.clone(), scratch);
        assert_eq!(cleaned.path(), cleaned_path.as_path());
        assert!(scratch_path.exists());

        drop(cleaned);
        assert!(!scratch_path.exists());
    }
}
