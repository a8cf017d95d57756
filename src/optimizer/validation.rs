//! # Input Validation
//!
//! Controlli eseguiti prima di qualsiasi backup o scrittura:
//! esistenza, dimensione massima, suffisso Office, archivio zip leggibile
//! con il manifest `[Content_Types].xml`, e un path di output diverso
//! dall'input.

use crate::config::{MAX_INPUT_SIZE, REQUIRED_MANIFEST};
use crate::error::ValidationError;
use crate::file_manager::FileManager;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Validate an input document and return its size in bytes.
pub fn validate_input(path: &Path) -> Result<u64, ValidationError> {
    validate_input_with_limit(path, MAX_INPUT_SIZE)
}

pub(crate) fn validate_input_with_limit(path: &Path, limit: u64) -> Result<u64, ValidationError> {
    let metadata = std::fs::metadata(path).map_err(|_| ValidationError::NotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ValidationError::NotFound(path.to_path_buf()));
    }

    let size = metadata.len();
    if size > limit {
        return Err(ValidationError::TooLarge { size, limit });
    }

    if !FileManager::is_office_document(path) {
        return Err(ValidationError::UnsupportedType(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| ValidationError::NotAnArchive(e.to_string()))?;
    let archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| ValidationError::NotAnArchive(e.to_string()))?;
    if !archive.file_names().any(|name| name == REQUIRED_MANIFEST) {
        return Err(ValidationError::MissingManifest(REQUIRED_MANIFEST.to_string()));
    }

    Ok(size)
}

/// Reject an output path that resolves to the input document itself.
pub fn validate_output(input: &Path, output: &Path) -> Result<(), ValidationError> {
    let same = match (std::fs::canonicalize(input), resolve_output(output)) {
        (Ok(input), Some(output)) => input == output,
        _ => input == output,
    };
    if same {
        return Err(ValidationError::OutputIsInput(output.to_path_buf()));
    }
    Ok(())
}

/// Canonical form of a path that may not exist yet, through its parent directory.
fn resolve_output(output: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::fs::canonicalize(output) {
        return Some(path);
    }
    let parent = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let name = output.file_name()?;
    std::fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}
