//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file a livello di documento.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei documenti Office in directory
//! - Riconoscimento del tipo di documento dal suffisso
//! - Calcolo dei path di output (copia `_Optimized` o `.optimized` temporaneo)
//! - Sostituzione dell'originale con il risultato ottimizzato
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Presentazioni**: PPTX
//! - **Documenti**: DOCX
//! - **Fogli di calcolo**: XLSX
//!
//! ## Esempio:
//! ```ignore
//! let files = FileManager::find_office_documents(Path::new("/path/to/docs"))?;
//! for file in files {
//!     let output = FileManager::copy_output_path(&file);
//!     // compress file -> output
//! }
//! ```

use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Suffixes of the zip-based Office formats.
pub const OFFICE_SUFFIXES: &[&str] = &["pptx", "docx", "xlsx"];

/// Manages document-level file operations
pub struct FileManager;

impl FileManager {
    /// Find all Office documents under a directory
    pub fn find_office_documents(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::is_office_document(path) && !Self::is_generated_output(path))
            .collect();

        files.sort();
        Ok(files)
    }

    /// Expand a mix of files and directories into a de-duplicated document list.
    pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                files.extend(Self::find_office_documents(input)?);
            } else {
                files.push(input.clone());
            }
        }

        let mut seen = std::collections::HashSet::new();
        files.retain(|path| seen.insert(path.clone()));
        Ok(files)
    }

    /// Check if a file is a supported Office document
    pub fn is_office_document(path: &Path) -> bool {
        Self::suffix(path)
            .map(|ext| OFFICE_SUFFIXES.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Check if a file is a presentation
    pub fn is_presentation(path: &Path) -> bool {
        Self::suffix(path).as_deref() == Some("pptx")
    }

    fn suffix(path: &Path) -> Option<String> {
        path.extension().map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// A previous run's `_Optimized` copy.
    fn is_generated_output(path: &Path) -> bool {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().ends_with("_Optimized"))
            .unwrap_or(false)
    }

    /// `<stem>_Optimized.<ext>` next to the input.
    pub fn copy_output_path(input: &Path) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let name = match input.extension() {
            Some(ext) => format!("{}_Optimized.{}", stem, ext.to_string_lossy()),
            None => format!("{}_Optimized", stem),
        };
        input.with_file_name(name)
    }

    /// `<file>.optimized` next to the input, moved over it after success.
    pub fn replace_output_path(input: &Path) -> PathBuf {
        let mut name: OsString = input.file_name().unwrap_or_default().to_os_string();
        name.push(".optimized");
        input.with_file_name(name)
    }

    /// Move the optimized file over the original
    pub async fn replace_file(original: &Path, optimized: &Path) -> Result<()> {
        if fs::rename(optimized, original).await.is_ok() {
            return Ok(());
        }

        // rename fails across filesystems; fall back to copy + remove
        fs::copy(optimized, original).await?;
        fs::remove_file(optimized).await?;
        Ok(())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.1} {}", size, UNITS[unit_index])
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
