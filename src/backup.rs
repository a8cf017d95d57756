//! # Backup Store
//!
//! Copie di sicurezza dei documenti prima della riscrittura.
//!
//! ## Layout:
//! - Directory unica: `<temp>/office_optimizer_backups`
//! - Nome file: `<nome originale>.backup_<YYYYmmdd_HHMMSS_mmm>`, con suffisso `_N`
//!   se il nome è già preso (mai sovrascritto)
//!
//! Le copie non vengono mai cancellate automaticamente.

use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, info};

/// Name of the backup directory under the system temp dir.
pub const BACKUP_DIR_NAME: &str = "office_optimizer_backups";

/// Suffixed names tried before giving up on a taken backup name.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// One backup copy of an input document
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Local>,
}

impl BackupRecord {
    /// Copy the backup back over the original input.
    pub async fn restore(&self) -> std::io::Result<()> {
        fs::copy(&self.backup_path, &self.source_path).await?;
        info!(
            "Restored {} from {}",
            self.source_path.display(),
            self.backup_path.display()
        );
        Ok(())
    }

    pub fn file_name(&self) -> String {
        self.backup_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Directory holding timestamped backup copies
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl Default for BackupStore {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(BACKUP_DIR_NAME))
    }
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the store under a timestamped name.
    ///
    /// Names are reserved with `create_new`, so an existing backup is never
    /// overwritten, even for same-named documents backed up at the same instant.
    pub async fn create(&self, source: &Path) -> std::io::Result<BackupRecord> {
        let mut reader = File::open(source).await?;
        fs::create_dir_all(&self.dir).await?;

        let created_at = Local::now();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let base = format!("{}.backup_{}", file_name, created_at.format("%Y%m%d_%H%M%S_%3f"));
        let (backup_path, mut writer) = self.reserve(&base).await?;

        let copied = async {
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.sync_all().await
        }
        .await;
        if let Err(e) = copied {
            let _ = fs::remove_file(&backup_path).await;
            return Err(e);
        }
        debug!("Backup {} -> {}", source.display(), backup_path.display());

        Ok(BackupRecord {
            source_path: source.to_path_buf(),
            backup_path,
            created_at,
        })
    }

    /// Create a fresh file named `base`, or `base_N` when that is taken.
    async fn reserve(&self, base: &str) -> std::io::Result<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, attempt)
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free backup name for {}", base),
        ))
    }
}
