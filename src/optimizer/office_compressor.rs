//! # Office Compressor Orchestrator
//!
//! Orchestratore della pipeline per un singolo documento.
//!
//! ## Stati:
//! `Idle → Validating → (BackingUp) → (StructureClean) → Rewriting → Finalizing → {Succeeded, Failed}`
//!
//! ## Responsabilità:
//! - Validazione dell'input prima di qualsiasi modifica
//! - Backup opzionale (non fatale se fallisce)
//! - Structure clean opzionale per le presentazioni
//! - Riscrittura dell'archivio verso un path di output separato
//! - Aggiornamento delle statistiche di sessione
//! - In caso di errore: rimozione dell'output parziale e ripristino dal backup

use crate::archive_rewriter::{ArchiveRewriter, RewriteSummary, StopSignal};
use crate::backup::{BackupRecord, BackupStore};
use crate::config::CompressionConfig;
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::image_processor::ImageProcessor;
use crate::optimizer::validation::{validate_input, validate_output};
use crate::progress::{ProgressSinks, RunStatistics, StatisticsReport};
use crate::structure_clean::{CleanedDocument, NoStructureClean, StructureCleaner};
use crate::tool_resolver::ToolPathResolver;
use crate::transcoder::Transcoder;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// Stage of the most recent pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    BackingUp,
    StructureClean,
    Rewriting,
    Finalizing,
    Succeeded,
    Failed,
}

/// Result of one successful document compression
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub original_size: u64,
    pub compressed_size: u64,
    pub summary: RewriteSummary,
    pub elapsed: Duration,
    pub backup: Option<BackupRecord>,
}

impl CompressionOutcome {
    pub fn saved_bytes(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.compressed_size)
    }
}

/// Compresses Office documents one at a time, accumulating statistics
pub struct OfficeCompressor {
    config: CompressionConfig,
    image_processor: ImageProcessor,
    transcoder: Option<Transcoder>,
    backups: BackupStore,
    cleaner: Box<dyn StructureCleaner>,
    stats: RunStatistics,
    stop: StopSignal,
    state: PipelineState,
}

impl OfficeCompressor {
    /// Build a compressor, locating the transcoder once.
    pub fn new(config: CompressionConfig) -> Result<Self, CompressError> {
        config.validate()?;

        let transcoder = ToolPathResolver::new()
            .ffmpeg()
            .map(|path| Transcoder::new(path, config.clone()));
        match &transcoder {
            Some(t) => debug!("Transcoder located at {}", t.ffmpeg_path().display()),
            None => debug!("No transcoder located, video/audio entries will be copied"),
        }

        Ok(Self {
            image_processor: ImageProcessor::new(config.clone()),
            transcoder,
            backups: BackupStore::default(),
            cleaner: Box::new(NoStructureClean),
            stats: RunStatistics::new(),
            stop: StopSignal::none(),
            state: PipelineState::Idle,
            config,
        })
    }

    /// Use an explicit transcoder executable, or none at all.
    pub fn with_transcoder_path(mut self, path: Option<PathBuf>) -> Self {
        self.transcoder = path.map(|p| Transcoder::new(p, self.config.clone()));
        self
    }

    pub fn with_structure_cleaner(mut self, cleaner: Box<dyn StructureCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    /// Poll `receiver` between entries; a message cancels the current and later runs.
    pub fn with_cancellation(mut self, receiver: broadcast::Receiver<()>) -> Self {
        self.stop = StopSignal::new(receiver);
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backups = BackupStore::new(dir);
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transcoder_available(&self) -> bool {
        self.transcoder.is_some()
    }

    /// Probe the transcoder and describe its status.
    pub async fn check_transcoder(&self) -> Result<String, String> {
        match &self.transcoder {
            None => Err("FFmpeg not found. Video/Audio compression disabled.".to_string()),
            Some(transcoder) => transcoder
                .probe()
                .await
                .map_err(|e| format!("FFmpeg check failed: {}", e)),
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!("Pipeline state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Compress `input` into `output`. The input itself is never written.
    pub async fn compress(
        &mut self,
        input: &Path,
        output: &Path,
        sinks: ProgressSinks<'_>,
    ) -> Result<CompressionOutcome, CompressError> {
        let started = Instant::now();

        self.transition(PipelineState::Validating);
        let validated = validate_input(input).and_then(|size| validate_output(input, output).map(|()| size));
        let original_size = match validated {
            Ok(size) => size,
            Err(e) => {
                sinks.log(&format!("Validation failed: {}", e));
                self.transition(PipelineState::Failed);
                return Err(e.into());
            }
        };

        let backup = if self.config.backup_enabled {
            self.transition(PipelineState::BackingUp);
            match self.backups.create(input).await {
                Ok(record) => {
                    sinks.log(&format!("Backup created: {}", record.file_name()));
                    Some(record)
                }
                Err(e) => {
                    warn!("Backup of {} failed: {}", input.display(), e);
                    sinks.log(&format!("Backup failed, continuing without: {}", e));
                    None
                }
            }
        } else {
            None
        };

        match self.run_stages(input, output, sinks).await {
            Ok((summary, compressed_size)) => {
                let elapsed = started.elapsed();
                self.stats.record(original_size, compressed_size, elapsed);

                let outcome = CompressionOutcome {
                    original_size,
                    compressed_size,
                    summary,
                    elapsed,
                    backup,
                };
                sinks.log(&format!(
                    "Complete: Saved {} ({:.1}%)",
                    FileManager::format_size(outcome.saved_bytes()),
                    outcome.reduction_percent()
                ));
                self.transition(PipelineState::Succeeded);
                Ok(outcome)
            }
            Err(e) => {
                error!("Compression of {} failed: {}", input.display(), e);
                sinks.log(&format!("Error: {}", e));
                self.recover(output, backup.as_ref(), sinks).await;
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    /// Structure clean, rewrite and finalize. The cleaned copy lives until the end.
    async fn run_stages(
        &mut self,
        input: &Path,
        output: &Path,
        sinks: ProgressSinks<'_>,
    ) -> Result<(RewriteSummary, u64), CompressError> {
        let cleaned = self.structure_clean(input);
        let working = cleaned.as_ref().map(CleanedDocument::path).unwrap_or(input);

        self.transition(PipelineState::Rewriting);
        let rewriter = ArchiveRewriter::new(&self.config, &self.image_processor, self.transcoder.as_ref());
        let summary = rewriter.rewrite(working, output, sinks, &mut self.stop).await?;

        self.transition(PipelineState::Finalizing);
        let compressed_size = match fs::metadata(output).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return Err(CompressError::OutputMissing(output.to_path_buf())),
        };
        drop(cleaned);

        Ok((summary, compressed_size))
    }

    fn structure_clean(&mut self, input: &Path) -> Option<CleanedDocument> {
        if !FileManager::is_presentation(input) {
            return None;
        }
        self.transition(PipelineState::StructureClean);
        let cleaned = self.cleaner.try_clean(input);
        match &cleaned {
            Some(doc) => debug!("Structure clean '{}' produced {}", self.cleaner.name(), doc.path().display()),
            None => debug!("Structure clean '{}' unavailable, using original input", self.cleaner.name()),
        }
        cleaned
    }

    /// Remove the partial output and put the backup back over the input.
    async fn recover(&self, output: &Path, backup: Option<&BackupRecord>, sinks: ProgressSinks<'_>) {
        if let Err(e) = fs::remove_file(output).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove partial output {}: {}", output.display(), e);
            }
        }

        if let Some(record) = backup {
            match record.restore().await {
                Ok(()) => sinks.log("Restored from backup due to error"),
                Err(e) => warn!("Restore from {} failed: {}", record.backup_path.display(), e),
            }
        }
    }

    /// Boolean form of [`compress`](Self::compress) for front ends that only need success.
    pub async fn compress_ok(&mut self, input: &Path, output: &Path, sinks: ProgressSinks<'_>) -> bool {
        self.compress(input, output, sinks).await.is_ok()
    }

    /// Snapshot of the statistics accumulated by this instance.
    pub fn get_statistics(&self) -> RunStatistics {
        self.stats.clone()
    }

    pub fn report(&self) -> Option<StatisticsReport> {
        self.stats.report()
    }
}
