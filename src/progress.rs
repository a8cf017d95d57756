//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress reporting e le statistiche di sessione.
//!
//! ## Responsabilità:
//! - `ProgressSinks`: callback opzionali di progresso (frazione 0..1) e di log testuale
//! - `RunStatistics`: contatori cumulativi per istanza del compressore
//! - `StatisticsReport`: snapshot formattato per il front end
//! - `ProgressManager`: barra `indicatif` per la CLI
//!
//! ## Statistiche tracciate:
//! - **files_processed**: Documenti completati con successo
//! - **total_original_bytes**: Somma delle dimensioni originali
//! - **total_saved_bytes**: Byte risparmiati (mai negativi)
//! - **elapsed**: Tempo di elaborazione accumulato
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [==========>-----------------------------] 25% deck.pptx: Video: ppt/media/media1.mp4...
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Progress callback: fraction of entries handled, in `[0, 1]`.
pub type ProgressFn<'a> = dyn Fn(f64) + Send + Sync + 'a;
/// Free-text log callback.
pub type LogFn<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Optional caller-supplied sinks for one run
#[derive(Clone, Copy, Default)]
pub struct ProgressSinks<'a> {
    pub progress: Option<&'a ProgressFn<'a>>,
    pub log: Option<&'a LogFn<'a>>,
}

impl<'a> ProgressSinks<'a> {
    pub fn new(progress: &'a ProgressFn<'a>, log: &'a LogFn<'a>) -> Self {
        Self {
            progress: Some(progress),
            log: Some(log),
        }
    }

    pub fn report(&self, fraction: f64) {
        if let Some(progress) = self.progress {
            progress(fraction.clamp(0.0, 1.0));
        }
    }

    /// Emit a log line to `tracing` and to the caller.
    pub fn log(&self, message: &str) {
        info!("{}", message);
        if let Some(log) = self.log {
            log(message);
        }
    }
}

impl fmt::Debug for ProgressSinks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSinks")
            .field("progress", &self.progress.is_some())
            .field("log", &self.log.is_some())
            .finish()
    }
}

/// Cumulative statistics for one compressor instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub files_processed: u64,
    pub total_original_bytes: u64,
    pub total_saved_bytes: u64,
    pub elapsed: Duration,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one successfully rewritten document.
    pub fn record(&mut self, original_size: u64, compressed_size: u64, elapsed: Duration) {
        self.files_processed += 1;
        self.total_original_bytes += original_size;
        self.total_saved_bytes += original_size.saturating_sub(compressed_size);
        self.elapsed += elapsed;
    }

    pub fn savings_percent(&self) -> f64 {
        FileManager::calculate_reduction(
            self.total_original_bytes,
            self.total_original_bytes - self.total_saved_bytes,
        )
    }

    /// Bytes per second, with the elapsed time floored at one second.
    pub fn average_speed(&self) -> f64 {
        self.total_original_bytes as f64 / self.elapsed.as_secs_f64().max(1.0)
    }

    /// Formatted snapshot, `None` until something has been processed.
    pub fn report(&self) -> Option<StatisticsReport> {
        if self.total_original_bytes == 0 {
            return None;
        }

        Some(StatisticsReport {
            files_processed: self.files_processed,
            original_size: FileManager::format_size(self.total_original_bytes),
            savings_bytes: FileManager::format_size(self.total_saved_bytes),
            savings_percent: format!("{:.1}%", self.savings_percent()),
            processing_time: format!("{:.1}s", self.elapsed.as_secs_f64()),
            average_speed: format!("{}/s", FileManager::format_size(self.average_speed() as u64)),
        })
    }
}

/// Human-readable statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub files_processed: u64,
    pub original_size: String,
    pub savings_bytes: String,
    pub savings_percent: String,
    pub processing_time: String,
    pub average_speed: String,
}

impl fmt::Display for StatisticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files processed: {}", self.files_processed)?;
        writeln!(f, "Original size:   {}", self.original_size)?;
        writeln!(f, "Space saved:     {} ({})", self.savings_bytes, self.savings_percent)?;
        writeln!(f, "Processing time: {}", self.processing_time)?;
        write!(f, "Average speed:   {}", self.average_speed)
    }
}

/// Terminal progress bar spanning all documents of a CLI session
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

/// Bar positions per document.
const STEPS_PER_FILE: u64 = 1000;

impl ProgressManager {
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files.max(1) * STEPS_PER_FILE);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A bar that draws nothing, for JSON mode.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Position the bar at document `index` plus `fraction` of it.
    pub fn set_file_progress(&self, index: usize, fraction: f64) {
        let within = (fraction.clamp(0.0, 1.0) * STEPS_PER_FILE as f64) as u64;
        self.bar.set_position(index as u64 * STEPS_PER_FILE + within);
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Print a line above the bar without disturbing it.
    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
