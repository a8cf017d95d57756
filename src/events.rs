//! # JSON Events Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per i front end esterni.
//!
//! ## Responsabilità:
//! - Emette un oggetto JSON per riga su stdout
//! - Traduce outcome ed errori della pipeline in messaggi stabili
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio della sessione con la configurazione effettiva
//! - `progress`: Avanzamento del documento corrente
//! - `log`: Riga di log testuale della pipeline
//! - `file_complete`: Fine elaborazione di un documento (successo o errore)
//! - `complete`: Fine della sessione con le statistiche cumulative
//! - `error`: Errore generale

use crate::config::CompressionConfig;
use crate::optimizer::CompressionOutcome;
use crate::progress::RunStatistics;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// JSON event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        total_files: usize,
        config: JsonConfig,
        transcoder_available: bool,
    },

    /// Progress within one document, `percentage` in `[0, 100]`
    #[serde(rename = "progress")]
    Progress {
        path: PathBuf,
        index: usize,
        total: usize,
        percentage: f64,
    },

    #[serde(rename = "log")]
    Log { path: PathBuf, message: String },

    #[serde(rename = "file_complete")]
    FileComplete {
        path: PathBuf,
        output: Option<PathBuf>,
        original_size: u64,
        compressed_size: u64,
        reduction_percent: f64,
        images_replaced: usize,
        media_replaced: usize,
        error: Option<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        files_processed: u64,
        errors: usize,
        total_original_bytes: u64,
        total_bytes_saved: u64,
        savings_percent: f64,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

/// Effective configuration as reported in the `start` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonConfig {
    pub quality: u8,
    pub max_dimension: u32,
    pub transcode_media: bool,
    pub smart_png_to_jpeg: bool,
    pub backup_enabled: bool,
}

impl JsonMessage {
    /// Print the message as one JSON line on stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(total_files: usize, config: JsonConfig, transcoder_available: bool) -> Self {
        Self::Start {
            total_files,
            config,
            transcoder_available,
        }
    }

    pub fn progress(path: PathBuf, index: usize, total: usize, fraction: f64) -> Self {
        Self::Progress {
            path,
            index,
            total,
            percentage: fraction.clamp(0.0, 1.0) * 100.0,
        }
    }

    pub fn log(path: PathBuf, message: impl Into<String>) -> Self {
        Self::Log {
            path,
            message: message.into(),
        }
    }

    /// A document written successfully to `output`.
    pub fn file_complete(path: PathBuf, output: PathBuf, outcome: &CompressionOutcome) -> Self {
        Self::FileComplete {
            path,
            output: Some(output),
            original_size: outcome.original_size,
            compressed_size: outcome.compressed_size,
            reduction_percent: outcome.reduction_percent(),
            images_replaced: outcome.summary.images_replaced,
            media_replaced: outcome.summary.media_replaced,
            error: None,
        }
    }

    /// A document that failed; the input is left as it was.
    pub fn file_failed(path: PathBuf, error: String) -> Self {
        Self::FileComplete {
            path,
            output: None,
            original_size: 0,
            compressed_size: 0,
            reduction_percent: 0.0,
            images_replaced: 0,
            media_replaced: 0,
            error: Some(error),
        }
    }

    pub fn complete(stats: &RunStatistics, errors: usize) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            errors,
            total_original_bytes: stats.total_original_bytes,
            total_bytes_saved: stats.total_saved_bytes,
            savings_percent: stats.savings_percent(),
            duration_seconds: stats.elapsed.as_secs_f64(),
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}

impl From<&CompressionConfig> for JsonConfig {
    fn from(config: &CompressionConfig) -> Self {
        Self {
            quality: config.quality,
            max_dimension: config.max_dimension,
            transcode_media: config.transcode_media,
            smart_png_to_jpeg: config.smart_png_to_jpeg,
            backup_enabled: config.backup_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive_rewriter::RewriteSummary;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn test_messages_are_tagged() {
        let config = JsonConfig::from(&CompressionConfig::default());
        let value = serde_json::to_value(JsonMessage::start(3, config, false)).unwrap();
        assert_eq!(value["type"], "start");
        assert_eq!(value["total_files"], 3);
        assert_eq!(value["config"]["quality"], 70);
        assert_eq!(value["config"]["max_dimension"], 1920);

        let value = serde_json::to_value(JsonMessage::progress("deck.pptx".into(), 0, 2, 0.25)).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["percentage"], 25.0);

        let value = serde_json::to_value(JsonMessage::log("deck.pptx".into(), "Video: a.mp4...")).unwrap();
        assert_eq!(value["type"], "log");
        assert_eq!(value["message"], "Video: a.mp4...");
    }

    #[test]
    fn test_file_complete_from_outcome() {
        let outcome = CompressionOutcome {
            original_size: 1000,
            compressed_size: 400,
            summary: RewriteSummary {
                entries: 5,
                images_replaced: 2,
                media_replaced: 1,
                entry_bytes_saved: 700,
            },
            elapsed: Duration::from_secs(1),
            backup: None,
        };
        let message = JsonMessage::file_complete("a.pptx".into(), "a_Optimized.pptx".into(), &outcome);
        let value: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "file_complete");
        assert_eq!(value["reduction_percent"], 60.0);
        assert_eq!(value["images_replaced"], 2);
        assert_eq!(value["error"], Value::Null);

        let failed = JsonMessage::file_failed("b.docx".into(), "Operation cancelled".into());
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["output"], Value::Null);
        assert_eq!(value["error"], "Operation cancelled");
    }

    #[test]
    fn test_complete_and_round_trip() {
        let mut stats = RunStatistics::new();
        stats.record(2000, 1500, Duration::from_secs(2));
        let message = JsonMessage::complete(&stats, 1);

        let json = serde_json::to_string(&message).unwrap();
        let parsed: JsonMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_bytes_saved"], 500);
        assert_eq!(value["savings_percent"], 25.0);
    }
}
