//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione di un run di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressionConfig`, passata esplicitamente a ogni istanza della pipeline
//! - Fornisce i preset nominati (Balanced, Strong, High Quality, Email, Archive)
//! - Raccoglie le costanti empiriche del transcoder in `TranscodeTuning`
//! - Supporta caricamento/salvataggio da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità 0-100 (default: 70), seleziona anche il tier video
//! - `max_dimension`: Lato massimo delle immagini in pixel (default: 1920)
//! - `transcode_media`: Abilita la ricodifica video/audio con FFmpeg (default: false)
//! - `smart_png_to_jpeg`: Converte in JPEG i PNG senza trasparenza reale (default: false)
//! - `backup_enabled`: Crea una copia di sicurezza prima del run (default: true)
//!
//! ## Tier video:
//! - quality <= 50: aggressive (CRF 12, fast, 30 fps, 192k, 1280px)
//! - quality <= 70: balanced (CRF 4, medium, 256k, 1920px)
//! - quality > 70: high fidelity (CRF 1, slow, 320k, 3840px)
//!
//! ## Esempio:
//! ```ignore
//! let config = CompressionConfig {
//!     smart_png_to_jpeg: true,
//!     ..Preset::Strong.config()
//! };
//! config.validate()?;
//! ```

use crate::error::CompressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Inputs above this size are rejected during validation.
pub const MAX_INPUT_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Top-level entry every Office package carries.
pub const REQUIRED_MANIFEST: &str = "[Content_Types].xml";

/// Progress is reported on every Nth archive entry.
pub const PROGRESS_EVERY: usize = 10;

/// Configuration for one compression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Encode quality (0-100)
    pub quality: u8,
    /// Longest allowed image edge in pixels
    pub max_dimension: u32,
    /// Re-encode video and audio entries with the external transcoder
    pub transcode_media: bool,
    /// Turn opaque PNGs into JPEG
    pub smart_png_to_jpeg: bool,
    /// Copy the input to the backup directory before rewriting
    pub backup_enabled: bool,
    /// Empirical transcoder parameters
    pub tuning: TranscodeTuning,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            quality: 70,
            max_dimension: 1920,
            transcode_media: false,
            smart_png_to_jpeg: false,
            backup_enabled: true,
            tuning: TranscodeTuning::default(),
        }
    }
}

impl CompressionConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.quality > 100 {
            return Err(CompressError::Config("Quality must be between 0 and 100".to_string()));
        }

        if self.max_dimension == 0 {
            return Err(CompressError::Config("Max dimension must be greater than 0".to_string()));
        }

        self.tuning.validate()
    }

    /// Video tier selected by the current quality.
    pub fn video_tier(&self) -> VideoTier {
        VideoTier::for_quality(self.quality)
    }

    /// Load configuration from file, falling back to defaults when the file is absent
    pub async fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: CompressionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Named quality/size presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Balanced,
    Strong,
    HighQuality,
    Email,
    Archive,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::Balanced,
        Preset::Strong,
        Preset::HighQuality,
        Preset::Email,
        Preset::Archive,
    ];

    /// (quality, max dimension)
    pub fn values(self) -> (u8, u32) {
        match self {
            Preset::Balanced => (70, 1920),
            Preset::Strong => (50, 1280),
            Preset::HighQuality => (90, 3840),
            Preset::Email => (60, 1024),
            Preset::Archive => (95, 1920),
        }
    }

    pub fn config(self) -> CompressionConfig {
        let (quality, max_dimension) = self.values();
        CompressionConfig {
            quality,
            max_dimension,
            ..CompressionConfig::default()
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Preset::Balanced => "Balanced (Recommended)",
            Preset::Strong => "Strong (Smallest)",
            Preset::HighQuality => "High Quality (Print)",
            Preset::Email => "Email (Light)",
            Preset::Archive => "Archive (Lossless)",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Preset::Balanced => "balanced",
            Preset::Strong => "strong",
            Preset::HighQuality => "high-quality",
            Preset::Email => "email",
            Preset::Archive => "archive",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Preset::ALL
            .into_iter()
            .find(|preset| preset.key() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Preset::ALL.iter().map(|p| p.key()).collect();
                format!("unknown preset '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Discrete video quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTier {
    Aggressive,
    Balanced,
    HighFidelity,
}

impl VideoTier {
    pub fn for_quality(quality: u8) -> Self {
        if quality <= 50 {
            VideoTier::Aggressive
        } else if quality <= 70 {
            VideoTier::Balanced
        } else {
            VideoTier::HighFidelity
        }
    }
}

/// Encoder parameters fixed by one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTierSettings {
    /// libx264 rate-distortion target
    pub crf: u8,
    /// libx264 speed preset
    pub preset: String,
    /// Output frame rate cap, if any
    pub fps_cap: Option<u32>,
    /// Audio track bitrate
    pub audio_bitrate: String,
    /// Output width cap before clamping to the image max dimension
    pub width_cap: u32,
}

/// Tunable transcoder constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeTuning {
    /// Video output kept only below `original * video_min_gain_ratio`
    pub video_min_gain_ratio: f64,
    pub video_timeout_secs: u64,
    pub audio_timeout_secs: u64,
    /// Timeout for the `-version` availability probe
    pub probe_timeout_secs: u64,
    pub aggressive: VideoTierSettings,
    pub balanced: VideoTierSettings,
    pub high_fidelity: VideoTierSettings,
}

impl Default for TranscodeTuning {
    fn default() -> Self {
        Self {
            video_min_gain_ratio: 0.95,
            video_timeout_secs: 300,
            audio_timeout_secs: 60,
            probe_timeout_secs: 5,
            aggressive: VideoTierSettings {
                crf: 12,
                preset: "fast".to_string(),
                fps_cap: Some(30),
                audio_bitrate: "192k".to_string(),
                width_cap: 1280,
            },
            balanced: VideoTierSettings {
                crf: 4,
                preset: "medium".to_string(),
                fps_cap: None,
                audio_bitrate: "256k".to_string(),
                width_cap: 1920,
            },
            high_fidelity: VideoTierSettings {
                crf: 1,
                preset: "slow".to_string(),
                fps_cap: None,
                audio_bitrate: "320k".to_string(),
                width_cap: 3840,
            },
        }
    }
}

impl TranscodeTuning {
    pub fn settings(&self, tier: VideoTier) -> &VideoTierSettings {
        match tier {
            VideoTier::Aggressive => &self.aggressive,
            VideoTier::Balanced => &self.balanced,
            VideoTier::HighFidelity => &self.high_fidelity,
        }
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    fn validate(&self) -> Result<(), CompressError> {
        if !(self.video_min_gain_ratio > 0.0 && self.video_min_gain_ratio <= 1.0) {
            return Err(CompressError::Config(
                "Video minimum gain ratio must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.video_timeout_secs == 0 || self.audio_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(CompressError::Config("Transcoder timeouts must be greater than 0".to_string()));
        }

        for tier in [VideoTier::Aggressive, VideoTier::Balanced, VideoTier::HighFidelity] {
            let settings = self.settings(tier);
            if settings.crf > 51 {
                return Err(CompressError::Config("Video CRF must be between 0 and 51".to_string()));
            }
            if settings.width_cap == 0 {
                return Err(CompressError::Config("Video width cap must be greater than 0".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = CompressionConfig::default();
        assert_eq!(config.quality, 70);
        assert_eq!(config.max_dimension, 1920);
        assert!(!config.transcode_media);
        assert!(!config.smart_png_to_jpeg);
        assert!(config.backup_enabled);
        assert_eq!(config.tuning.video_min_gain_ratio, 0.95);
        assert_eq!(config.tuning.video_timeout_secs, 300);
        assert_eq!(config.tuning.audio_timeout_secs, 60);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CompressionConfig::default();
        assert!(config.validate().is_ok());

        config.quality = 101;
        assert!(config.validate().is_err());

        config.quality = 0;
        assert!(config.validate().is_ok());

        config.max_dimension = 0;
        assert!(config.validate().is_err());

        config.max_dimension = 1024;
        config.tuning.video_min_gain_ratio = 1.5;
        assert!(config.validate().is_err());

        config.tuning.video_min_gain_ratio = 0.9;
        config.tuning.audio_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_video_tier_thresholds() {
        assert_eq!(VideoTier::for_quality(0), VideoTier::Aggressive);
        assert_eq!(VideoTier::for_quality(50), VideoTier::Aggressive);
        assert_eq!(VideoTier::for_quality(51), VideoTier::Balanced);
        assert_eq!(VideoTier::for_quality(70), VideoTier::Balanced);
        assert_eq!(VideoTier::for_quality(71), VideoTier::HighFidelity);
        assert_eq!(VideoTier::for_quality(100), VideoTier::HighFidelity);
    }

    #[test]
    fn test_presets() {
        assert_eq!(Preset::Balanced.config(), CompressionConfig::default());

        let strong = Preset::Strong.config();
        assert_eq!((strong.quality, strong.max_dimension), (50, 1280));
        assert_eq!(strong.video_tier(), VideoTier::Aggressive);

        assert_eq!("high-quality".parse::<Preset>(), Ok(Preset::HighQuality));
        assert_eq!("Email".parse::<Preset>(), Ok(Preset::Email));
        assert_eq!("archive".parse::<Preset>().map(|p| p.values()), Ok((95, 1920)));
        assert!("tiny".parse::<Preset>().is_err());
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let mut original_config = Preset::Email.config();
        original_config.transcode_media = true;
        original_config.tuning.video_min_gain_ratio = 0.8;

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = CompressionConfig::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config, original_config);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let absent = temp_dir.path().join("absent.json");
        let loaded = tokio_test::block_on(CompressionConfig::from_file(&absent)).unwrap();
        assert_eq!(loaded, CompressionConfig::default());
    }

    #[tokio::test]
    async fn test_partial_config_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{"quality": 40}"#).await.unwrap();

        let loaded = CompressionConfig::from_file(&config_path).await.unwrap();
        assert_eq!(loaded.quality, 40);
        assert_eq!(loaded.max_dimension, 1920);
        assert_eq!(loaded.tuning, TranscodeTuning::default());
    }
}
