//! # Transcoding Backend Adapter
//!
//! Questo modulo ricodifica video e audio incorporati tramite FFmpeg esterno.
//!
//! ## Responsabilità:
//! - Deriva i parametri di codifica dal tier di qualità
//! - Esegue FFmpeg in una directory temporanea con timeout
//! - Termina il processo allo scadere del timeout (`kill_on_drop` + kill esplicito)
//! - Accetta l'output solo se supera il gate di dimensione
//!
//! ## Video (libx264, container MP4):
//! - `-crf`, `-preset`, filtro `scale='min(W,iw)':-2[,fps=N]`, audio stereo al bitrate del tier
//! - La larghezza massima del tier è limitata da `max_dimension`
//! - Output accettato solo sotto `originale * video_min_gain_ratio` (default 0.95)
//!
//! ## Audio:
//! - `.wav`: convertito in MP3 (libmp3lame, 128k/192k, stereo, 44.1 kHz)
//! - Altri formati: ricodificati nello stesso container a 128k/192k/256k
//! - Output accettato solo se strettamente più piccolo
//!
//! ## Error Handling
//!
//! Ogni errore (spawn, exit code, timeout, output mancante) degrada a
//! `RecompressionResult::Unchanged`. Nessun errore esce dall'adapter.

use crate::args;
use crate::classifier::suffix_of;
use crate::config::{CompressionConfig, VideoTier, VideoTierSettings};
use crate::entry::RecompressionResult;
use crate::error::EntryError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Handles video and audio re-encoding through an external FFmpeg
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    config: CompressionConfig,
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, config: CompressionConfig) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            config,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Run `ffmpeg -version` and report readiness.
    pub async fn probe(&self) -> Result<String, EntryError> {
        self.run(&args!["-version"], self.config.tuning.probe_timeout()).await?;
        let name = self
            .ffmpeg
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.ffmpeg.display().to_string());
        Ok(format!("Ready: {}", name))
    }

    /// Re-encode a video entry. Falls back to `Unchanged` on any failure.
    pub async fn transcode_video(&self, raw: &[u8], path: &str) -> RecompressionResult {
        match self.try_video(raw, path).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Keeping original video {}: {}", path, e);
                RecompressionResult::Unchanged
            }
        }
    }

    /// Re-encode an audio entry. Falls back to `Unchanged` on any failure.
    pub async fn transcode_audio(&self, raw: &[u8], path: &str) -> RecompressionResult {
        match self.try_audio(raw, path).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Keeping original audio {}: {}", path, e);
                RecompressionResult::Unchanged
            }
        }
    }

    async fn try_video(&self, raw: &[u8], path: &str) -> Result<RecompressionResult, EntryError> {
        let scratch = Scratch::new(raw, path).await?;
        let output = scratch.path("comp.mp4");

        let tier = self.config.video_tier();
        let settings = self.config.tuning.settings(tier);
        debug!("🎬 {} using {:?} tier (CRF {}, {})", path, tier, settings.crf, settings.preset);

        let cmd_args = video_args(&scratch.input, &output, settings, self.config.max_dimension);
        self.run(&cmd_args, self.config.tuning.video_timeout()).await?;

        let compressed = tokio::fs::read(&output).await?;
        debug!("Video {}: {} -> {} bytes", path, raw.len(), compressed.len());
        Ok(RecompressionResult::accept_if_below_ratio(
            raw.len(),
            compressed,
            self.config.tuning.video_min_gain_ratio,
        ))
    }

    async fn try_audio(&self, raw: &[u8], path: &str) -> Result<RecompressionResult, EntryError> {
        let scratch = Scratch::new(raw, path).await?;
        let is_wav = scratch.suffix == "wav";
        let output_suffix = if is_wav { "mp3" } else { scratch.suffix.as_str() };
        let output = scratch.path(&format!("comp.{}", output_suffix));

        let cmd_args = audio_args(&scratch.input, &output, is_wav, self.config.quality);
        self.run(&cmd_args, self.config.tuning.audio_timeout()).await?;

        let compressed = tokio::fs::read(&output).await?;
        debug!("Audio {}: {} -> {} bytes", path, raw.len(), compressed.len());
        Ok(RecompressionResult::accept_if_smaller(raw.len(), compressed))
    }

    /// Run FFmpeg to completion, killing it if `limit` elapses.
    async fn run(&self, cmd_args: &[String], limit: Duration) -> Result<(), EntryError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(cmd_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let start_time = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            EntryError::Transcode(format!("failed to execute {}: {}", self.ffmpeg.display(), e))
        })?;

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("FFmpeg finished in {:.1}s with {}", start_time.elapsed().as_secs_f64(), status);
                if status.success() {
                    Ok(())
                } else {
                    Err(EntryError::Transcode(format!("FFmpeg exited with {}", status)))
                }
            }
            Err(_) => {
                warn!("FFmpeg timed out after {:?}, terminating", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to terminate FFmpeg: {}", e);
                }
                Err(EntryError::Timeout(limit))
            }
        }
    }
}

/// Per-entry scratch directory holding the extracted original. Removed on drop.
struct Scratch {
    dir: tempfile::TempDir,
    input: PathBuf,
    suffix: String,
}

impl Scratch {
    async fn new(raw: &[u8], entry_path: &str) -> Result<Self, EntryError> {
        let dir = tempfile::Builder::new().prefix("office_optimizer_").tempdir()?;
        let suffix = suffix_of(entry_path).unwrap_or_else(|| "bin".to_string());
        let input = dir.path().join(format!("orig.{}", suffix));
        tokio::fs::write(&input, raw).await?;
        Ok(Self { dir, input, suffix })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// FFmpeg arguments for a video entry.
pub fn video_args(input: &Path, output: &Path, settings: &VideoTierSettings, max_dimension: u32) -> Vec<String> {
    let width = settings.width_cap.min(max_dimension);
    let fps_filter = settings
        .fps_cap
        .map(|fps| format!(",fps={}", fps))
        .unwrap_or_default();

    args![
        "-y",
        "-i",
        input.display(),
        "-vcodec",
        "libx264",
        "-crf",
        settings.crf,
        "-preset",
        settings.preset,
        "-vf",
        format!("scale='min({},iw)':-2{}", width, fps_filter),
        "-ac",
        2,
        "-b:a",
        settings.audio_bitrate,
        "-movflags",
        "+faststart",
        output.display(),
    ]
}

/// FFmpeg arguments for an audio entry.
pub fn audio_args(input: &Path, output: &Path, is_wav: bool, quality: u8) -> Vec<String> {
    let tier = VideoTier::for_quality(quality);
    if is_wav {
        let bitrate = match tier {
            VideoTier::Aggressive => "128k",
            _ => "192k",
        };
        args![
            "-y",
            "-i",
            input.display(),
            "-codec:a",
            "libmp3lame",
            "-b:a",
            bitrate,
            "-ac",
            2,
            "-ar",
            44100,
            output.display(),
        ]
    } else {
        let bitrate = match tier {
            VideoTier::Aggressive => "128k",
            VideoTier::Balanced => "192k",
            VideoTier::HighFidelity => "256k",
        };
        args!["-y", "-i", input.display(), "-b:a", bitrate, output.display()]
    }
}
