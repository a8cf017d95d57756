//! # Office Media Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline di ricompressione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri front end
//!
//! ## Architettura dei moduli:
//! - `classifier`: Categoria di ogni entry (immagine, video, audio, altro)
//! - `image_processor`: Ricompressione delle immagini in memoria
//! - `transcoder`: Ricodifica video/audio tramite FFmpeg esterno
//! - `tool_resolver`: Ricerca dell'eseguibile FFmpeg
//! - `archive_rewriter`: Ricostruzione del pacchetto zip entry per entry
//! - `optimizer`: Orchestratore per documento (validazione, backup, ripristino)
//! - `backup`: Copie di sicurezza con timestamp
//! - `structure_clean`: Hook opzionale di pulizia delle presentazioni
//! - `progress`: Callback di progresso, statistiche e barra di avanzamento
//! - `events`: Eventi JSON per front end esterni
//! - `config`: Configurazione, preset e tuning del transcoder
//! - `error`: Tipi di errore strutturati
//!
//! ## Utilizzo:
//! ```ignore
//! use office_media_optimizer::{CompressionConfig, OfficeCompressor, ProgressSinks};
//!
//! let mut compressor = OfficeCompressor::new(CompressionConfig::default())?;
//! let outcome = compressor.compress(&input, &output, ProgressSinks::default()).await?;
//! println!("Saved {} bytes", outcome.saved_bytes());
//! ```

pub mod archive_rewriter;
pub mod backup;
pub mod classifier;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod file_manager;
pub mod image_processor;
pub mod optimizer;
pub mod progress;
pub mod structure_clean;
pub mod tool_resolver;
pub mod transcoder;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use archive_rewriter::{ArchiveRewriter, RewriteSummary, StopSignal};
pub use backup::{BackupRecord, BackupStore};
pub use classifier::{classify, MediaKind};
pub use config::{CompressionConfig, Preset, TranscodeTuning, VideoTier};
pub use entry::{ArchiveEntry, RecompressionResult};
pub use error::{CompressError, EntryError, ValidationError};
pub use optimizer::{CompressionOutcome, OfficeCompressor, PipelineState};
pub use progress::{ProgressSinks, RunStatistics, StatisticsReport};
pub use structure_clean::{CleanedDocument, NoStructureClean, StructureCleaner};
