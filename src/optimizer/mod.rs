//! # Optimizer Module
//!
//! Orchestrazione della pipeline per documento, divisa in sottomoduli:
//! - `office_compressor`: macchina a stati, backup, ripristino e statistiche
//! - `validation`: controlli sull'input prima di qualsiasi modifica

pub mod office_compressor;
pub mod validation;

pub use office_compressor::{CompressionOutcome, OfficeCompressor, PipelineState};
pub use validation::{validate_input, validate_output};
