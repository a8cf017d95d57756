//! # Office Media Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (preset, file JSON, override da CLI)
//! - Stop cooperativo su Ctrl-C tramite canale broadcast
//! - Elaborazione sequenziale dei documenti e report finale
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file/cartelle, preset, quality, flag)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` se presente)
//! 3. Raccoglie i documenti Office dagli input
//! 4. Comprime ogni documento in una copia `_Optimized` o sostituisce l'originale
//! 5. Stampa le statistiche di sessione (o l'evento JSON `complete`)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! office-optimizer deck.pptx reports/ --preset strong --transcode --smart-png --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use office_media_optimizer::events::{JsonConfig, JsonMessage};
use office_media_optimizer::file_manager::FileManager;
use office_media_optimizer::progress::{LogFn, ProgressFn, ProgressManager};
use office_media_optimizer::tool_resolver::ToolPathResolver;
use office_media_optimizer::{CompressError, CompressionConfig, OfficeCompressor, Preset, ProgressSinks};

#[derive(Parser)]
#[command(name = "office-optimizer")]
#[command(about = "Shrink PowerPoint, Word and Excel files by recompressing their embedded media")]
struct Args {
    /// Documents (.pptx, .docx, .xlsx) or folders to search recursively
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Quality preset: balanced, strong, high-quality, email, archive
    #[arg(short, long, default_value = "balanced")]
    preset: Preset,

    /// Image/video quality (0-100), overrides the preset
    #[arg(short, long)]
    quality: Option<u8>,

    /// Longest image edge in pixels, overrides the preset
    #[arg(short = 'd', long)]
    max_dimension: Option<u32>,

    /// Re-encode embedded video and audio with FFmpeg
    #[arg(short, long)]
    transcode: bool,

    /// Convert PNGs without transparency to JPEG
    #[arg(long)]
    smart_png: bool,

    /// Do not back up documents before processing
    #[arg(long)]
    no_backup: bool,

    /// Replace the originals instead of writing `<name>_Optimized` copies
    #[arg(long)]
    replace: bool,

    /// Emit one JSON event per line on stdout
    #[arg(long)]
    json: bool,

    /// Explicit path to the FFmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// JSON configuration file used instead of the preset
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

async fn build_config(args: &Args) -> Result<CompressionConfig> {
    let mut config = match &args.config {
        Some(path) => CompressionConfig::from_file(path).await?,
        None => args.preset.config(),
    };

    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(max_dimension) = args.max_dimension {
        config.max_dimension = max_dimension;
    }
    config.transcode_media |= args.transcode;
    config.smart_png_to_jpeg |= args.smart_png;
    if args.no_backup {
        config.backup_enabled = false;
    }

    config.validate()?;
    Ok(config)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr, stdout is reserved for JSON events
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let json = args.json;
    let result = run(args).await;
    if let Err(e) = &result {
        if json {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|cause| cause.to_string())).emit();
        }
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args).await?;

    let files = FileManager::collect_inputs(&args.inputs)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!("No Office documents found in the given inputs"));
    }

    let (stop_sender, stop_receiver) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing the current entry");
            let _ = stop_sender.send(());
        }
    });

    let mut compressor = OfficeCompressor::new(config.clone())?.with_cancellation(stop_receiver);
    if let Some(path) = &args.ffmpeg {
        compressor = compressor.with_transcoder_path(Some(path.clone()));
    }

    if config.transcode_media {
        match compressor.check_transcoder().await {
            Ok(status) => info!("{}", status),
            Err(reason) => {
                warn!("{}", reason);
                info!("{}", ToolPathResolver::install_instructions());
            }
        }
    }

    let total = files.len();
    if args.config.is_none() {
        info!("Preset: {}", args.preset.label());
    }
    info!(
        "Processing {} document(s): quality {}, max dimension {}px",
        total, config.quality, config.max_dimension
    );

    let progress = if args.json {
        JsonMessage::start(total, JsonConfig::from(&config), compressor.transcoder_available()).emit();
        ProgressManager::hidden()
    } else {
        ProgressManager::new(total as u64)
    };

    let mut errors = 0;
    for (index, input) in files.iter().enumerate() {
        let output = if args.replace {
            FileManager::replace_output_path(input)
        } else {
            FileManager::copy_output_path(input)
        };
        let name = display_name(input);
        progress.set_message(&name);

        let json = args.json;
        let on_progress: &ProgressFn = &|fraction: f64| {
            if json {
                JsonMessage::progress(input.clone(), index, total, fraction).emit();
            } else {
                progress.set_file_progress(index, fraction);
            }
        };
        let on_log: &LogFn = &|message: &str| JsonMessage::log(input.clone(), message).emit();
        let sinks = ProgressSinks {
            progress: Some(on_progress),
            log: json.then_some(on_log),
        };

        match compressor.compress(input, &output, sinks).await {
            Ok(outcome) => {
                let final_path = if args.replace {
                    if let Err(e) = FileManager::replace_file(input, &output).await {
                        errors += 1;
                        error!("Could not replace {}: {}", input.display(), e);
                        if json {
                            JsonMessage::file_failed(input.clone(), e.to_string()).emit();
                        }
                        continue;
                    }
                    input.clone()
                } else {
                    output.clone()
                };

                if json {
                    JsonMessage::file_complete(input.clone(), final_path, &outcome).emit();
                } else {
                    progress.println(&format!(
                        "✅ {}: {} -> {} (-{:.1}%)",
                        name,
                        FileManager::format_size(outcome.original_size),
                        FileManager::format_size(outcome.compressed_size),
                        outcome.reduction_percent()
                    ));
                }
            }
            Err(e) => {
                errors += 1;
                let cancelled = matches!(e, CompressError::Cancelled);
                if json {
                    JsonMessage::file_failed(input.clone(), e.to_string()).emit();
                } else {
                    progress.println(&format!("❌ {}: {}", name, e));
                }
                if cancelled {
                    break;
                }
            }
        }
    }

    progress.finish("Done");

    let stats = compressor.get_statistics();
    if args.json {
        JsonMessage::complete(&stats, errors).emit();
    } else if let Some(report) = stats.report() {
        println!("\n📊 Session statistics\n{}", report);
    }

    if errors > 0 {
        return Err(anyhow::anyhow!("{} of {} document(s) failed", errors, total));
    }
    Ok(())
}
