//! # Archive Rewriter
//!
//! Questo modulo ricostruisce un pacchetto Office entry per entry.
//!
//! ## Responsabilità:
//! - Apre il sorgente con accesso casuale e il destinatario come writer zip
//! - Classifica ogni entry e la instrada al ricompressore adatto
//! - Scrive i byte ricompressi (Deflate, metadata originali) oppure copia
//!   l'entry raw senza decomprimerla
//! - Controlla il segnale di stop tra una entry e l'altra
//! - Emette progresso ogni `PROGRESS_EVERY` entry e righe di log per milestone
//!
//! ## Invarianti:
//! - Stesso insieme di entry, nello stesso ordine del sorgente
//! - Una entry è sostituita solo quando il risultato è più piccolo
//! - Le entry `Other` sono copiate byte per byte

use crate::classifier::{classify, MediaKind};
use crate::config::{CompressionConfig, PROGRESS_EVERY};
use crate::entry::{ArchiveEntry, EntryMetadata, RecompressionResult};
use crate::error::CompressError;
use crate::file_manager::FileManager;
use crate::image_processor::{ImageProcessor, ImageRecompression};
use crate::progress::ProgressSinks;
use crate::transcoder::Transcoder;
use crate::utils::{entry_file_name, truncate_name};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Display width of entry names in log lines.
const LOG_NAME_LIMIT: usize = 40;

/// Cooperative stop flag polled between entries.
///
/// Once a stop has been observed it stays set, so every later poll of the same
/// run also reports it.
#[derive(Debug, Default)]
pub struct StopSignal {
    receiver: Option<broadcast::Receiver<()>>,
    stopped: bool,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self {
            receiver: Some(receiver),
            stopped: false,
        }
    }

    /// Create a stop channel: the sender side goes to whoever can cancel.
    pub fn channel(capacity: usize) -> (broadcast::Sender<()>, Self) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (sender, Self::new(receiver))
    }

    /// Check whether a stop has been requested
    pub fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if let Some(ref mut receiver) = self.receiver {
            match receiver.try_recv() {
                Ok(_) => {
                    debug!("Stop signal received, cancelling rewrite");
                    self.stopped = true;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    debug!("Stop signal was lagged, cancelling rewrite");
                    self.stopped = true;
                }
                Err(broadcast::error::TryRecvError::Empty) => {}
                Err(broadcast::error::TryRecvError::Closed) => {}
            }
        }
        self.stopped
    }
}

/// Per-archive counters of one rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub entries: usize,
    pub images_replaced: usize,
    pub media_replaced: usize,
    /// Sum of uncompressed bytes saved across replaced entries
    pub entry_bytes_saved: u64,
}

/// Dispatch decision for one entry
enum Route<'t> {
    Copy,
    Image,
    Video(&'t Transcoder),
    Audio(&'t Transcoder),
}

/// Rebuilds an Office package, recompressing media entries
pub struct ArchiveRewriter<'a> {
    config: &'a CompressionConfig,
    images: &'a ImageProcessor,
    transcoder: Option<&'a Transcoder>,
}

impl<'a> ArchiveRewriter<'a> {
    /// `transcoder` is `None` when no executable was located; media entries are then copied.
    pub fn new(
        config: &'a CompressionConfig,
        images: &'a ImageProcessor,
        transcoder: Option<&'a Transcoder>,
    ) -> Self {
        Self {
            config,
            images,
            transcoder,
        }
    }

    fn route(&self, kind: MediaKind, is_dir: bool) -> Route<'a> {
        if is_dir {
            return Route::Copy;
        }
        match (kind, self.transcoder) {
            (MediaKind::Image, _) => Route::Image,
            (MediaKind::Video, Some(t)) if self.config.transcode_media => Route::Video(t),
            (MediaKind::Audio, Some(t)) if self.config.transcode_media => Route::Audio(t),
            _ => Route::Copy,
        }
    }

    /// Rewrite `source` into a new archive at `dest`.
    ///
    /// Entry-level failures are recovered by copying the original entry. Any
    /// error returned here leaves `dest` incomplete. Zip reads and writes run on
    /// the blocking pool, one step at a time.
    pub async fn rewrite(
        &self,
        source: &Path,
        dest: &Path,
        sinks: ProgressSinks<'_>,
        stop: &mut StopSignal,
    ) -> Result<RewriteSummary, CompressError> {
        let (source_path, dest_path) = (source.to_path_buf(), dest.to_path_buf());
        let mut zip = tokio::task::spawn_blocking(move || ZipPair::open(&source_path, &dest_path))
            .await
            .map_err(worker_failed)??;
        let total = zip.reader.len();
        let mut summary = RewriteSummary::default();

        debug!("Rewriting {} entries: {} -> {}", total, source.display(), dest.display());

        for index in 0..total {
            if stop.should_stop() {
                return Err(CompressError::Cancelled);
            }
            if index % PROGRESS_EVERY == 0 {
                sinks.report(index as f64 / total as f64);
            }

            let (pair, (name, is_dir)) = on_blocking(zip, move |z| z.header(index)).await?;
            zip = pair;

            let rewritten = match self.route(classify(&name), is_dir) {
                Route::Copy => Rewritten::Keep,
                Route::Image => {
                    let (pair, entry) = on_blocking(zip, move |z| read_entry(&mut z.reader, index)).await?;
                    zip = pair;
                    let original_len = entry.size();
                    let outcome = self.recompress_image(entry.raw_bytes, &entry.path).await;
                    self.log_image(&entry.path, original_len, &outcome, sinks);
                    if outcome.result.changed() {
                        summary.images_replaced += 1;
                    }
                    Rewritten::new(outcome.result, entry.path, entry.metadata, original_len)
                }
                Route::Video(transcoder) => {
                    let (pair, entry) = on_blocking(zip, move |z| read_entry(&mut z.reader, index)).await?;
                    zip = pair;
                    sinks.log(&format!("Video: {}...", truncate_name(&entry.path, LOG_NAME_LIMIT)));
                    let result = transcoder.transcode_video(&entry.raw_bytes, &entry.path).await;
                    if result.changed() {
                        summary.media_replaced += 1;
                    }
                    let original_len = entry.size();
                    Rewritten::new(result, entry.path, entry.metadata, original_len)
                }
                Route::Audio(transcoder) => {
                    let (pair, entry) = on_blocking(zip, move |z| read_entry(&mut z.reader, index)).await?;
                    zip = pair;
                    sinks.log(&format!("Audio: {}...", truncate_name(&entry.path, LOG_NAME_LIMIT)));
                    let result = transcoder.transcode_audio(&entry.raw_bytes, &entry.path).await;
                    if result.changed() {
                        summary.media_replaced += 1;
                    }
                    let original_len = entry.size();
                    Rewritten::new(result, entry.path, entry.metadata, original_len)
                }
            };

            if let Rewritten::Replace { bytes, original_len, .. } = &rewritten {
                summary.entry_bytes_saved += original_len.saturating_sub(bytes.len()) as u64;
            }
            let (pair, ()) = on_blocking(zip, move |z| z.write(index, rewritten)).await?;
            zip = pair;
            summary.entries += 1;
        }

        tokio::task::spawn_blocking(move || zip.finish())
            .await
            .map_err(worker_failed)??;
        sinks.report(1.0);

        debug!(
            "Rewrite done: {} entries, {} images and {} media replaced, {} bytes saved",
            summary.entries, summary.images_replaced, summary.media_replaced, summary.entry_bytes_saved
        );
        Ok(summary)
    }

    async fn recompress_image(&self, raw: Vec<u8>, name: &str) -> ImageRecompression {
        let processor = self.images.clone();
        let path = name.to_string();
        match tokio::task::spawn_blocking(move || processor.recompress(&raw, &path)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Image worker for {} failed: {}", name, e);
                ImageRecompression::skipped(e.to_string())
            }
        }
    }

    fn log_image(&self, name: &str, original_len: usize, outcome: &ImageRecompression, sinks: ProgressSinks<'_>) {
        let file_name = entry_file_name(name);
        if let Some(warning) = &outcome.warning {
            sinks.log(&format!("  Image processing error: {}", warning));
            return;
        }
        if let RecompressionResult::Replaced(bytes) = &outcome.result {
            if outcome.converted_png_to_jpeg {
                sinks.log(&format!("  Converted PNG to JPEG: {}", file_name));
            }
            let saved = original_len.saturating_sub(bytes.len()) as u64;
            sinks.log(&format!("  Compressed: {} (-{})", file_name, FileManager::format_size(saved)));
        } else {
            debug!("Image {} kept: no smaller encoding", name);
        }
    }
}

/// Source archive and destination writer of one rewrite
struct ZipPair {
    reader: ZipArchive<BufReader<File>>,
    writer: ZipWriter<BufWriter<File>>,
}

impl ZipPair {
    /// The source is opened first, so an unreadable source never creates `dest`.
    fn open(source: &Path, dest: &Path) -> Result<Self, CompressError> {
        let reader = ZipArchive::new(BufReader::new(File::open(source)?))?;
        let writer = ZipWriter::new(BufWriter::new(File::create(dest)?));
        Ok(Self { reader, writer })
    }

    fn header(&mut self, index: usize) -> Result<(String, bool), CompressError> {
        let file = self.reader.by_index_raw(index)?;
        Ok((file.name().to_string(), file.is_dir()))
    }

    fn write(&mut self, index: usize, rewritten: Rewritten) -> Result<(), CompressError> {
        match rewritten {
            Rewritten::Replace { path, bytes, metadata, .. } => {
                self.writer.start_file(path.as_str(), replacement_options(&metadata))?;
                self.writer.write_all(&bytes)?;
            }
            Rewritten::Keep => {
                self.writer.raw_copy_file(self.reader.by_index_raw(index)?)?;
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(), CompressError> {
        let mut out = self.writer.finish()?;
        out.flush()?;
        Ok(())
    }
}

/// Run one zip step on the blocking pool, handing the pair back afterwards.
async fn on_blocking<T, F>(zip: ZipPair, step: F) -> Result<(ZipPair, T), CompressError>
where
    F: FnOnce(&mut ZipPair) -> Result<T, CompressError> + Send + 'static,
    T: Send + 'static,
{
    let (zip, result) = tokio::task::spawn_blocking(move || {
        let mut zip = zip;
        let result = step(&mut zip);
        (zip, result)
    })
    .await
    .map_err(worker_failed)?;
    Ok((zip, result?))
}

fn worker_failed(e: tokio::task::JoinError) -> CompressError {
    CompressError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// What to write for one entry
enum Rewritten {
    /// Raw copy of the source entry
    Keep,
    Replace {
        path: String,
        bytes: Vec<u8>,
        metadata: EntryMetadata,
        original_len: usize,
    },
}

impl Rewritten {
    fn new(result: RecompressionResult, path: String, metadata: EntryMetadata, original_len: usize) -> Self {
        match result {
            RecompressionResult::Replaced(bytes) => Rewritten::Replace {
                path,
                bytes,
                metadata,
                original_len,
            },
            RecompressionResult::Unchanged => Rewritten::Keep,
        }
    }
}

/// Upper bound on the buffer reserved from a header's declared size.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Initial buffer size for an entry; the header value is not trusted beyond the cap.
fn preallocation(declared_size: u64) -> usize {
    usize::try_from(declared_size.min(MAX_PREALLOCATION)).unwrap_or(0)
}

/// Decompress one entry. The `ZipFile` borrow ends before returning.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Result<ArchiveEntry, CompressError> {
    let mut file = archive.by_index(index)?;
    let mut raw_bytes = Vec::with_capacity(preallocation(file.size()));
    file.read_to_end(&mut raw_bytes)?;

    let last_modified: Option<zip::DateTime> = file.last_modified().into();
    Ok(ArchiveEntry {
        path: file.name().to_string(),
        raw_bytes,
        metadata: EntryMetadata {
            compression: file.compression(),
            last_modified,
            unix_mode: file.unix_mode(),
        },
    })
}

/// Deflate for replaced entries, keeping the original timestamp and permissions.
fn replacement_options(metadata: &EntryMetadata) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    if let Some(modified) = metadata.last_modified {
        options = options.last_modified_time(modified);
    }
    if let Some(mode) = metadata.unix_mode {
        options = options.unix_permissions(mode);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry, entry_names, noise_png, read_package, write_package, CONTENT_TYPES};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn config(smart_png_to_jpeg: bool, transcode_media: bool) -> CompressionConfig {
        CompressionConfig {
            smart_png_to_jpeg,
            transcode_media,
            ..CompressionConfig::default()
        }
    }

    async fn rewrite_with(
        config: &CompressionConfig,
        transcoder: Option<&Transcoder>,
        source: &Path,
        dest: &Path,
    ) -> Result<RewriteSummary, CompressError> {
        let images = ImageProcessor::new(config.clone());
        let rewriter = ArchiveRewriter::new(config, &images, transcoder);
        rewriter
            .rewrite(source, dest, ProgressSinks::default(), &mut StopSignal::none())
            .await
    }

    #[test]
    fn test_stop_signal_semantics() {
        let mut never = StopSignal::none();
        assert!(!never.should_stop());

        let (sender, mut signal) = StopSignal::channel(1);
        assert!(!signal.should_stop());
        sender.send(()).unwrap();
        assert!(signal.should_stop());
        // sticky once observed
        assert!(signal.should_stop());

        let (sender, mut closed) = StopSignal::channel(1);
        drop(sender);
        assert!(!closed.should_stop());
    }

    #[tokio::test]
    async fn test_entries_preserved_and_image_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("deck.pptx");
        let dest = temp_dir.path().join("deck_Optimized.pptx");
        let png = noise_png(128, 128);
        let slide = b"<p:sld>hello</p:sld>".to_vec();
        write_package(
            &source,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("ppt/slides/slide1.xml", &slide),
                ("ppt/media/image1.png", &png),
                ("docProps/thumbnail.png", &png),
            ],
        );

        let summary = rewrite_with(&config(true, false), None, &source, &dest).await.unwrap();

        let output = read_package(&dest);
        assert_eq!(
            entry_names(&output),
            vec![
                "[Content_Types].xml",
                "ppt/slides/slide1.xml",
                "ppt/media/image1.png",
                "docProps/thumbnail.png",
            ]
        );
        assert_eq!(entry(&output, "[Content_Types].xml"), CONTENT_TYPES);
        assert_eq!(entry(&output, "ppt/slides/slide1.xml"), slide.as_slice());
        // outside a media folder: untouched
        assert_eq!(entry(&output, "docProps/thumbnail.png"), png.as_slice());

        let image = entry(&output, "ppt/media/image1.png");
        assert!(image.len() < png.len());
        assert_eq!(image::guess_format(image).unwrap(), image::ImageFormat::Jpeg);

        assert_eq!(summary.entries, 4);
        assert_eq!(summary.images_replaced, 1);
        assert_eq!(summary.entry_bytes_saved, (png.len() - image.len()) as u64);
    }

    #[test]
    fn test_preallocation_ignores_oversized_headers() {
        assert_eq!(preallocation(0), 0);
        assert_eq!(preallocation(4096), 4096);
        assert_eq!(preallocation(u64::MAX), MAX_PREALLOCATION as usize);
        assert_eq!(preallocation(MAX_PREALLOCATION + 1), MAX_PREALLOCATION as usize);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_concurrent_rewrites_on_one_worker() {
        let temp_dir = TempDir::new().unwrap();
        let png = noise_png(128, 128);
        let mut jobs = Vec::new();
        for name in ["a.pptx", "b.pptx"] {
            let source = temp_dir.path().join(name);
            let dest = temp_dir.path().join(format!("out_{}", name));
            write_package(
                &source,
                &[
                    ("[Content_Types].xml", CONTENT_TYPES),
                    ("ppt/media/image1.png", &png),
                ],
            );
            jobs.push(tokio::spawn(async move {
                let cfg = config(true, false);
                let images = ImageProcessor::new(cfg.clone());
                let summary = ArchiveRewriter::new(&cfg, &images, None)
                    .rewrite(&source, &dest, ProgressSinks::default(), &mut StopSignal::none())
                    .await;
                (dest, summary)
            }));
        }

        for job in jobs {
            let (dest, summary) = job.await.unwrap();
            assert_eq!(summary.unwrap().images_replaced, 1);
            let output = read_package(&dest);
            assert_eq!(entry_names(&output), vec!["[Content_Types].xml", "ppt/media/image1.png"]);
        }
    }

    #[tokio::test]
    async fn test_corrupt_image_is_copied_verbatim() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("report.docx");
        let dest = temp_dir.path().join("out.docx");
        let png = noise_png(32, 32);
        let truncated = png[..png.len() / 3].to_vec();
        write_package(
            &source,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("word/media/broken.png", &truncated),
                ("word/document.xml", b"<w:document/>"),
            ],
        );

        let lines = Mutex::new(Vec::new());
        let on_log = |m: &str| lines.lock().unwrap().push(m.to_string());
        let sinks = ProgressSinks {
            progress: None,
            log: Some(&on_log),
        };
        let cfg = config(false, false);
        let images = ImageProcessor::new(cfg.clone());
        let summary = ArchiveRewriter::new(&cfg, &images, None)
            .rewrite(&source, &dest, sinks, &mut StopSignal::none())
            .await
            .unwrap();

        let output = read_package(&dest);
        assert_eq!(entry(&output, "word/media/broken.png"), truncated.as_slice());
        assert_eq!(entry(&output, "word/document.xml"), b"<w:document/>");
        assert_eq!(summary.images_replaced, 0);
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.starts_with("  Image processing error:")));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_one() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("book.xlsx");
        let dest = temp_dir.path().join("book_out.xlsx");
        let names: Vec<String> = (0..25).map(|i| format!("xl/worksheets/sheet{}.xml", i)).collect();
        let mut entries: Vec<(&str, &[u8])> = vec![("[Content_Types].xml", CONTENT_TYPES)];
        entries.extend(names.iter().map(|n| (n.as_str(), b"<sheet/>".as_slice())));
        write_package(&source, &entries);

        let fractions = Mutex::new(Vec::new());
        let on_progress = |f: f64| fractions.lock().unwrap().push(f);
        let sinks = ProgressSinks {
            progress: Some(&on_progress),
            log: None,
        };
        let cfg = config(false, false);
        let images = ImageProcessor::new(cfg.clone());
        ArchiveRewriter::new(&cfg, &images, None)
            .rewrite(&source, &dest, sinks, &mut StopSignal::none())
            .await
            .unwrap();

        let fractions = fractions.lock().unwrap();
        // 26 entries: reports at 0, 10, 20, then the final one
        assert_eq!(fractions.len(), 4);
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fractions.first(), Some(&0.0));
        assert_eq!(fractions.last(), Some(&1.0));
    }

    #[tokio::test]
    async fn test_media_copied_without_transcoder() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("deck.pptx");
        let dest = temp_dir.path().join("out.pptx");
        let video = vec![7u8; 4096];
        let audio = vec![3u8; 2048];
        write_package(
            &source,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("ppt/media/media1.mp4", &video),
                ("ppt/media/media2.wav", &audio),
            ],
        );

        let summary = rewrite_with(&config(false, true), None, &source, &dest).await.unwrap();

        let output = read_package(&dest);
        assert_eq!(entry(&output, "ppt/media/media1.mp4"), video.as_slice());
        assert_eq!(entry(&output, "ppt/media/media2.wav"), audio.as_slice());
        assert_eq!(summary.media_replaced, 0);
    }

    #[tokio::test]
    async fn test_media_copied_when_transcoder_cannot_start() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("deck.pptx");
        let dest = temp_dir.path().join("out.pptx");
        let video = vec![9u8; 1024];
        write_package(
            &source,
            &[("[Content_Types].xml", CONTENT_TYPES), ("ppt/media/clip.mov", &video)],
        );

        let cfg = config(false, true);
        let transcoder = Transcoder::new(temp_dir.path().join("missing-ffmpeg"), cfg.clone());
        let summary = rewrite_with(&cfg, Some(&transcoder), &source, &dest).await.unwrap();

        assert_eq!(entry(&read_package(&dest), "ppt/media/clip.mov"), video.as_slice());
        assert_eq!(summary.media_replaced, 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("deck.pptx");
        let dest = temp_dir.path().join("out.pptx");
        write_package(&source, &[("[Content_Types].xml", CONTENT_TYPES)]);

        let (sender, mut stop) = StopSignal::channel(1);
        sender.send(()).unwrap();

        let cfg = config(false, false);
        let images = ImageProcessor::new(cfg.clone());
        let result = ArchiveRewriter::new(&cfg, &images, None)
            .rewrite(&source, &dest, ProgressSinks::default(), &mut stop)
            .await;

        assert!(matches!(result, Err(CompressError::Cancelled)));
    }

    #[tokio::test]
    async fn test_replaced_entry_keeps_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("deck.pptx");
        let dest = temp_dir.path().join("out.pptx");
        write_package(
            &source,
            &[
                ("[Content_Types].xml", CONTENT_TYPES),
                ("ppt/media/image1.png", &noise_png(96, 96)),
            ],
        );

        let summary = rewrite_with(&config(true, false), None, &source, &dest).await.unwrap();
        assert_eq!(summary.images_replaced, 1);

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let file = archive.by_name("ppt/media/image1.png").unwrap();
        assert_eq!(file.compression(), CompressionMethod::Deflated);
        let modified: Option<zip::DateTime> = file.last_modified().into();
        let modified = modified.unwrap();
        assert_eq!(
            (modified.year(), modified.month(), modified.day(), modified.hour(), modified.minute()),
            (2021, 6, 15, 10, 30)
        );
    }

    #[tokio::test]
    async fn test_not_a_zip_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("fake.pptx");
        let dest = temp_dir.path().join("out.pptx");
        std::fs::write(&source, b"definitely not a zip").unwrap();

        let result = rewrite_with(&config(false, false), None, &source, &dest).await;
        assert!(matches!(result, Err(CompressError::Zip(_))));
    }
}
