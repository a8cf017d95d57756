//! # Image Processing Module
//!
//! Questo modulo ricomprime in memoria le immagini incorporate nei documenti Office
//! usando la libreria `image`.
//!
//! ## Pipeline di Ottimizzazione
//!
//! 1. **Decodifica**: `image::load_from_memory` sui byte dell'entry
//! 2. **Ridimensionamento**: se un lato supera `max_dimension`, Lanczos3 mantenendo le proporzioni
//! 3. **Scelta formato**:
//!    - Sorgenti non PNG: convertite in RGB e codificate JPEG a `quality`
//!    - PNG: ricodifica lossless di default
//!    - PNG con `smart_png_to_jpeg`: se nessun pixel campionato è trasparente, JPEG
//!    - PNG che restano PNG con canale alpha: quantizzati a 256 colori (palette + tRNS)
//! 4. **Gate di dimensione**: il risultato è accettato solo se strettamente più piccolo
//!
//! ## Error Handling
//!
//! Nessun errore esce da `recompress`: decodifica o codifica fallite producono
//! `RecompressionResult::Unchanged` con un warning per il log.
//!
//! ## Rilevamento trasparenza
//!
//! | Caso | Trasparente |
//! |------|-------------|
//! | PNG a palette con chunk `tRNS` | sì |
//! | Nessun canale alpha | no |
//! | Almeno una sonda con alpha < 250 (max 500 sonde casuali) | sì |

use crate::config::CompressionConfig;
use crate::entry::RecompressionResult;
use crate::error::EntryError;
use color_quant::NeuQuant;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageEncoder, ImageFormat};
use rand::Rng;
use tracing::{debug, warn};

/// Alpha values below this count as transparent.
const OPAQUE_ALPHA_THRESHOLD: u8 = 250;
/// Upper bound on random alpha probes per image.
const MAX_ALPHA_PROBES: u64 = 500;
const PALETTE_SIZE: usize = 256;
/// NeuQuant sampling factor (1 = best, 30 = fastest).
const QUANT_SAMPLE_FACTOR: i32 = 10;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Encoding chosen for a recompressed image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutputFormat {
    Jpeg,
    Png,
    PalettePng,
}

/// Result of one image recompression attempt
#[derive(Debug, Clone)]
pub struct ImageRecompression {
    pub result: RecompressionResult,
    /// Encoding attempted, `None` when decoding or encoding failed
    pub format: Option<ImageOutputFormat>,
    /// An opaque PNG was re-encoded as JPEG
    pub converted_png_to_jpeg: bool,
    /// Failure description when the original bytes are kept because of an error
    pub warning: Option<String>,
}

impl ImageRecompression {
    /// Keep the original bytes because of `reason`.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            result: RecompressionResult::Unchanged,
            format: None,
            converted_png_to_jpeg: false,
            warning: Some(reason.into()),
        }
    }
}

struct Encoded {
    bytes: Vec<u8>,
    format: ImageOutputFormat,
    converted_png_to_jpeg: bool,
}

/// Recompresses embedded images in memory
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    config: CompressionConfig,
}

impl ImageProcessor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Recompress one image entry. Never fails: errors degrade to `Unchanged`.
    pub fn recompress(&self, raw: &[u8], path: &str) -> ImageRecompression {
        match self.encode(raw, path) {
            Ok(encoded) => {
                let result = RecompressionResult::accept_if_smaller(raw.len(), encoded.bytes);
                debug!(
                    "{}: {:?} output {} (original {} bytes)",
                    path,
                    encoded.format,
                    if result.changed() { "accepted" } else { "rejected, not smaller" },
                    raw.len()
                );
                ImageRecompression {
                    result,
                    format: Some(encoded.format),
                    converted_png_to_jpeg: encoded.converted_png_to_jpeg,
                    warning: None,
                }
            }
            Err(e) => {
                warn!("Keeping original image {}: {}", path, e);
                ImageRecompression::skipped(e.to_string())
            }
        }
    }

    fn encode(&self, raw: &[u8], path: &str) -> Result<Encoded, EntryError> {
        let is_png = is_png_source(raw, path);
        let img = image::load_from_memory(raw).map_err(EntryError::Decode)?;
        let img = self.downscale(img);

        if !is_png {
            return Ok(Encoded {
                bytes: self.encode_jpeg(&img)?,
                format: ImageOutputFormat::Jpeg,
                converted_png_to_jpeg: false,
            });
        }

        if self.config.smart_png_to_jpeg && !has_actual_transparency(&img, raw) {
            debug!("{}: PNG has no visible transparency, converting to JPEG", path);
            return Ok(Encoded {
                bytes: self.encode_jpeg(&img)?,
                format: ImageOutputFormat::Jpeg,
                converted_png_to_jpeg: true,
            });
        }

        if img.color().has_alpha() {
            Ok(Encoded {
                bytes: encode_palette_png(&img)?,
                format: ImageOutputFormat::PalettePng,
                converted_png_to_jpeg: false,
            })
        } else {
            Ok(Encoded {
                bytes: encode_lossless_png(&img)?,
                format: ImageOutputFormat::Png,
                converted_png_to_jpeg: false,
            })
        }
    }

    /// Bound the longer edge to `max_dimension`, keeping the aspect ratio.
    fn downscale(&self, img: DynamicImage) -> DynamicImage {
        let max = self.config.max_dimension;
        let (width, height) = img.dimensions();
        if width <= max && height <= max {
            return img;
        }
        debug!("Resizing {}x{} to fit {}x{}", width, height, max, max);
        img.resize(max, max, FilterType::Lanczos3)
    }

    fn encode_jpeg(&self, img: &DynamicImage) -> Result<Vec<u8>, EntryError> {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.config.quality.clamp(1, 100))
            .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
            .map_err(|e| EntryError::Encode(e.to_string()))?;
        Ok(out)
    }
}

fn encode_lossless_png(img: &DynamicImage) -> Result<Vec<u8>, EntryError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
    let written = if img.color().has_color() {
        let rgb = img.to_rgb8();
        encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
    } else {
        let luma = img.to_luma8();
        encoder.write_image(luma.as_raw(), luma.width(), luma.height(), ColorType::L8)
    };
    written.map_err(|e| EntryError::Encode(e.to_string()))?;
    Ok(out)
}

/// Quantize to a 256-entry palette and write an indexed PNG with a tRNS chunk.
fn encode_palette_png(img: &DynamicImage) -> Result<Vec<u8>, EntryError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels = rgba.as_raw();

    let quantizer = NeuQuant::new(QUANT_SAMPLE_FACTOR, PALETTE_SIZE, pixels);
    let indices: Vec<u8> = pixels
        .chunks_exact(4)
        .map(|px| quantizer.index_of(px) as u8)
        .collect();

    let color_map = quantizer.color_map_rgba();
    let mut palette = Vec::with_capacity(PALETTE_SIZE * 3);
    let mut alphas = Vec::with_capacity(PALETTE_SIZE);
    for color in color_map.chunks_exact(4) {
        palette.extend_from_slice(&color[..3]);
        alphas.push(color[3]);
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);
        encoder.set_palette(palette);
        encoder.set_trns(alphas);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indices)?;
        writer.finish()?;
    }
    Ok(out)
}

/// PNG detection by content first, then by entry suffix.
fn is_png_source(raw: &[u8], path: &str) -> bool {
    match image::guess_format(raw) {
        Ok(format) => format == ImageFormat::Png,
        Err(_) => path.to_lowercase().ends_with(".png"),
    }
}

/// Whether any part of the image is visibly transparent.
fn has_actual_transparency(img: &DynamicImage, raw: &[u8]) -> bool {
    if png_palette_has_trns(raw) {
        return true;
    }
    if !img.color().has_alpha() {
        return false;
    }

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return false;
    }
    let probes = (u64::from(width) * u64::from(height)).min(MAX_ALPHA_PROBES);
    let mut rng = rand::thread_rng();
    (0..probes).any(|_| {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);
        img.get_pixel(x, y)[3] < OPAQUE_ALPHA_THRESHOLD
    })
}

/// True for an indexed-color PNG that declares a tRNS chunk.
fn png_palette_has_trns(raw: &[u8]) -> bool {
    // signature(8) + IHDR length(4) + type(4) + width(4) + height(4) + depth(1)
    const COLOR_TYPE_OFFSET: usize = 25;
    const INDEXED: u8 = 3;

    if raw.len() <= COLOR_TYPE_OFFSET || raw[..8] != PNG_SIGNATURE || raw[COLOR_TYPE_OFFSET] != INDEXED {
        return false;
    }

    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= raw.len() {
        let len = u32::from_be_bytes([raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]]) as usize;
        match &raw[pos + 4..pos + 8] {
            b"tRNS" => return true,
            b"IDAT" | b"IEND" => return false,
            _ => {}
        }
        // length + type + data + crc
        pos = match pos.checked_add(12).and_then(|p| p.checked_add(len)) {
            Some(next) => next,
            None => return false,
        };
    }
    false
}
