//! # Media Classifier
//!
//! Classifica le entry di un pacchetto Office in base al percorso.
//!
//! ## Regole:
//! - L'entry deve trovarsi sotto una cartella `media` (es. `ppt/media/`, `word/media/`)
//! - Il suffisso è confrontato senza distinzione tra maiuscole e minuscole
//! - Tutto ciò che non corrisponde è `Other` e viene copiato invariato

/// Media segment every Office package uses for embedded assets.
const MEDIA_SEGMENT: &str = "media";

const IMAGE_SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp"];
const VIDEO_SUFFIXES: &[&str] = &["mp4", "m4v", "mov", "avi", "wmv", "mkv", "flv", "webm"];
const AUDIO_SUFFIXES: &[&str] = &["wav", "mp3", "m4a", "wma", "ogg", "flac"];

/// Content category of an archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Other,
}

/// Classify an entry path. Pure and infallible.
pub fn classify(entry_path: &str) -> MediaKind {
    let lower = entry_path.to_lowercase();
    let mut segments: Vec<&str> = lower.split(is_separator).collect();

    let Some(file_name) = segments.pop() else {
        return MediaKind::Other;
    };
    if !segments.iter().any(|segment| *segment == MEDIA_SEGMENT) {
        return MediaKind::Other;
    }

    let Some((_, suffix)) = file_name.rsplit_once('.') else {
        return MediaKind::Other;
    };

    if IMAGE_SUFFIXES.contains(&suffix) {
        MediaKind::Image
    } else if VIDEO_SUFFIXES.contains(&suffix) {
        MediaKind::Video
    } else if AUDIO_SUFFIXES.contains(&suffix) {
        MediaKind::Audio
    } else {
        MediaKind::Other
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Lower-cased suffix of an entry path, without the dot.
pub fn suffix_of(entry_path: &str) -> Option<String> {
    let file_name = entry_path.rsplit(is_separator).next()?;
    file_name
        .rsplit_once('.')
        .map(|(_, suffix)| suffix.to_lowercase())
        .filter(|suffix| !suffix.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_under_media() {
        assert_eq!(classify("ppt/media/image1.png"), MediaKind::Image);
        assert_eq!(classify("word/media/photo.JPEG"), MediaKind::Image);
        assert_eq!(classify("xl/media/scan.Tif"), MediaKind::Image);
        assert_eq!(classify("ppt/media/old.bmp"), MediaKind::Image);
    }

    #[test]
    fn test_video_and_audio() {
        assert_eq!(classify("ppt/media/media1.mp4"), MediaKind::Video);
        assert_eq!(classify("ppt/media/clip.WMV"), MediaKind::Video);
        assert_eq!(classify("ppt/media/intro.webm"), MediaKind::Video);
        assert_eq!(classify("ppt/media/media2.wav"), MediaKind::Audio);
        assert_eq!(classify("ppt/media/voice.m4a"), MediaKind::Audio);
        assert_eq!(classify("ppt/media/theme.FLAC"), MediaKind::Audio);
    }

    #[test]
    fn test_media_segment_required() {
        assert_eq!(classify("docProps/thumbnail.jpeg"), MediaKind::Other);
        assert_eq!(classify("image1.png"), MediaKind::Other);
        assert_eq!(classify("ppt/multimedia/image1.png"), MediaKind::Other);
        assert_eq!(classify("media.png"), MediaKind::Other);
    }

    #[test]
    fn test_non_media_entries() {
        assert_eq!(classify("[Content_Types].xml"), MediaKind::Other);
        assert_eq!(classify("ppt/slides/slide1.xml"), MediaKind::Other);
        assert_eq!(classify("ppt/media/image1.emf"), MediaKind::Other);
        assert_eq!(classify("ppt/media/"), MediaKind::Other);
        assert_eq!(classify("ppt/media/noext"), MediaKind::Other);
        assert_eq!(classify(""), MediaKind::Other);
    }

    #[test]
    fn test_suffix_of() {
        assert_eq!(suffix_of("ppt/media/Image1.PNG").as_deref(), Some("png"));
        assert_eq!(suffix_of("ppt/media/a.b.wav").as_deref(), Some("wav"));
        assert_eq!(suffix_of("ppt/media/noext"), None);
        assert_eq!(suffix_of("ppt/media/trailing."), None);
    }
}
