//! # Utility Functions Module
//!
//! Small helpers shared by the transcoder command lines and the log messages.

/// Builds a `Vec<String>` from heterogeneous displayable values.
///
/// # Example
/// ```rust
/// use office_media_optimizer::args;
///
/// let args = args!["-b:a", "192k", "-ac", 2];
/// assert_eq!(args, vec!["-b:a", "192k", "-ac", "2"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$($item.to_string()),*]
    };
}

/// Cuts `text` to at most `limit` characters, marking the cut with `...`.
pub fn truncate_name(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Last path segment of an archive entry name.
pub fn entry_file_name(entry_path: &str) -> &str {
    entry_path
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(entry_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_macro() {
        let rate = 44100;
        let result = args!["-ar", rate, "-ac", 2];
        assert_eq!(result, vec!["-ar", "44100", "-ac", "2"]);
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("ppt/media/media1.mp4", 40), "ppt/media/media1.mp4");

        let long = "ppt/media/a_really_long_video_file_name_for_the_intro.mp4";
        let cut = truncate_name(long, 40);
        assert_eq!(cut.chars().count(), 40);
        assert!(cut.ends_with("..."));
        assert!(long.starts_with(cut.trim_end_matches("...")));
    }

    #[test]
    fn test_truncate_name_multibyte() {
        let name = "ppt/media/présentation_vidéo_très_longue_finale.mp4";
        let cut = truncate_name(name, 20);
        assert_eq!(cut.chars().count(), 20);
    }

    #[test]
    fn test_entry_file_name() {
        assert_eq!(entry_file_name("ppt/media/image1.png"), "image1.png");
        assert_eq!(entry_file_name("image1.png"), "image1.png");
    }
}
