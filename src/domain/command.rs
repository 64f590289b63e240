use std::fmt;
use std::path::PathBuf;

use super::TaskError;

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreset {
    #[default]
    BestVideo,
    Mp4,
    Mp3,
    M4a,
    Opus,
    Flac,
}

impl FormatPreset {
    pub const ALL: [FormatPreset; 6] = [
        FormatPreset::BestVideo,
        FormatPreset::Mp4,
        FormatPreset::Mp3,
        FormatPreset::M4a,
        FormatPreset::Opus,
        FormatPreset::Flac,
    ];

    /// Codec passed to `--audio-format` for audio-only presets.
    pub fn audio_codec(self) -> Option<&'static str> {
        match self {
            FormatPreset::Mp3 => Some("mp3"),
            FormatPreset::M4a => Some("m4a"),
            FormatPreset::Opus => Some("opus"),
            FormatPreset::Flac => Some("flac"),
            FormatPreset::BestVideo | FormatPreset::Mp4 => None,
        }
    }

    fn default_video_format(self) -> Option<&'static str> {
        match self {
            FormatPreset::BestVideo => Some("bestvideo*+bestaudio/best"),
            FormatPreset::Mp4 => Some("bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/b"),
            _ => None,
        }
    }
}

impl fmt::Display for FormatPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FormatPreset::BestVideo => "Best video + audio",
            FormatPreset::Mp4 => "MP4 video",
            FormatPreset::Mp3 => "MP3 audio",
            FormatPreset::M4a => "M4A audio",
            FormatPreset::Opus => "Opus audio",
            FormatPreset::Flac => "FLAC audio",
        };
        f.write_str(label)
    }
}

/// Snapshot of the form, from which the yt-dlp argument list is built.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub url: String,
    pub output_dir: PathBuf,
    pub output_template: String,
    pub preset: FormatPreset,
    pub format_code: String,
    pub ignore_config: bool,
    pub no_mtime: bool,
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub sponsorblock: bool,
    pub embed_subs: bool,
    pub rate_limit: String,
    pub cookies_file: String,
    pub cookies_from_browser: String,
    pub custom_args: String,
}

impl DownloadOptions {
    /// Validate the form and produce the arguments in their fixed order.
    ///
    /// Custom arguments always come after the generated flags so that they
    /// can override them; the URL is last.
    pub fn build_arguments(&self) -> Result<Vec<String>, TaskError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(TaskError::InvalidInput("URL is missing".to_string()));
        }
        url::Url::parse(url)
            .map_err(|e| TaskError::InvalidInput(format!("Invalid URL {url}: {e}")))?;
        if self.output_dir.as_os_str().is_empty() {
            return Err(TaskError::InvalidInput(
                "Download location is missing".to_string(),
            ));
        }
        let custom = tokenize_custom_args(&self.custom_args)?;

        let mut args: Vec<String> = Vec::new();

        if self.ignore_config {
            args.push("--ignore-config".into());
        }
        if self.no_mtime {
            args.push("--no-mtime".into());
        }
        // One line per progress update instead of `\r` redraws.
        args.push("--newline".into());

        let template = self.output_template.trim();
        if template.is_empty() {
            args.push("-P".into());
            args.push(self.output_dir.to_string_lossy().into_owned());
        } else {
            args.push("-o".into());
            args.push(self.output_dir.join(template).to_string_lossy().into_owned());
        }

        let format_code = self.format_code.trim();
        if !format_code.is_empty() {
            args.push("-f".into());
            args.push(format_code.into());
        } else if let Some(default) = self.preset.default_video_format() {
            args.push("-f".into());
            args.push(default.into());
        }

        if let Some(codec) = self.preset.audio_codec() {
            args.extend(["-x".into(), "--audio-format".into(), codec.into()]);
            if format_code.is_empty() {
                args.extend(["-f".into(), "bestaudio/best".into()]);
            }
        }
        if self.preset == FormatPreset::Mp4 {
            args.extend(["--merge-output-format".into(), "mp4".into()]);
        }

        if self.embed_thumbnail {
            args.push("--embed-thumbnail".into());
        }
        if self.add_metadata {
            args.push("--add-metadata".into());
        }
        if self.sponsorblock {
            args.extend(["--sponsorblock-remove".into(), "default".into()]);
        }
        if self.embed_subs {
            args.extend(["--write-subs".into(), "--embed-subs".into()]);
        }

        push_valued(&mut args, "-r", &self.rate_limit);
        push_valued(&mut args, "--cookies", &self.cookies_file);
        push_valued(&mut args, "--cookies-from-browser", &self.cookies_from_browser);

        args.extend(custom);
        args.push(url.to_string());

        Ok(args)
    }
}

fn push_valued(args: &mut Vec<String>, flag: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

/// Split raw user arguments with shell quoting rules.
pub fn tokenize_custom_args(raw: &str) -> Result<Vec<String>, TaskError> {
    shell_words::split(raw).map_err(|e| TaskError::MalformedArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> DownloadOptions {
        DownloadOptions {
            url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            output_dir: PathBuf::from("/tmp/videos"),
            ..Default::default()
        }
    }

    fn contains_window(args: &[String], window: &[&str]) -> bool {
        args.windows(window.len())
            .any(|w| w.iter().zip(window).all(|(a, b)| a == b))
    }

    #[test]
    fn test_tokenize_quoted_arguments() {
        let tokens = tokenize_custom_args(r#"--max-downloads 5 "My File.mp4""#).unwrap();
        assert_eq!(tokens, vec!["--max-downloads", "5", "My File.mp4"]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        let err = tokenize_custom_args(r#"--output "oops"#).unwrap_err();
        assert!(matches!(err, TaskError::MalformedArguments(_)));
    }

    #[test]
    fn test_mp3_without_format_code() {
        let args = DownloadOptions {
            preset: FormatPreset::Mp3,
            ..options()
        }
        .build_arguments()
        .unwrap();
        assert!(contains_window(
            &args,
            &["-x", "--audio-format", "mp3", "-f", "bestaudio/best"]
        ));
    }

    #[test]
    fn test_audio_with_explicit_format_code() {
        let args = DownloadOptions {
            preset: FormatPreset::Opus,
            format_code: "251".into(),
            ..options()
        }
        .build_arguments()
        .unwrap();
        assert!(contains_window(&args, &["-f", "251"]));
        assert!(!args.contains(&"bestaudio/best".to_string()));
        assert!(contains_window(&args, &["-x", "--audio-format", "opus"]));
    }

    #[test]
    fn test_fixed_flag_order() {
        let args = DownloadOptions {
            ignore_config: true,
            no_mtime: true,
            output_template: DEFAULT_OUTPUT_TEMPLATE.into(),
            embed_thumbnail: true,
            rate_limit: "2M".into(),
            custom_args: "-f worst".into(),
            ..options()
        }
        .build_arguments()
        .unwrap();

        let expected_output = PathBuf::from("/tmp/videos")
            .join(DEFAULT_OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned();
        assert_eq!(
            args,
            vec![
                "--ignore-config".to_string(),
                "--no-mtime".into(),
                "--newline".into(),
                "-o".into(),
                expected_output,
                "-f".into(),
                "bestvideo*+bestaudio/best".into(),
                "--embed-thumbnail".into(),
                "-r".into(),
                "2M".into(),
                "-f".into(),
                "worst".into(),
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
            ]
        );
    }

    #[test]
    fn test_empty_template_uses_paths_flag() {
        let args = options().build_arguments().unwrap();
        assert!(contains_window(&args, &["-P", "/tmp/videos"]));
        assert!(!args.contains(&"-o".to_string()));
    }

    #[test]
    fn test_embedding_and_cookie_flags() {
        let args = DownloadOptions {
            preset: FormatPreset::Mp4,
            add_metadata: true,
            sponsorblock: true,
            embed_subs: true,
            cookies_file: "cookies.txt".into(),
            cookies_from_browser: "firefox".into(),
            ..options()
        }
        .build_arguments()
        .unwrap();
        assert!(contains_window(&args, &["--merge-output-format", "mp4"]));
        assert!(contains_window(&args, &["--sponsorblock-remove", "default"]));
        assert!(contains_window(&args, &["--write-subs", "--embed-subs"]));
        assert!(contains_window(
            &args,
            &["--cookies", "cookies.txt", "--cookies-from-browser", "firefox"]
        ));
        assert!(args.contains(&"--add-metadata".to_string()));
    }

    #[test]
    fn test_missing_url_rejected() {
        let err = DownloadOptions {
            url: "   ".into(),
            ..options()
        }
        .build_arguments()
        .unwrap_err();
        assert!(matches!(err, TaskError::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_custom_args_abort() {
        let err = DownloadOptions {
            custom_args: "'unbalanced".into(),
            ..options()
        }
        .build_arguments()
        .unwrap_err();
        assert!(matches!(err, TaskError::MalformedArguments(_)));
    }
}
