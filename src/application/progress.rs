use std::sync::OnceLock;

use regex::Regex;

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").expect("percent pattern is valid")
    })
}

/// Extract the integer percentage from a yt-dlp `[download]` progress line.
pub fn parse_percent(line: &str) -> Option<u8> {
    let caps = percent_regex().captures(line)?;
    let value: f64 = caps[1].parse().ok()?;
    Some(value.trunc().clamp(0.0, 100.0) as u8)
}

/// Running "last known percentage" over a stream of lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    /// Feed one line; lines without a percentage keep the previous value.
    pub fn observe(&mut self, line: &str) -> Option<u8> {
        if let Some(percent) = parse_percent(line) {
            self.last = Some(percent);
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_percent() {
        assert_eq!(
            parse_percent("[download]  42.0% of 10.00MiB at 1.2MiB/s"),
            Some(42)
        );
    }

    #[test]
    fn test_truncates_not_rounds() {
        assert_eq!(parse_percent("[download]  99.9% of ~3.1GiB"), Some(99));
        assert_eq!(parse_percent("[download] 7% done"), Some(7));
    }

    #[test]
    fn test_clamped_to_hundred() {
        assert_eq!(parse_percent("[download] 250.5%"), Some(100));
    }

    #[test]
    fn test_requires_download_tag() {
        assert_eq!(parse_percent("[ffmpeg] 50.0%"), None);
        assert_eq!(parse_percent("[download] Destination: a 50%.mp4"), None);
    }

    #[test]
    fn test_tracker_keeps_last_value() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.observe("[youtube] Extracting URL"), None);
        assert_eq!(tracker.observe("[download]  12.5% of 1MiB"), Some(12));
        assert_eq!(tracker.observe("[Merger] Merging formats"), Some(12));
    }
}
