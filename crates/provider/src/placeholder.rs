//! Recognizing the temporary images providers hand out while working.

use std::sync::LazyLock;

use regex::Regex;

/// Hosts and file names used for "still generating" images.
const PLACEHOLDER_PATTERN: &str =
    r"(?i)placeholder|placehold\.co|dummyimage\.com|/(loading|pending|spinner)\.(gif|svg|png|webp)(\?|$)";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// `true` when `url` cannot be a finished artifact.
pub fn is_placeholder_url(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url.starts_with("data:") || PLACEHOLDER_RE.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_placeholders() {
        for url in [
            "",
            "   ",
            "https://via.placeholder.com/1024x1024",
            "https://placehold.co/600x400",
            "https://cdn.example.com/static/loading.gif",
            "https://cdn.example.com/static/spinner.svg?v=2",
            "data:image/gif;base64,R0lGOD",
        ] {
            assert!(is_placeholder_url(url), "{url} should be a placeholder");
        }
    }

    #[test]
    fn accepts_real_results() {
        for url in [
            "https://cdn.example.com/outputs/4f1c.png",
            "https://storage.example.com/jobs/abc/loading-screen-art.png",
            "http://localhost:3000/artifacts/abc123.webp",
        ] {
            assert!(!is_placeholder_url(url), "{url} should be a result");
        }
    }
}
