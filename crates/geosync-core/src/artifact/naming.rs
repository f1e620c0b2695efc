//! File names and edition-stable identities derived from download URLs.

use regex::Regex;
use std::sync::OnceLock;

/// Extracts the last path segment from a URL for use as the expected file name.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn file_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    let sanitized = sanitize_file_name(segment);
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Sanitizes a vendor file name for the local filesystem.
///
/// - Replaces NUL, `/`, `\`, and control characters with `_`
/// - Trims leading/trailing spaces and dots
/// - Limits length to 255 bytes (Linux NAME_MAX)
pub fn sanitize_file_name(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '\0' || c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

fn edition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-\d{4}-\d{2}").expect("static edition pattern"))
}

/// Removes a monthly edition tag (`-YYYY-MM`) from the last path segment of a URL,
/// so `.../dbip-city-lite-2024-05.mmdb.gz` and `.../dbip-city-lite-2024-06.mmdb.gz`
/// map to the same string.
pub fn strip_edition(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) => {
            let (base, last) = url.split_at(idx + 1);
            format!("{base}{}", edition_pattern().replace_all(last, ""))
        }
        None => edition_pattern().replace_all(url, "").into_owned(),
    }
}
