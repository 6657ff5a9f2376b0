//! Filename derivation for downloaded content

use crate::url::last_segment;
use percent_encoding::percent_decode_str;

/// Longest filename taken from an address
pub const ADDRESS_FILENAME_MAX_LEN: usize = 256;

/// Filename announced by a `Content-Disposition` header
///
/// `filename*=` (RFC 5987) wins over `filename=`.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let params = header.split(';').skip(1).filter_map(|p| p.split_once('='));

    let mut plain = None;
    for (name, value) in params {
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        if name == "filename*" {
            // charset'language'percent-encoded
            let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
            let decoded = percent_decode_str(encoded.trim_matches('"'))
                .decode_utf8_lossy()
                .into_owned();
            if !decoded.is_empty() {
                return Some(sanitize_filename(&decoded));
            }
        } else if name == "filename" && plain.is_none() {
            let unquoted = value.trim_matches('"');
            if !unquoted.is_empty() {
                plain = Some(sanitize_filename(unquoted));
            }
        }
    }
    plain
}

/// Filename taken from the last path segment of an address
pub fn filename_from_address(address: &str) -> Option<String> {
    let segment = last_segment(address)?;
    let name = sanitize_filename(&segment);
    (name.chars().count() < ADDRESS_FILENAME_MAX_LEN).then_some(name)
}

/// Filename of a local path
pub fn filename_from_path(path: &str) -> Option<String> {
    let path = path.strip_prefix("file://").unwrap_or(path);
    std::path::Path::new(path)
        .file_name()
        .map(|n| sanitize_filename(&n.to_string_lossy()))
}

/// Replaces path separators and control characters
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("attachment; filename=\"report.pdf\"", Some("report.pdf"))]
    #[case("attachment; filename=report.pdf", Some("report.pdf"))]
    #[case("attachment; filename*=UTF-8''na%C3%AFve.txt; filename=\"naive.txt\"", Some("naïve.txt"))]
    #[case("attachment; filename=\"a/b.txt\"", Some("a_b.txt"))]
    #[case("inline", None)]
    fn test_content_disposition(#[case] header: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_content_disposition(header).as_deref(), expected);
    }

    #[test]
    fn test_filename_from_address() {
        assert_eq!(
            filename_from_address("https://a.com/files/x%20y.zip").as_deref(),
            Some("x y.zip")
        );
        assert_eq!(filename_from_address("https://a.com/"), None);
        let long = format!("https://a.com/{}", "n".repeat(300));
        assert_eq!(filename_from_address(&long), None);
    }

    #[test]
    fn test_filename_from_path() {
        assert_eq!(filename_from_path("dir/img/x.png").as_deref(), Some("x.png"));
        assert_eq!(filename_from_path("file:///tmp/y.txt").as_deref(), Some("y.txt"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename(""), "_");
        assert_eq!(sanitize_filename("a\nb"), "a_b");
    }
}
