//! Pattern-based extraction of ratio and byte counters from a status page.
//!
//! Markup is stripped before matching so patterns only need to describe the
//! visible text (`Ratio: 1.234`, `Uploaded: 1.23 TiB`).

use regex::Regex;

use super::RatioError;

const DEFAULT_RATIO_PATTERN: &str =
    r"(?i)\bratio\b\s*:?\s*(∞|inf(?:inity)?|[0-9][0-9,]*(?:\.[0-9]+)?)";
const DEFAULT_UPLOADED_PATTERN: &str =
    r"(?i)\bup(?:loaded)?\b\s*:?\s*([0-9][0-9,]*(?:\.[0-9]+)?\s*(?:[KMGTP]i?B?|B)\b)";
const DEFAULT_DOWNLOADED_PATTERN: &str =
    r"(?i)\bdown(?:loaded)?\b\s*:?\s*([0-9][0-9,]*(?:\.[0-9]+)?\s*(?:[KMGTP]i?B?|B)\b)";

/// Values extracted from one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRatio {
    /// Ratio as shown, or computed from the counters.
    pub ratio: f64,
    /// Cumulative uploaded bytes, when shown.
    pub uploaded: Option<u64>,
    /// Cumulative downloaded bytes, when shown.
    pub downloaded: Option<u64>,
}

/// Regex-driven page parser.
///
/// Each pattern must have one capture group holding the value.
#[derive(Debug, Clone)]
pub struct RatioPageParser {
    ratio: Regex,
    uploaded: Regex,
    downloaded: Regex,
    tags: Regex,
}

impl RatioPageParser {
    /// Builds a parser from custom patterns.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Pattern`] when a pattern does not compile.
    pub fn with_patterns(ratio: &str, uploaded: &str, downloaded: &str) -> Result<Self, RatioError> {
        let compile = |name: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|source| RatioError::Pattern { name, source })
        };
        Ok(Self {
            ratio: compile("ratio", ratio)?,
            uploaded: compile("uploaded", uploaded)?,
            downloaded: compile("downloaded", downloaded)?,
            tags: compile("markup", r"<[^>]*>")?,
        })
    }

    /// Builds a parser with the built-in patterns.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Pattern`] only if a built-in pattern is invalid.
    pub fn standard() -> Result<Self, RatioError> {
        let (ratio, uploaded, downloaded) = Self::standard_patterns();
        Self::with_patterns(ratio, uploaded, downloaded)
    }

    /// Returns the built-in `(ratio, uploaded, downloaded)` patterns.
    #[must_use]
    pub fn standard_patterns() -> (&'static str, &'static str, &'static str) {
        (
            DEFAULT_RATIO_PATTERN,
            DEFAULT_UPLOADED_PATTERN,
            DEFAULT_DOWNLOADED_PATTERN,
        )
    }

    /// Extracts the ratio and counters.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Parse`] when neither a ratio nor both counters
    /// can be found. A missing value is never reported as zero.
    pub fn parse(&self, page: &str) -> Result<ParsedRatio, RatioError> {
        let text = self.visible_text(page);

        let uploaded = capture(&self.uploaded, &text).and_then(parse_size);
        let downloaded = capture(&self.downloaded, &text).and_then(parse_size);

        let ratio = match capture(&self.ratio, &text) {
            Some(raw) => parse_ratio(raw)
                .ok_or_else(|| RatioError::parse("ratio", format!("unreadable value {raw:?}")))?,
            None => match (uploaded, downloaded) {
                (Some(up), Some(0)) if up > 0 => f64::INFINITY,
                (Some(up), Some(down)) if down > 0 => ratio_from_counters(up, down),
                _ => return Err(RatioError::parse("ratio", "not found on page")),
            },
        };

        Ok(ParsedRatio {
            ratio,
            uploaded,
            downloaded,
        })
    }

    fn visible_text(&self, page: &str) -> String {
        let stripped = self.tags.replace_all(page, " ");
        let decoded = stripped
            .replace("&nbsp;", " ")
            .replace("&#8734;", "∞")
            .replace("&infin;", "∞")
            .replace("&amp;", "&");
        decoded.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn capture<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim())
}

#[allow(clippy::cast_precision_loss)]
fn ratio_from_counters(uploaded: u64, downloaded: u64) -> f64 {
    uploaded as f64 / downloaded as f64
}

/// Parses a ratio string. `Inf`/`∞` map to infinity.
///
/// Without a `.`, a single comma followed by one to three digits is a
/// decimal separator (`1,05` is 1.05). Otherwise commas are thousands
/// separators (`1,024.5`).
#[must_use]
pub fn parse_ratio(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw == "∞" || raw.eq_ignore_ascii_case("inf") || raw.eq_ignore_ascii_case("infinity") {
        return Some(f64::INFINITY);
    }
    let normalized = match raw.split_once(',') {
        Some((whole, fraction))
            if !raw.contains('.')
                && (1..=3).contains(&fraction.len())
                && fraction.bytes().all(|b| b.is_ascii_digit()) =>
        {
            format!("{whole}.{fraction}")
        }
        _ => raw.replace(',', ""),
    };
    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Parses a human size (`1.23 TiB`, `512 GB`, `12,345.6 MiB`) into bytes.
///
/// Units use binary multipliers: `K`, `KB` and `KiB` all mean 1024.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn parse_size(raw: &str) -> Option<u64> {
    let raw = raw.trim().replace(',', "");
    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;

    let unit = unit.trim().to_ascii_uppercase();
    let exponent = match unit.trim_end_matches('B').trim_end_matches('I') {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        _ => return None,
    };

    let bytes = value * 1024_f64.powi(exponent);
    (bytes.is_finite() && bytes >= 0.0 && bytes < u64::MAX as f64).then_some(bytes.round() as u64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_parse_size_binary_units() {
        assert_eq!(parse_size("1 KiB"), Some(1024));
        assert_eq!(parse_size("1 KB"), Some(1024));
        assert_eq!(parse_size("1K"), Some(1024));
        assert_eq!(parse_size("512 GB"), Some(512 * GIB));
        assert_eq!(parse_size("2 TiB"), Some(2 * 1024 * GIB));
        assert_eq!(parse_size("12,345.5 MiB"), Some(12_945_195_008));
        assert_eq!(parse_size("100 B"), Some(100));
        assert_eq!(parse_size("3 XB"), None);
        assert_eq!(parse_size("GB"), None);
    }

    #[test]
    fn test_parse_ratio_values() {
        assert_eq!(parse_ratio("1.234"), Some(1.234));
        assert_eq!(parse_ratio("1,024.5"), Some(1024.5));
        assert_eq!(parse_ratio("1,05"), Some(1.05));
        assert_eq!(parse_ratio("0,987"), Some(0.987));
        assert_eq!(parse_ratio("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_ratio("Inf"), Some(f64::INFINITY));
        assert_eq!(parse_ratio("∞"), Some(f64::INFINITY));
        assert_eq!(parse_ratio("---"), None);
    }

    #[test]
    fn test_parse_decimal_comma_page_stays_below_floor() {
        let page = "<td>Ratio:</td><td>0,98</td>";
        let parsed = RatioPageParser::standard().unwrap().parse(page).unwrap();
        assert!((parsed.ratio - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_parse_html_status_block() {
        let page = r#"
            <ul class="stats">
              <li>Uploaded: <span>1.50 TiB</span></li>
              <li>Downloaded: <span>1.00&nbsp;TiB</span></li>
              <li>Ratio: <span class="r99">1.50</span></li>
            </ul>"#;
        let parsed = RatioPageParser::standard().unwrap().parse(page).unwrap();
        assert_eq!(parsed.ratio, 1.5);
        assert_eq!(parsed.uploaded, Some(1536 * GIB));
        assert_eq!(parsed.downloaded, Some(1024 * GIB));
    }

    #[test]
    fn test_parse_infinite_ratio_entity() {
        let page = "<b>Ratio:</b> &infin; <b>Uploaded:</b> 10 GB <b>Downloaded:</b> 0 B";
        let parsed = RatioPageParser::standard().unwrap().parse(page).unwrap();
        assert!(parsed.ratio.is_infinite());
    }

    #[test]
    fn test_parse_computes_ratio_from_counters_when_missing() {
        let page = "Uploaded: 30 GiB Downloaded: 20 GiB";
        let parsed = RatioPageParser::standard().unwrap().parse(page).unwrap();
        assert_eq!(parsed.ratio, 1.5);
    }

    #[test]
    fn test_parse_missing_everything_is_error_not_zero() {
        let err = RatioPageParser::standard()
            .unwrap()
            .parse("<html><body>Maintenance</body></html>")
            .unwrap_err();
        assert!(matches!(err, RatioError::Parse { field: "ratio", .. }));
    }

    #[test]
    fn test_custom_patterns() {
        let parser = RatioPageParser::with_patterns(
            r"share_ratio=([0-9.]+)",
            r"bytes_up=([0-9]+)",
            r"bytes_down=([0-9]+)",
        )
        .unwrap();
        let parsed = parser
            .parse("share_ratio=0.98 bytes_up=980 bytes_down=1000")
            .unwrap();
        assert_eq!(parsed.ratio, 0.98);
        assert_eq!(parsed.uploaded, Some(980));
        assert_eq!(parsed.downloaded, Some(1000));
    }

    #[test]
    fn test_invalid_pattern_reports_name() {
        let err = RatioPageParser::with_patterns("(", "x", "y").unwrap_err();
        assert!(matches!(err, RatioError::Pattern { name: "ratio", .. }));
    }
}
