//! Total, non-panicking version parsing out of arbitrary CLI output.
//!
//! Grounded on `pydantic_pkgr/semver.py`: take the first line of some text,
//! tokenize on whitespace, and pick the first token whose digit-only chunks
//! look like a version. Never raises on garbage input.

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A parsed `(major, minor, patch)` triple plus the line it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub full_text: String,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64, full_text: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            full_text: full_text.into(),
        }
    }

    /// Parse a version triple out of arbitrary text. Returns `None` rather
    /// than erroring on input that contains nothing version-shaped.
    pub fn parse(input: impl AsRef<str>) -> Option<Self> {
        let input = input.as_ref();
        let full_text = input.lines().next().unwrap_or("").trim().to_string();
        if full_text.is_empty() {
            return None;
        }

        for token in full_text.split_whitespace().take(5) {
            let chunks = digit_chunks(token);
            // A version column needs at least 2 digit chunks (i.e. one dot)
            // once truncated to its first 3 chunks, mirroring the original
            // `contains_semver` check on the already-truncated column.
            if chunks.len() < 2 {
                continue;
            }
            let mut parts = chunks.into_iter();
            let major = parts.next().unwrap_or(0);
            let minor = parts.next().unwrap_or(0);
            let patch = parts.next().unwrap_or(0);
            return Some(Self {
                major,
                minor,
                patch,
                full_text,
            });
        }
        None
    }

    pub fn as_triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

/// Lowercase, strip a leading `v`, split on every non-digit character, keep
/// the digit-only runs, and truncate to the first 3. Never panics; returns
/// an empty vec if the token contains no digits.
fn digit_chunks(token: &str) -> Vec<u64> {
    let token = token.to_lowercase();
    let token = token.strip_prefix('v').unwrap_or(&token);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in token.chars().chain(std::iter::once('\0')) {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            chunks.push(current.clone());
            current.clear();
        }
    }

    chunks
        .into_iter()
        .take(3)
        .filter_map(|chunk| chunk.parse::<u64>().ok())
        .collect()
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_triple().cmp(&other.as_triple())
    }
}

/// Serializes as `"M.m.p"`, per the external serialization contract.
impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.2.3", Some((1, 2, 3)))]
    #[case("v1.2.3", Some((1, 2, 3)))]
    #[case("bash, version 5.1.16(1)-release", Some((5, 1, 16)))]
    #[case("", None)]
    #[case("no digits anywhere", None)]
    fn parses_expected_triple(#[case] input: &str, #[case] expected: Option<(u64, u64, u64)>) {
        assert_eq!(SemVer::parse(input).map(|v| v.as_triple()), expected);
    }

    #[test]
    fn chrome_corner_case() {
        let input = "Google Chrome 124.0.6367.208+beta_234. 234.234.123\n123.456.324";
        let v = SemVer::parse(input).expect("should parse a version");
        assert_eq!(v.as_triple(), (124, 0, 6367));
        assert_eq!(v.full_text, "Google Chrome 124.0.6367.208+beta_234. 234.234.123");
    }

    #[test]
    fn never_panics_on_garbage() {
        for input in ["\0\0\0", "🦀🦀🦀", "...", "v", "----"] {
            let _ = SemVer::parse(input);
        }
    }

    #[test]
    fn idempotent_on_roundtrip() {
        let v = SemVer::parse("2.44.0").unwrap();
        let roundtrip = SemVer::parse(v.to_string()).unwrap();
        assert_eq!(v.as_triple(), roundtrip.as_triple());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = SemVer::parse("1.2.3").unwrap();
        let b = SemVer::parse("1.2.4").unwrap();
        let c = SemVer::parse("1.10.0").unwrap();
        let d = SemVer::parse("2.0.0").unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn display_matches_triple() {
        let v = SemVer::new(1, 2, 3, "whatever");
        assert_eq!(v.to_string(), "1.2.3");
    }
}
