//! Size parsing with kernel-style unit suffixes (e.g., "4096k", "10m").

use thiserror::Error;

/// Error parsing a size argument.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid size '{input}' - expected a number with an optional k/m/g suffix")]
pub struct SizeParseError {
    input: String,
}

impl SizeParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Parse a size argument into bytes.
///
/// Supports:
/// - Bare numbers (treated as bytes)
/// - `k`/`K` suffix (1024 bytes)
/// - `m`/`M` suffix (1024² bytes)
/// - `g`/`G` suffix (1024³ bytes)
///
/// # Examples
///
/// ```
/// use fdrd::config::parse_size;
///
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// assert_eq!(parse_size("4096k").unwrap(), 4096 * 1024);
/// assert_eq!(parse_size("10m").unwrap(), 10 * 1024 * 1024);
/// assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, SizeParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SizeParseError::new(s));
    }

    let (num_str, multiplier) = match s.as_bytes()[s.len() - 1] {
        b'k' | b'K' => (&s[..s.len() - 1], 1024u64),
        b'm' | b'M' => (&s[..s.len() - 1], 1024 * 1024),
        b'g' | b'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };

    let num: u64 = num_str.parse().map_err(|_| SizeParseError::new(s))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| SizeParseError::new(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("999999").unwrap(), 999999);
    }

    #[test]
    fn test_parse_kilobytes() {
        assert_eq!(parse_size("1k").unwrap(), 1024);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("4096k").unwrap(), 4096 * 1024);
    }

    #[test]
    fn test_parse_megabytes() {
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("10M").unwrap(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_parse_gigabytes() {
        assert_eq!(parse_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_size("  10m  ").unwrap(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("10t").is_err());
        assert!(parse_size("-1k").is_err());
        assert!(parse_size("1.5m").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size("99999999999999999999").is_err());
        assert!(parse_size(&format!("{}g", u64::MAX / 2)).is_err());
    }
}
