//! Version parsing and ordering.
//!
//! Versions are strict `MAJOR.MINOR.PATCH` triples of non-negative integers.
//! Ordering compares each component numerically, so `1.10.0 > 1.9.0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a `MAJOR.MINOR.PATCH` triple.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version {input:?}: {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: &'static str,
}

/// A parsed `MAJOR.MINOR.PATCH` version.
///
/// Field order matters: the derived `Ord` compares `major`, then `minor`,
/// then `patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a dotted triple. Anything other than exactly three non-empty
    /// runs of ASCII digits separated by `.` is rejected.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let err = |reason| VersionParseError {
            input: input.to_string(),
            reason,
        };

        let mut parts = [0u64; 3];
        let mut count = 0;
        for component in input.split('.') {
            if count == 3 {
                return Err(err("expected exactly three components"));
            }
            if component.is_empty() {
                return Err(err("empty component"));
            }
            // u64::from_str accepts a leading '+', so check the alphabet first.
            if !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("components must be decimal digits"));
            }
            parts[count] = component
                .parse()
                .map_err(|_| err("component out of range"))?;
            count += 1;
        }
        if count != 3 {
            return Err(err("expected exactly three components"));
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Compare two versions component-wise.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_valid_triple() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("0.0.0"), Version::new(0, 0, 0));
        assert_eq!(v("10.200.3000"), Version::new(10, 200, 3000));
    }

    #[test]
    fn test_parse_leading_zeros_are_numeric() {
        assert_eq!(v("01.002.0"), Version::new(1, 2, 0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "1", "1.0", "1.2.3.4", "a.b.c", "1..2", "1.2.", ".1.2", "+1.0.0", "-1.0.0",
            " 1.0.0", "1.0.0 ", "1.0.0-beta", "v1.0.0",
        ] {
            assert!(Version::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_parse_rejects_overflow() {
        let err = Version::parse("18446744073709551616.0.0").unwrap_err();
        assert_eq!(err.reason, "component out of range");
    }

    #[test]
    fn test_compare_is_numeric_not_lexicographic() {
        assert_eq!(compare(&v("1.2.3"), &v("1.10.0")), Ordering::Less);
        assert_eq!(compare(&v("10.0.0"), &v("9.9.9")), Ordering::Greater);
        assert_eq!(compare(&v("1.0.10"), &v("1.0.9")), Ordering::Greater);
    }

    #[test]
    fn test_compare_equal() {
        assert_eq!(compare(&v("2.5.1"), &v("2.5.1")), Ordering::Equal);
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(v("3.14.15").to_string(), "3.14.15");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&v("1.2.3")).unwrap();
        assert_eq!(json, r#""1.2.3""#);
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.3"));
        assert!(serde_json::from_str::<Version>(r#""1.2""#).is_err());
    }
}
