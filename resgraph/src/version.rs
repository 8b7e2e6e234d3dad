//! Artifact versions and version ranges.
//!
//! Versions follow the `major.minor.micro.qualifier` shape. Ordering differs
//! from semver in one deliberate way: a version *with* a qualifier sorts
//! higher than the same numeric version without one, and qualifiers compare
//! lexicographically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{0}': {1}")]
    Invalid(String, String),

    #[error("invalid version range '{0}': {1}")]
    InvalidRange(String, String),
}

/// A `major.minor.micro.qualifier` version. Missing segments default to
/// zero / no qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: None,
        }
    }

    pub fn with_qualifier(major: u32, minor: u32, micro: u32, qualifier: &str) -> Self {
        Version {
            major,
            minor,
            micro,
            qualifier: Some(qualifier.to_string()),
        }
    }

    /// The smallest possible version, `0.0.0`.
    pub fn lowest() -> Self {
        Version::new(0, 0, 0)
    }

    /// A version no parseable version exceeds.
    pub fn highest() -> Self {
        Version {
            major: u32::MAX,
            minor: u32::MAX,
            micro: u32::MAX,
            qualifier: Some(String::new()),
        }
    }

    /// Parses `major(.minor(.micro(.qualifier)?)?)?`. Numeric segments are
    /// limited to 9 digits; qualifiers to `[-_0-9a-zA-Z]`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Invalid(input.to_string(), "empty".to_string()));
        }
        let mut parts = trimmed.splitn(4, '.');
        let major = parse_segment(input, parts.next().unwrap_or(""))?;
        let minor = match parts.next() {
            Some(p) => parse_segment(input, p)?,
            None => 0,
        };
        let micro = match parts.next() {
            Some(p) => parse_segment(input, p)?,
            None => 0,
        };
        let qualifier = match parts.next() {
            Some(q) => Some(parse_qualifier(input, q)?),
            None => None,
        };
        Ok(Version {
            major,
            minor,
            micro,
            qualifier,
        })
    }
}

fn parse_segment(whole: &str, segment: &str) -> Result<u32, VersionError> {
    if segment.is_empty() || segment.len() > 9 || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionError::Invalid(
            whole.to_string(),
            format!("bad numeric segment '{segment}'"),
        ));
    }
    segment
        .parse::<u32>()
        .map_err(|e| VersionError::Invalid(whole.to_string(), e.to_string()))
}

fn parse_qualifier(whole: &str, qualifier: &str) -> Result<String, VersionError> {
    let ok = !qualifier.is_empty()
        && qualifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !ok {
        return Err(VersionError::Invalid(
            whole.to_string(),
            format!("bad qualifier '{qualifier}'"),
        ));
    }
    Ok(qualifier.to_string())
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.micro.cmp(&other.micro))
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                // a qualified version is "later" than its unqualified base
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(q) = &self.qualifier {
            write!(f, ".{q}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Version::parse(&s)
    }
}

/// A version interval with inclusive or exclusive bounds. A bare version
/// parses as the unbounded range `[v, ∞)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub low: Version,
    pub high: Option<Version>,
    pub include_low: bool,
    pub include_high: bool,
}

impl VersionRange {
    /// `[v, ∞)`
    pub fn at_least(v: Version) -> Self {
        VersionRange {
            low: v,
            high: None,
            include_low: true,
            include_high: false,
        }
    }

    /// `[v, v]`
    pub fn exact(v: Version) -> Self {
        VersionRange {
            low: v.clone(),
            high: Some(v),
            include_low: true,
            include_high: true,
        }
    }

    /// Parses `[1.0,2.0)`, `(1.0,2.0]`, or a bare version.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let first = trimmed.chars().next().ok_or_else(|| {
            VersionError::InvalidRange(input.to_string(), "empty".to_string())
        })?;
        if first != '[' && first != '(' {
            return Ok(VersionRange::at_least(Version::parse(trimmed)?));
        }
        let include_low = first == '[';
        let last = trimmed
            .chars()
            .last()
            .filter(|c| *c == ']' || *c == ')')
            .ok_or_else(|| {
                VersionError::InvalidRange(input.to_string(), "unterminated interval".to_string())
            })?;
        let include_high = last == ']';
        let inner = &trimmed[1..trimmed.len() - 1];
        let (lo, hi) = inner.split_once(',').ok_or_else(|| {
            VersionError::InvalidRange(input.to_string(), "missing ','".to_string())
        })?;
        let low = Version::parse(lo)?;
        let high = Version::parse(hi)?;
        if high < low {
            return Err(VersionError::InvalidRange(
                input.to_string(),
                "upper bound below lower bound".to_string(),
            ));
        }
        Ok(VersionRange {
            low,
            high: Some(high),
            include_low,
            include_high,
        })
    }

    pub fn includes(&self, v: &Version) -> bool {
        let low_ok = if self.include_low {
            *v >= self.low
        } else {
            *v > self.low
        };
        if !low_ok {
            return false;
        }
        match &self.high {
            None => true,
            Some(high) => {
                if self.include_high {
                    v <= high
                } else {
                    v < high
                }
            }
        }
    }

    /// Lowers the range to a filter expression over `attr`. Strict bounds
    /// use negated `>=`/`<=` terms since the filter grammar has no strict
    /// comparison.
    pub fn to_filter_string(&self, attr: &str) -> String {
        let mut terms: Vec<String> = Vec::new();
        if self.include_low {
            terms.push(format!("({}>={})", attr, self.low));
        } else {
            terms.push(format!("({}>={})", attr, self.low));
            terms.push(format!("(!({}<={}))", attr, self.low));
        }
        if let Some(high) = &self.high {
            if self.include_high {
                terms.push(format!("({}<={})", attr, high));
            } else {
                terms.push(format!("(!({}>={}))", attr, high));
            }
        }
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            format!("(&{})", terms.concat())
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.high {
            None => write!(f, "{}", self.low),
            Some(high) => write!(
                f,
                "{}{},{}{}",
                if self.include_low { '[' } else { '(' },
                self.low,
                high,
                if self.include_high { ']' } else { ')' },
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}
