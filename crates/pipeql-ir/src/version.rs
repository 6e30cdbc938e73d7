//! Target version used for minimum-version gating of step translators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("invalid version '{}'", s))?
            .parse::<u32>()
            .map_err(|e| format!("invalid version '{}': {}", s, e))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .map_err(|e| format!("invalid version '{}': {}", s, e))?,
            None => 0,
        };
        // Patch components do not take part in gating
        Ok(Version { major, minor })
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_order() {
        let v: Version = "5.0".parse().unwrap();
        assert_eq!(v, Version::new(5, 0));
        assert_eq!("4.4.18".parse::<Version>().unwrap(), Version::new(4, 4));
        assert_eq!("6".parse::<Version>().unwrap(), Version::new(6, 0));
        assert!(Version::new(4, 4) < Version::new(5, 0));
        assert!("x.1".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }
}
