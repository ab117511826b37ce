//! Human-friendly durations such as `10s`, `1m` or `2h`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error returned for malformed duration strings
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid duration '{0}', expected e.g. 1h, 30m, 10s")]
pub struct InvalidDuration(pub String);

/// A whole number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(u64);

impl Duration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl FromStr for Duration {
    type Err = InvalidDuration;

    /// Supports `Nh`, `Nm`, `Ns`, combinations like `1m30s`, and bare seconds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || InvalidDuration(s.to_string());
        if s.is_empty() {
            return Err(invalid());
        }
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Self(secs));
        }

        let mut total = 0u64;
        let mut digits = String::new();
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let unit = match c {
                'h' => 3600,
                'm' => 60,
                's' => 1,
                _ => return Err(invalid()),
            };
            let n: u64 = digits.parse().map_err(|_| invalid())?;
            total = n
                .checked_mul(unit)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(invalid)?;
            digits.clear();
        }
        if !digits.is_empty() {
            return Err(invalid());
        }
        Ok(Self(total))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Secs(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Secs(secs) => Ok(Duration(secs)),
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
