//! Version and currency tokens.
//!
//! A [`VersionToken`] is an opaque, strictly ordered timestamp. The store
//! assigns one whenever a versioned row is written; callers echo it back
//! unchanged. Tokens are kept at microsecond precision so that the text form
//! round-trips exactly.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Errors that can occur while reading a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to parse version token: '{0}'")]
    Parse(String),

    #[error("Version token must be a string, got {0}")]
    NotAString(String),
}

/// An opaque, comparable version token.
///
/// Version control compares tokens for equality; currency control uses
/// [`is_not_after`](Self::is_not_after).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionToken(DateTime<Utc>);

impl VersionToken {
    /// A token for the current instant.
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(6))
    }

    /// A token for the current instant that is strictly later than `previous`.
    pub fn after(previous: &Self) -> Self {
        let now = Self::now();
        if now > *previous {
            now
        } else {
            Self(previous.0 + TimeDelta::microseconds(1))
        }
    }

    /// Wrap an existing timestamp, truncated to microseconds.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(6))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// `true` when this token is at or before `other`.
    pub fn is_not_after(&self, other: &Self) -> bool {
        self <= other
    }

    /// Read an optional token from a JSON document value.
    ///
    /// `null` and absent values yield `None`.
    pub fn from_json(value: Option<&Value>) -> Result<Option<Self>, TokenError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => text.parse().map(Some),
            Some(other) => Err(TokenError::NotAString(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl FromStr for VersionToken {
    type Err = TokenError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_datetime(parsed.with_timezone(&Utc)));
        }

        // Database timestamp form, interpreted as UTC.
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| Self::from_datetime(naive.and_utc()))
            .map_err(|_| TokenError::Parse(text.to_string()))
    }
}

impl Serialize for VersionToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
