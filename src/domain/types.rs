//! Strongly typed domain primitives for case files and workshop sessions.
//!
//! These newtypes keep identifiers, codes and amounts from being mixed up
//! across the aggregates, the event store and the command-line front end.

use crate::domain::errors::CoreError;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique identifier for a case file.
/// Used as the aggregate_id in the case file event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseFileId(pub Uuid);

impl CaseFileId {
    /// Creates a new random case file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a case file ID from its UUID string form.
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for CaseFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaseFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workshop session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a session ID from its UUID string form.
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_newtype!(
    /// Identity supplied by the authentication boundary.
    ActorId
);

string_newtype!(
    /// Identifier of a field organization (EVS/CS).
    OrganizationId
);

string_newtype!(
    /// Department code used by territory-scoped visibility.
    Territory
);

string_newtype!(
    /// Locator returned by document storage. The core never sees blob bytes.
    DocumentLocator
);

/// Prefix shared by every case file reference code.
pub const REFERENCE_PREFIX: &str = "FEVES";

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^FEVES-(\d{4})-([0-9A-F]{6})$").expect("reference pattern is valid")
    })
}

/// Human-readable, stable reference code of a case file (`FEVES-2026-3FA2B1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceCode(String);

impl ReferenceCode {
    /// Builds the reference code for a new case file.
    ///
    /// The suffix is taken from the case file's UUID so two files created in
    /// the same year only collide when their UUIDs share a 24-bit prefix.
    pub fn generate(id: &CaseFileId, created_at: &TimestampUtc) -> Self {
        let suffix: String = id.0.simple().to_string().to_uppercase().chars().take(6).collect();
        Self(format!(
            "{}-{:04}-{}",
            REFERENCE_PREFIX,
            created_at.0.year(),
            suffix
        ))
    }

    /// Returns true if `s` has the shape of a reference code.
    pub fn is_well_formed(s: &str) -> bool {
        reference_pattern().is_match(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ReferenceCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        if Self::is_well_formed(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(CoreError::validation(format!(
                "'{}' is not a reference code (expected {}-YYYY-XXXXXX)",
                s, REFERENCE_PREFIX
            )))
        }
    }
}

impl std::fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount in the smallest currency unit (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Amount(pub u64);

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// UTC timestamp for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the timestamp as an RFC3339 string.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_code_uses_year_and_uuid_prefix() {
        let id = CaseFileId(Uuid::parse_str("3fa2b1c4-0000-4000-8000-000000000000").unwrap());
        let at = TimestampUtc(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());

        let code = ReferenceCode::generate(&id, &at);

        assert_eq!(code.as_str(), "FEVES-2026-3FA2B1");
        assert!(ReferenceCode::is_well_formed(code.as_str()));
    }

    #[test]
    fn reference_code_parse_normalizes_case() {
        let code: ReferenceCode = "feves-2026-abc123".parse().unwrap();
        assert_eq!(code.as_str(), "FEVES-2026-ABC123");
    }

    #[test]
    fn reference_code_parse_rejects_garbage() {
        let err = "FICHE-1".parse::<ReferenceCode>().unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn amount_displays_in_currency_units() {
        assert_eq!(Amount(100_001).to_string(), "1000.01");
        assert_eq!(Amount(7).to_string(), "0.07");
        assert_eq!(Amount(u64::MAX).to_string(), "184467440737095516.15");
    }
}
