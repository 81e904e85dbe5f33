//! Reservation records for resguard
//!
//! A reservation is a claim by one agent over files matching a glob pattern.
//! Records are authored by an external coordination component, one JSON
//! object per file, and are read-only here.
//!
//! # Record format
//!
//! ```json
//! {"agent": "BlueLake", "path_pattern": "src/api/*.rs", "exclusive": true,
//!  "expires_ts": "2026-10-16T12:00:00+00:00"}
//! ```
//!
//! Decoding is lenient: missing fields take defaults, and an unreadable
//! `expires_ts` is kept as [`Expiry::Malformed`], which never counts as
//! expired.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use glob::MatchOptions;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::is_truthy;

// =============================================================================
// Expiry
// =============================================================================

/// Expiry of a reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// No `expires_ts` (absent, null or empty)
    Never,
    /// A parsed UTC instant
    At(DateTime<Utc>),
    /// Present but unreadable; kept alive
    Malformed(String),
}

impl Expiry {
    /// Interpret a raw `expires_ts` JSON value
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Expiry::Never,
            Some(Value::String(raw)) if raw.trim().is_empty() => Expiry::Never,
            Some(Value::String(raw)) => match parse_timestamp(raw) {
                Some(ts) => Expiry::At(ts),
                None => Expiry::Malformed(raw.clone()),
            },
            Some(other) => Expiry::Malformed(other.to_string()),
        }
    }

    /// A reservation expiring exactly at `now` is already expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::At(ts) => *ts <= now,
            Expiry::Never | Expiry::Malformed(_) => false,
        }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Reservation Record
// =============================================================================

/// A single file reservation as read from disk
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawRecord")]
pub struct ReservationRecord {
    /// Holding agent; `None` for ownerless records
    pub agent: Option<String>,
    /// Glob over repository-relative paths
    pub path_pattern: Option<String>,
    /// Shared (advisory) reservations are ignored at push time
    pub exclusive: bool,
    pub expiry: Expiry,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    path_pattern: Option<String>,
    #[serde(default = "default_exclusive", deserialize_with = "lenient_bool")]
    exclusive: bool,
    #[serde(default)]
    expires_ts: Option<Value>,
}

fn default_exclusive() -> bool {
    true
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => default_exclusive(),
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => is_truthy(&s),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    })
}

impl From<RawRecord> for ReservationRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            agent: raw.agent,
            path_pattern: raw.path_pattern,
            exclusive: raw.exclusive,
            expiry: Expiry::from_value(raw.expires_ts.as_ref()),
        }
    }
}

impl ReservationRecord {
    /// Create an exclusive, non-expiring record
    pub fn new(agent: impl Into<String>, path_pattern: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            path_pattern: Some(path_pattern.into()),
            exclusive: true,
            expiry: Expiry::Never,
        }
    }

    /// Parse a record from its JSON text. The top level must be an object.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        if !value.is_object() {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "reservation record must be a JSON object",
            ));
        }
        serde_json::from_value(value)
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn expires_at(mut self, ts: DateTime<Utc>) -> Self {
        self.expiry = Expiry::At(ts);
        self
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Check if the record is held by the given agent
    pub fn is_held_by(&self, agent: &str) -> bool {
        self.agent.as_deref() == Some(agent)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_expired(now)
    }
}

// =============================================================================
// Pattern Matching
// =============================================================================

/// fnmatch-style options: `*` crosses `/`, dotfiles are not special
const FNMATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Match `candidate` against `pattern` as a glob.
///
/// Runs of `*` collapse to one `*` before compiling: under fnmatch `**` is
/// just `*`, and a single `*` already crosses `/`. A pattern that still does
/// not compile only matches by string equality.
pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    if pattern == candidate {
        return true;
    }
    glob::Pattern::new(&collapse_stars(pattern))
        .map(|compiled| compiled.matches_with(candidate, FNMATCH_OPTIONS))
        .unwrap_or(false)
}

fn collapse_stars(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut prev_star = false;
    for ch in pattern.chars() {
        if ch == '*' && prev_star {
            continue;
        }
        prev_star = ch == '*';
        out.push(ch);
    }
    out
}

/// Symmetric overlap: either side may be the more specific glob
pub fn patterns_overlap(pattern: &str, path: &str) -> bool {
    glob_matches(pattern, path) || glob_matches(path, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn decodes_full_record() {
        let record = ReservationRecord::from_json(
            r#"{"agent":"B","path_pattern":"src/shared.txt","exclusive":false,
                "expires_ts":"2030-01-01T00:00:00+00:00","reason":"ignored"}"#,
        )
        .expect("record");
        assert_eq!(record.agent.as_deref(), Some("B"));
        assert_eq!(record.path_pattern.as_deref(), Some("src/shared.txt"));
        assert!(!record.exclusive);
        assert_eq!(
            record.expiry,
            Expiry::At(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let record = ReservationRecord::from_json("{}").expect("record");
        assert!(record.agent.is_none());
        assert!(record.path_pattern.is_none());
        assert!(record.exclusive);
        assert_eq!(record.expiry, Expiry::Never);
    }

    #[test]
    fn exclusive_accepts_loose_values() {
        let parse = |raw: &str| {
            ReservationRecord::from_json(&format!(r#"{{"exclusive":{raw}}}"#))
                .expect("record")
                .exclusive
        };
        assert!(parse("null"));
        assert!(parse("1"));
        assert!(!parse("0"));
        assert!(parse("\"yes\""));
        assert!(!parse("\"no\""));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(ReservationRecord::from_json("[1, 2]").is_err());
        assert!(ReservationRecord::from_json(r#"["B", "src/*"]"#).is_err());
        assert!(ReservationRecord::from_json("not json").is_err());
    }

    #[test]
    fn malformed_expiry_is_never_expired() {
        let now = Utc::now();
        let garbage = Expiry::from_value(Some(&Value::String("next tuesday".into())));
        assert!(matches!(garbage, Expiry::Malformed(_)));
        assert!(!garbage.is_expired(now));

        let number = Expiry::from_value(Some(&serde_json::json!(12345)));
        assert!(matches!(number, Expiry::Malformed(_)));
        assert!(!number.is_expired(now));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(Expiry::At(now).is_expired(now));
        assert!(Expiry::At(now - Duration::seconds(1)).is_expired(now));
        assert!(!Expiry::At(now + Duration::seconds(1)).is_expired(now));
        assert!(!Expiry::Never.is_expired(now));
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 0).unwrap();
        for raw in [
            "2026-10-16T12:30:00Z",
            "2026-10-16T12:30:00+00:00",
            "2026-10-16T14:30:00+02:00",
            "2026-10-16T12:30:00.000000+00:00",
            "2026-10-16T12:30:00",
            "2026-10-16 12:30:00",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "{raw}");
        }
        assert!(parse_timestamp("16/10/2026").is_none());
    }

    #[test]
    fn glob_matching_follows_fnmatch() {
        assert!(glob_matches("src/*.rs", "src/lib.rs"));
        assert!(glob_matches("src/*", "src/nested/lib.rs"));
        assert!(glob_matches("src/?.rs", "src/a.rs"));
        assert!(glob_matches("src/[ab].rs", "src/b.rs"));
        assert!(!glob_matches("src/*.rs", "SRC/lib.rs"));
        assert!(!glob_matches("docs/*", "src/lib.rs"));
    }

    #[test]
    fn double_star_is_a_plain_star() {
        assert!(glob_matches("src/**.rs", "src/api/users.rs"));
        assert!(glob_matches("docs**", "docs/guide/intro.md"));
        assert!(glob_matches("src/**/x.rs", "src/a/b/x.rs"));
        assert!(!glob_matches("src/**/x.rs", "src/x.rs"));
        assert!(!patterns_overlap("src/**/x.rs", "src/x.rs"));
        assert!(patterns_overlap("src/**.rs", "src/api/users.rs"));
    }

    #[test]
    fn collapses_star_runs_only() {
        assert_eq!(collapse_stars("a/***/b*c**"), "a/*/b*c*");
        assert_eq!(collapse_stars("src/?.rs"), "src/?.rs");
    }

    #[test]
    fn invalid_pattern_falls_back_to_equality() {
        assert!(glob_matches("src/[oops", "src/[oops"));
        assert!(!glob_matches("src/[oops", "src/other"));
    }

    #[test]
    fn overlap_is_symmetric() {
        assert!(patterns_overlap("src/api/*", "src/api/users.rs"));
        assert!(patterns_overlap("src/api/users.rs", "src/api/*"));
        assert!(patterns_overlap("src/**", "src/api/users.rs"));
        assert!(!patterns_overlap("src/api/*", "tests/api.rs"));
    }
}
