//! Session kinds and the name-pattern classifier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::TransformError;

/// Coarse session type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// A full session that other sessions may nest under
    Main,
    /// A shorter session running inside a main one
    Embedded,
    /// Mixed-gender session, parented by exact date match only
    AllGender,
    /// Never reclassified (clinics, camps, tryouts, ...)
    Exempt,
}

impl SessionKind {
    /// Whether the overlap resolver may swap this kind between main and
    /// embedded.
    #[must_use]
    pub fn is_reclassifiable(self) -> bool {
        matches!(self, Self::Main | Self::Embedded)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Embedded => "embedded",
            Self::AllGender => "all_gender",
            Self::Exempt => "exempt",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALL_GENDER_PATTERNS: &[&str] = &["all gender", "all-gender", "coed", "co-ed", "mixed"];
const EXEMPT_PATTERNS: &[&str] = &["clinic", "camp", "tryout", "showcase"];
const EMBEDDED_PATTERNS: &[&str] = &["mini", "embedded"];

/// Initial kind from the session name. Case-insensitive; the first
/// matching group wins in the order all-gender, exempt, embedded.
///
/// ```
/// use reconcile_engine::overlap::{classify_session, SessionKind};
///
/// assert_eq!(classify_session("Spring Coed League"), SessionKind::AllGender);
/// assert_eq!(classify_session("Goalie Clinic"), SessionKind::Exempt);
/// assert_eq!(classify_session("Mini Session A"), SessionKind::Embedded);
/// assert_eq!(classify_session("Session 2"), SessionKind::Main);
/// ```
#[must_use]
pub fn classify_session(name: &str) -> SessionKind {
    let lower = name.to_lowercase();
    let mentions = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if mentions(ALL_GENDER_PATTERNS) {
        SessionKind::AllGender
    } else if mentions(EXEMPT_PATTERNS) {
        SessionKind::Exempt
    } else if mentions(EMBEDDED_PATTERNS) {
        SessionKind::Embedded
    } else {
        SessionKind::Main
    }
}

/// A dated session as the overlap resolver sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntity {
    pub id: String,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub kind: SessionKind,
}

impl SessionEntity {
    /// Build with the kind taken from [`classify_session`].
    pub fn new(id: impl Into<String>, name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        let name = name.into();
        let kind = classify_session(&name);
        Self {
            id: id.into(),
            name,
            start,
            end,
            kind,
        }
    }

    /// Build from upstream date strings. Accepts `YYYY-MM-DD` or any
    /// timestamp that starts with one; only the date part is used.
    pub fn parse(
        id: impl Into<String>,
        name: impl Into<String>,
        start: &str,
        end: &str,
    ) -> Result<Self, TransformError> {
        let start = parse_date("start", start)?;
        let end = parse_date("end", end)?;
        Ok(Self::new(id, name, start, end))
    }

    #[must_use]
    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Length in whole days.
    #[must_use]
    pub fn duration_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, TransformError> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| TransformError::InvalidField {
        field: field.to_string(),
        reason: format!("'{}' is not a date: {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify_session("ALL GENDER U12"), SessionKind::AllGender);
        assert_eq!(classify_session("All-Gender Futsal"), SessionKind::AllGender);
        assert_eq!(classify_session("Summer CAMP"), SessionKind::Exempt);
        assert_eq!(classify_session("Embedded Block"), SessionKind::Embedded);
    }

    #[test]
    fn test_all_gender_beats_other_patterns() {
        assert_eq!(classify_session("Mixed Mini Session"), SessionKind::AllGender);
        assert_eq!(classify_session("Tryout Mini"), SessionKind::Exempt);
    }

    #[test]
    fn test_default_is_main() {
        assert_eq!(classify_session("Fall 2025"), SessionKind::Main);
        assert_eq!(classify_session(""), SessionKind::Main);
    }

    #[test]
    fn test_reclassifiable_kinds() {
        assert!(SessionKind::Main.is_reclassifiable());
        assert!(SessionKind::Embedded.is_reclassifiable());
        assert!(!SessionKind::AllGender.is_reclassifiable());
        assert!(!SessionKind::Exempt.is_reclassifiable());
    }

    #[test]
    fn test_parse_accepts_dates_and_timestamps() {
        let s = SessionEntity::parse("s1", "Session 1", "2025-03-01", "2025-05-31T23:59:59Z").unwrap();
        assert_eq!(s.start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(s.end, NaiveDate::from_ymd_opt(2025, 5, 31).unwrap());
        assert_eq!(s.duration_days(), 91);
        assert_eq!(s.kind, SessionKind::Main);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = SessionEntity::parse("s1", "Session 1", "soon", "2025-05-31").unwrap_err();
        assert!(matches!(err, TransformError::InvalidField { ref field, .. } if field == "start"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SessionKind::AllGender).unwrap(), "\"all_gender\"");
    }
}
