// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Canonical record identities.
//!
//! A [`SyncKey`] names one logical record within one reconciliation run.
//! Formats:
//!
//! ```text
//! {id}|{year}          year-scoped entity      "12345|2025"
//! {id}|0               global entity           "coach-7|0"
//! {a}|{b}|{year}       composite identity      "p-1|s-9|2025"
//! ```
//!
//! Components containing `|` or `\` are backslash-escaped so distinct inputs
//! never collide. Ordinary identifiers are emitted verbatim.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '|';
const ESCAPE: char = '\\';

/// Year component used by entities that are not scoped to a season.
pub const GLOBAL_YEAR: i32 = 0;

/// Canonical identity string for one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncKey(String);

impl SyncKey {
    /// Wrap an already-formatted key (e.g. one read back from a report).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SyncKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SyncKey {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}

impl AsRef<str> for SyncKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key for a year-scoped entity: `"{id}|{year}"`.
///
/// ```
/// use reconcile_engine::keys::build_key;
/// assert_eq!(build_key(12345, 2025).as_str(), "12345|2025");
/// assert_eq!(build_key("abc123", 2025).as_str(), "abc123|2025");
/// ```
pub fn build_key(id: impl fmt::Display, year: i32) -> SyncKey {
    let mut out = String::new();
    push_component(&mut out, &id.to_string());
    out.push(SEPARATOR);
    out.push_str(&year.to_string());
    SyncKey(out)
}

/// Key for an entity that is not scoped to a year: `"{id}|0"`.
pub fn build_global_key(id: impl fmt::Display) -> SyncKey {
    build_key(id, GLOBAL_YEAR)
}

/// Key for a composite identity: components joined by `|`, then the year.
///
/// ```
/// use reconcile_engine::keys::build_composite_key;
/// let key = build_composite_key(&["personId", "sessionId"], 2025);
/// assert_eq!(key.as_str(), "personId|sessionId|2025");
/// ```
pub fn build_composite_key<S: AsRef<str>>(components: &[S], year: i32) -> SyncKey {
    let mut out = String::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        push_component(&mut out, component.as_ref());
    }
    out.push(SEPARATOR);
    out.push_str(&year.to_string());
    SyncKey(out)
}

fn push_component(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}
