// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session overlap resolution.
//!
//! Sessions that share a start date or an end date collide. Within each
//! colliding bucket the longest session stays (or becomes) `Main` and the
//! others become `Embedded` children of it.
//!
//! # Ordering
//!
//! ```text
//! start-date buckets (ascending) ──→ end-date buckets (ascending) ──→ all-gender parents
//! ```
//!
//! Every bucket primary becomes `Main`. If an earlier bucket had already
//! nested it, that parent link is dropped, so a `Main` session never has a
//! parent. Non-primary members take the first parent they are given: a
//! later bucket never re-parents them. Primary selection is: longest
//! duration, then name ascending, then id ascending.
//!
//! `AllGender` and `Exempt` sessions never take part in buckets. An
//! `AllGender` session gets a parent only when exactly one `Main` session
//! has the identical start and end date.

mod classify;
mod prepared;

pub use classify::{classify_session, SessionEntity, SessionKind};
pub use prepared::{resolve_prepared, SessionFields};

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::value::{FieldValue, Fields};

/// Field written by [`ResolvedSession::apply_to`] with the session kind.
pub const KIND_FIELD: &str = "kind";
/// Field written by [`ResolvedSession::apply_to`] with the parent id.
pub const PARENT_FIELD: &str = "parent";

/// Final kind and parent for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub id: String,
    pub kind: SessionKind,
    pub parent_id: Option<String>,
}

impl ResolvedSession {
    /// Write `kind` and `parent` (null when there is none) into `fields`.
    pub fn apply_to(&self, fields: &mut Fields) {
        fields.insert(KIND_FIELD, self.kind.as_str());
        let parent = self
            .parent_id
            .as_deref()
            .map_or(FieldValue::Null, FieldValue::from);
        fields.insert(PARENT_FIELD, parent);
    }
}

/// Ordering that puts the preferred primary first.
fn primary_order(a: &SessionEntity, b: &SessionEntity) -> Ordering {
    b.duration_days()
        .cmp(&a.duration_days())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn bucket_by<F>(sessions: &[SessionEntity], date: F) -> BTreeMap<NaiveDate, Vec<usize>>
where
    F: Fn(&SessionEntity) -> NaiveDate,
{
    let mut buckets: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (i, session) in sessions.iter().enumerate() {
        if session.kind.is_reclassifiable() {
            buckets.entry(date(session)).or_default().push(i);
        }
    }
    buckets
}

/// Resolve kinds and parents for a batch of sessions.
///
/// Output order matches input order. Stateless and deterministic for a
/// given input set.
#[must_use]
pub fn resolve_overlaps(sessions: &[SessionEntity]) -> Vec<ResolvedSession> {
    let mut kinds: Vec<SessionKind> = sessions.iter().map(|s| s.kind).collect();
    let mut parents: Vec<Option<usize>> = vec![None; sessions.len()];

    let by_start = bucket_by(sessions, |s| s.start);
    let by_end = bucket_by(sessions, |s| s.end);

    for (date, members) in by_start.iter().chain(by_end.iter()) {
        if members.len() < 2 {
            continue;
        }
        let Some(&primary) = members
            .iter()
            .min_by(|&&a, &&b| primary_order(&sessions[a], &sessions[b]))
        else {
            continue;
        };

        // A primary is top-level even if an earlier bucket nested it
        kinds[primary] = SessionKind::Main;
        if let Some(previous) = parents[primary].take() {
            debug!(
                %date,
                session = %sessions[primary].id,
                previous_parent = %sessions[previous].id,
                "Nested session promoted to primary of a later bucket"
            );
        }
        for &i in members {
            if i == primary || parents[i].is_some() {
                continue;
            }
            kinds[i] = SessionKind::Embedded;
            parents[i] = Some(primary);
            debug!(
                %date,
                child = %sessions[i].id,
                parent = %sessions[primary].id,
                "Session nested under overlapping primary"
            );
        }
    }

    for (i, session) in sessions.iter().enumerate() {
        if session.kind != SessionKind::AllGender {
            continue;
        }
        let mut matches = sessions.iter().enumerate().filter(|&(j, other)| {
            kinds[j] == SessionKind::Main && other.start == session.start && other.end == session.end
        });
        if let (Some((j, _)), None) = (matches.next(), matches.next()) {
            parents[i] = Some(j);
        }
    }

    sessions
        .iter()
        .zip(kinds)
        .zip(parents)
        .map(|((session, kind), parent)| ResolvedSession {
            id: session.id.clone(),
            kind,
            parent_id: parent.map(|p| sessions[p].id.clone()),
        })
        .collect()
}
