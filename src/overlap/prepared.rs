//! Running the resolver over a batch of prepared records.

use tracing::{debug, warn};

use super::{resolve_overlaps, SessionEntity};
use crate::engine::PreparedRecord;
use crate::value::FieldValue;

/// Where a session's identity and dates live in its prepared fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFields {
    pub id: String,
    pub name: String,
    pub start: String,
    pub end: String,
}

impl Default for SessionFields {
    fn default() -> Self {
        Self {
            id: "session_id".into(),
            name: "name".into(),
            start: "start_date".into(),
            end: "end_date".into(),
        }
    }
}

impl SessionFields {
    fn read(&self, record: &PreparedRecord) -> Option<SessionEntity> {
        let text = |field: &str| record.fields.get(field).and_then(FieldValue::as_str);
        let parsed = SessionEntity::parse(
            text(&self.id)?,
            text(&self.name)?,
            text(&self.start)?,
            text(&self.end)?,
        );
        match parsed {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(key = %record.key, error = %e, "Session dates unreadable, left unresolved");
                None
            }
        }
    }
}

/// Resolve overlaps across `records` and write each session's kind and
/// parent into its fields.
///
/// Records missing any of the named fields are left untouched. Returns the
/// number of records that were resolved. Meant to be called from
/// [`crate::EntitySync::prepare_batch`].
pub fn resolve_prepared(records: &mut [PreparedRecord], names: &SessionFields) -> usize {
    let (positions, sessions): (Vec<usize>, Vec<SessionEntity>) = records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| names.read(record).map(|session| (i, session)))
        .unzip();

    for (&i, resolution) in positions.iter().zip(resolve_overlaps(&sessions)) {
        resolution.apply_to(&mut records[i].fields);
    }
    debug!(resolved = positions.len(), total = records.len(), "Session overlaps resolved");
    positions.len()
}
