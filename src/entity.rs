//! The lifecycle shared by people and rooms.
//!
//! An [`Entity`] owns an id, a type tag, the history of per-step snapshots and the pending
//! deltas accumulated by event handlers during the current step. Committing a snapshot appends
//! it to the history and resets the pending deltas, so every completed step adds exactly one row.

use std::path::Path;

use serde::Serialize;
use strum::Display;

use crate::error::SimError;
use crate::report::write_csv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Room,
}

/// A history row. `UNITS` maps the physical columns to their SI unit.
pub trait HistoryRow: Serialize {
    const UNITS: &'static [(&'static str, &'static str)];
}

#[derive(Debug, Clone)]
pub struct Entity<S, C> {
    id: String,
    kind: EntityType,
    history: Vec<S>,
    pending: C,
}

impl<S: HistoryRow, C: Default> Entity<S, C> {
    #[must_use]
    pub fn new(id: &str, kind: EntityType) -> Self {
        Entity {
            id: id.to_string(),
            kind,
            history: Vec::new(),
            pending: C::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> EntityType {
        self.kind
    }

    #[must_use]
    pub fn history(&self) -> &[S] {
        &self.history
    }

    #[must_use]
    pub fn pending(&self) -> &C {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut C {
        &mut self.pending
    }

    /// Appends `snapshot` and zeroes the pending deltas.
    pub fn commit(&mut self, snapshot: S) {
        self.history.push(snapshot);
        self.pending = C::default();
    }

    /// # Errors
    ///
    /// Fails if the CSV file cannot be written.
    pub fn write_history(&self, path: &Path) -> Result<(), SimError> {
        write_csv(&self.history, path)
    }

    #[must_use]
    pub fn units() -> &'static [(&'static str, &'static str)] {
        S::UNITS
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[derive(Serialize, Debug, PartialEq)]
    struct Row {
        level: f64,
    }

    impl HistoryRow for Row {
        const UNITS: &'static [(&'static str, &'static str)] = &[("level", "m^-3")];
    }

    #[derive(Default, Debug, PartialEq)]
    struct Changes {
        added: f64,
    }

    #[test]
    fn commit_appends_and_resets() {
        let mut entity: Entity<Row, Changes> = Entity::new("room", EntityType::Room);
        entity.pending_mut().added += 2.0;
        assert_eq!(entity.pending().added, 2.0);

        entity.commit(Row { level: 1.0 });
        assert_eq!(entity.history(), &[Row { level: 1.0 }]);
        assert_eq!(entity.pending(), &Changes::default());
        assert_eq!(entity.id(), "room");
        assert_eq!(entity.kind().to_string(), "room");
        assert_eq!(Entity::<Row, Changes>::units(), &[("level", "m^-3")]);
    }
}
