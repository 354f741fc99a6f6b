use crate::core::{ProvisionerError, Result};
use crate::model::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a claim or release attempt on one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockChange {
    /// The caller holds (claim) or no longer holds (release) the lock.
    pub(crate) succeeded: bool,
    /// The row was modified.
    pub(crate) changed: bool,
}

impl LockChange {
    const APPLIED: LockChange = LockChange {
        succeeded: true,
        changed: true,
    };
    const ALREADY_HELD: LockChange = LockChange {
        succeeded: true,
        changed: false,
    };
    const REFUSED: LockChange = LockChange {
        succeeded: false,
        changed: false,
    };
}

/// Rows of one entity type keyed by id.
///
/// All claim/release logic lives here so every entity type shares the same
/// compare-and-set semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "E: Entity")]
pub(crate) struct Table<E> {
    rows: BTreeMap<String, E>,
}

impl<E> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<E: Entity> Table<E> {
    pub(crate) fn get(&self, id: &str) -> Option<E> {
        self.rows.get(id).cloned()
    }

    /// Non-deleted rows matching `predicate`, oldest first.
    pub(crate) fn list(&self, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        let mut rows = self
            .rows
            .values()
            .filter(|row| !row.is_deleted() && predicate(row))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|left, right| {
            left.create_at()
                .cmp(&right.create_at())
                .then_with(|| left.id().cmp(right.id()))
        });
        rows
    }

    pub(crate) fn list_including_deleted(&self, predicate: impl Fn(&E) -> bool) -> Vec<E> {
        let mut rows = self
            .rows
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.create_at());
        rows
    }

    pub(crate) fn list_unlocked_pending_work(&self) -> Vec<E> {
        self.list(|row| !row.is_locked() && row.is_pending_work())
    }

    pub(crate) fn create(&mut self, row: &E) -> Result<()> {
        if row.id().trim().is_empty() {
            return Err(ProvisionerError::InvalidInput(format!(
                "{} id must not be empty",
                E::KIND
            )));
        }
        if self.rows.contains_key(row.id()) {
            return Err(ProvisionerError::Conflict(format!(
                "{} {} already exists",
                E::KIND,
                row.id()
            )));
        }
        self.rows.insert(row.id().to_string(), row.clone());
        Ok(())
    }

    /// Replaces business fields; the stored lock bookkeeping is kept.
    pub(crate) fn update(&mut self, row: &E) -> Result<()> {
        let stored = self
            .rows
            .get_mut(row.id())
            .ok_or_else(|| ProvisionerError::NotFound(format!("{} {}", E::KIND, row.id())))?;
        let owner = stored.lock_acquired_by().map(str::to_string);
        let acquired_at = stored.lock_acquired_at();
        let mut updated = row.clone();
        updated.set_lock(owner, acquired_at);
        *stored = updated;
        Ok(())
    }

    /// Soft delete. Deleting an already deleted row keeps the first timestamp.
    pub(crate) fn delete(&mut self, id: &str, now: i64) -> Result<()> {
        let stored = self
            .rows
            .get_mut(id)
            .ok_or_else(|| ProvisionerError::NotFound(format!("{} {}", E::KIND, id)))?;
        if !stored.is_deleted() {
            stored.set_delete_at(now);
        }
        Ok(())
    }

    /// Claims the row for `owner` if it is unclaimed or already owned by `owner`.
    pub(crate) fn try_lock(&mut self, id: &str, owner: &str, now: i64) -> LockChange {
        let Some(stored) = self.rows.get_mut(id) else {
            return LockChange::REFUSED;
        };
        let current = stored.lock_acquired_by().map(str::to_owned);
        match current {
            None => {
                stored.set_lock(Some(owner.to_string()), Some(now));
                LockChange::APPLIED
            }
            Some(current) if current == owner => LockChange::ALREADY_HELD,
            Some(_) => LockChange::REFUSED,
        }
    }

    /// Clears the claim if held by `owner`, or unconditionally when `force`.
    pub(crate) fn unlock(&mut self, id: &str, owner: &str, force: bool) -> LockChange {
        let Some(stored) = self.rows.get_mut(id) else {
            return LockChange::REFUSED;
        };
        let current = stored.lock_acquired_by().map(str::to_owned);
        match current {
            Some(current) if force || current == owner => {
                stored.set_lock(None, None);
                LockChange::APPLIED
            }
            _ => LockChange::REFUSED,
        }
    }
}
