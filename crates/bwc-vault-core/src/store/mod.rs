//! Evidence store
//!
//! A keyed collection of [`Evidence`] records with a single mutation point.
//! Readers get point-in-time clones and `mutate` runs exclusively, so appends
//! to one record are totally ordered. [`MemoryEvidenceStore`] lets readers
//! share its lock; [`SqliteEvidenceStore`] serialises every call.

pub mod database;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{VaultError, VaultResult};
use crate::{Evidence, EvidenceStatus};

pub use database::SqliteEvidenceStore;

/// Closure applied to a working copy inside [`EvidenceStore::mutate`]
pub type Mutation<'a> = &'a mut dyn FnMut(&mut Evidence) -> VaultResult<()>;

/// Storage contract the evidence service is written against
pub trait EvidenceStore: Send + Sync {
    /// Insert a new record; fails with `DuplicateId` if the id is taken
    fn put(&self, evidence: Evidence) -> VaultResult<()>;

    /// Clone of the record, or `NotFound`
    fn get(&self, id: &str) -> VaultResult<Evidence>;

    /// Apply `mutation` to a working copy under the exclusive lock. The
    /// copy is written back, with `last_modified` refreshed, only if the
    /// mutation succeeds. Returns the stored result.
    fn mutate(&self, id: &str, mutation: Mutation<'_>) -> VaultResult<Evidence>;

    /// Every record matching `filter`, in no particular order
    fn query(&self, filter: &EvidenceFilter) -> VaultResult<Vec<Evidence>>;

    fn len(&self) -> VaultResult<usize>;
}

/// Search criteria; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceFilter {
    pub case_number: Option<String>,
    pub officer_id: Option<String>,
    pub status: Option<EvidenceStatus>,
}

impl EvidenceFilter {
    /// Build a filter where empty strings act as wildcards
    pub fn new(case_number: &str, officer_id: &str, status: Option<EvidenceStatus>) -> Self {
        Self {
            case_number: non_empty(case_number),
            officer_id: non_empty(officer_id),
            status,
        }
    }

    /// Matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_case(case_number: &str) -> Self {
        Self::new(case_number, "", None)
    }

    pub fn matches(&self, evidence: &Evidence) -> bool {
        self.case_number
            .as_deref()
            .map_or(true, |case| evidence.case_number == case)
            && self
                .officer_id
                .as_deref()
                .map_or(true, |officer| evidence.officer_id == officer)
            && self.status.map_or(true, |status| evidence.status == status)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// In-memory store behind a read/write lock
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    records: RwLock<HashMap<String, Evidence>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are applied to a copy and swapped in whole, so the map is
    // consistent even if a holder panicked.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Evidence>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Evidence>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EvidenceStore for MemoryEvidenceStore {
    fn put(&self, evidence: Evidence) -> VaultResult<()> {
        let mut records = self.write();
        if records.contains_key(&evidence.id) {
            return Err(VaultError::DuplicateId(evidence.id));
        }
        records.insert(evidence.id.clone(), evidence);
        Ok(())
    }

    fn get(&self, id: &str) -> VaultResult<Evidence> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    fn mutate(&self, id: &str, mutation: Mutation<'_>) -> VaultResult<Evidence> {
        let mut records = self.write();
        let stored = records
            .get_mut(id)
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        let mut working = stored.clone();
        mutation(&mut working)?;
        working.last_modified = Utc::now();
        *stored = working.clone();
        Ok(working)
    }

    fn query(&self, filter: &EvidenceFilter) -> VaultResult<Vec<Evidence>> {
        Ok(self
            .read()
            .values()
            .filter(|evidence| filter.matches(evidence))
            .cloned()
            .collect())
    }

    fn len(&self) -> VaultResult<usize> {
        Ok(self.read().len())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{evidence, exercise_store_contract};
    use super::*;

    #[test]
    fn test_memory_store_contract() {
        exercise_store_contract(&MemoryEvidenceStore::new());
    }

    #[test]
    fn test_filter_empty_strings_are_wildcards() {
        let filter = EvidenceFilter::new("", "", None);
        assert_eq!(filter, EvidenceFilter::all());
        assert!(filter.matches(&evidence("E1", "C1", "O1")));
    }

    #[test]
    fn test_get_returns_snapshot() {
        let store = MemoryEvidenceStore::new();
        store.put(evidence("E1", "C1", "O1")).unwrap();

        let snapshot = store.get("E1").unwrap();
        store
            .mutate("E1", &mut |ev| {
                ev.tags.push("late".to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(store.get("E1").unwrap().tags.len(), 2);
    }
}
