use super::ConditionStore;
use crate::condition::{Condition, ConditionId, EncounterId, PatientId};
use crate::error::{StoreError, StoreResult};
use conditions_uuid::RecordUuid;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A process-local store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryConditionStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    next_id: u64,
    records: BTreeMap<ConditionId, Condition>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: BTreeMap::new(),
        }
    }
}

impl InMemoryConditionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn filtered(&self, keep: impl Fn(&Condition) -> bool) -> StoreResult<Vec<Condition>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|c| keep(*c))
            .cloned()
            .collect())
    }
}

impl ConditionStore for InMemoryConditionStore {
    fn insert(&self, mut condition: Condition) -> StoreResult<Condition> {
        let mut state = self.write()?;

        if state.records.values().any(|c| c.uuid == condition.uuid) {
            return Err(StoreError::DuplicateUuid(condition.uuid.to_string()));
        }

        let id = ConditionId(state.next_id);
        state.next_id += 1;
        condition.id = Some(id);
        state.records.insert(id, condition.clone());

        Ok(condition)
    }

    fn update(&self, condition: &Condition) -> StoreResult<()> {
        let id = condition.id.ok_or_else(|| {
            StoreError::InvalidRecord("cannot update a condition without an id".into())
        })?;

        let mut state = self.write()?;
        match state.records.get_mut(&id) {
            Some(stored) => {
                *stored = condition.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(id)),
        }
    }

    fn get(&self, id: ConditionId) -> StoreResult<Option<Condition>> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    fn get_by_uuid(&self, uuid: &RecordUuid) -> StoreResult<Option<Condition>> {
        Ok(self
            .read()?
            .records
            .values()
            .find(|c| &c.uuid == uuid)
            .cloned())
    }

    fn list_by_patient(&self, patient: PatientId) -> StoreResult<Vec<Condition>> {
        self.filtered(|c| c.patient == Some(patient))
    }

    fn list_by_encounter(&self, encounter: EncounterId) -> StoreResult<Vec<Condition>> {
        self.filtered(|c| c.encounter == Some(encounter))
    }

    fn delete(&self, id: ConditionId) -> StoreResult<bool> {
        Ok(self.write()?.records.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_allocates_increasing_ids() {
        let store = InMemoryConditionStore::new();
        let first = store
            .insert(Condition::for_patient(PatientId(2)))
            .expect("insert should succeed");
        let second = store
            .insert(Condition::for_patient(PatientId(2)))
            .expect("insert should succeed");

        assert_eq!(first.id(), Some(ConditionId(1)));
        assert_eq!(second.id(), Some(ConditionId(2)));
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = InMemoryConditionStore::new();
        let first = store.insert(Condition::for_patient(PatientId(2))).unwrap();
        assert!(store.delete(first.id().unwrap()).unwrap());

        let second = store.insert(Condition::for_patient(PatientId(2))).unwrap();
        assert_eq!(second.id(), Some(ConditionId(2)));
    }

    #[test]
    fn insert_rejects_duplicate_uuid() {
        let store = InMemoryConditionStore::new();
        let condition = Condition::for_patient(PatientId(2));
        store.insert(condition.clone()).unwrap();

        let err = store.insert(condition).expect_err("duplicate uuid");
        assert!(matches!(err, StoreError::DuplicateUuid(_)));
    }

    #[test]
    fn update_of_missing_record_fails() {
        let store = InMemoryConditionStore::new();
        let mut condition = Condition::for_patient(PatientId(2));
        condition.id = Some(ConditionId(42));

        let err = store.update(&condition).expect_err("nothing to update");
        assert!(matches!(err, StoreError::Missing(ConditionId(42))));
    }

    #[test]
    fn delete_of_missing_record_returns_false() {
        let store = InMemoryConditionStore::new();
        assert!(!store.delete(ConditionId(7)).unwrap());
    }
}
