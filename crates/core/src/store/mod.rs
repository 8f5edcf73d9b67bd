//! Condition persistence.
//!
//! The [`ConditionStore`] trait is the seam between the record manager and durable
//! storage. Stores only persist and look up; lifecycle rules (validation, void state,
//! audit stamps, ordering) live in [`ConditionService`](crate::service::ConditionService).
//!
//! Two stores ship with the crate:
//! - [`InMemoryConditionStore`] for tests and embedding,
//! - [`YamlConditionStore`], one YAML document per condition under the data directory.

mod memory;
mod yaml;

pub use memory::InMemoryConditionStore;
pub use yaml::YamlConditionStore;

use crate::condition::{Condition, ConditionId, EncounterId, PatientId};
use crate::error::StoreResult;
use conditions_uuid::RecordUuid;
use std::fmt;

/// Durable storage for conditions, keyed by id and uuid.
///
/// Every method is atomic with respect to the other methods on the same store.
pub trait ConditionStore: Send + Sync + fmt::Debug {
    /// Persists a new condition and returns it with its allocated id.
    ///
    /// Ids increase monotonically and are never handed out twice, even after a delete.
    /// Fails with [`StoreError::DuplicateUuid`](crate::StoreError::DuplicateUuid) if the
    /// uuid is already stored.
    fn insert(&self, condition: Condition) -> StoreResult<Condition>;

    /// Overwrites a stored condition.
    ///
    /// Fails with [`StoreError::Missing`](crate::StoreError::Missing) if no record has
    /// the condition's id.
    fn update(&self, condition: &Condition) -> StoreResult<()>;

    fn get(&self, id: ConditionId) -> StoreResult<Option<Condition>>;

    fn get_by_uuid(&self, uuid: &RecordUuid) -> StoreResult<Option<Condition>>;

    /// All stored conditions of a patient, voided or not, in no particular order.
    fn list_by_patient(&self, patient: PatientId) -> StoreResult<Vec<Condition>>;

    /// All stored conditions linked to an encounter, in no particular order.
    fn list_by_encounter(&self, encounter: EncounterId) -> StoreResult<Vec<Condition>>;

    /// Removes a condition permanently. Returns `false` if there was nothing to remove.
    fn delete(&self, id: ConditionId) -> StoreResult<bool>;
}
