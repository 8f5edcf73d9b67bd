//! Condition record management.
//!
//! [`ConditionService`] owns the lifecycle of condition records:
//!
//! - **save** inserts a new record or updates the clinical fields of a stored one,
//! - **lookups** by id, uuid, patient and encounter,
//! - **void / unvoid** toggle the soft-delete audit trail without touching clinical data,
//! - **purge** removes a record permanently.
//!
//! ## Policies
//!
//! - Absence is never an error for lookups: unknown ids, unknown or malformed uuids and
//!   purged records all yield `None`.
//! - Voiding a voided record, or unvoiding one that is not voided, is rejected with
//!   [`ConditionError::InvalidStateTransition`].
//! - Purging a record that does not exist is rejected with [`ConditionError::NotFound`].
//! - Lists are ordered newest first (creation time, then id, both descending).
//! - Concurrent saves of the same record resolve as last writer wins.

use crate::condition::{
    newest_first, Actor, AuditStamp, Condition, ConditionId, EncounterId, PatientId, VoidInfo,
};
use crate::config::CoreConfig;
use crate::constants::VOID_REASON_MAX_LENGTH;
use crate::error::{ConditionError, ConditionResult};
use crate::store::{ConditionStore, InMemoryConditionStore, YamlConditionStore};
use crate::validation::validate_condition;
use chrono::Utc;
use conditions_types::NonEmptyText;
use conditions_uuid::RecordUuid;
use std::sync::Arc;

/// Manages condition records on top of a [`ConditionStore`].
#[derive(Clone, Debug)]
pub struct ConditionService {
    store: Arc<dyn ConditionStore>,
}

impl ConditionService {
    pub fn new(store: Arc<dyn ConditionStore>) -> Self {
        Self { store }
    }

    /// A service over a fresh [`InMemoryConditionStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryConditionStore::new()))
    }

    /// A service over a [`YamlConditionStore`] rooted at the configured data directory.
    pub fn with_yaml_store(cfg: &CoreConfig) -> ConditionResult<Self> {
        Ok(Self::new(Arc::new(YamlConditionStore::open(cfg)?)))
    }

    /// Inserts or updates a condition.
    ///
    /// A condition without an id is inserted: its void details are cleared and the
    /// creation stamp is set to `actor` and now. A condition with an id updates the
    /// stored record's clinical fields (encounter, coding, statuses, dates, end reason,
    /// additional detail, form field) and sets the change stamp. Void details are never
    /// changed by a save.
    ///
    /// # Errors
    ///
    /// - [`ConditionError::Validation`] if the condition fails validation,
    /// - [`ConditionError::DuplicateUuid`] if a new condition reuses a stored uuid,
    /// - [`ConditionError::NotFound`] if an update targets a missing record,
    /// - [`ConditionError::ImmutableField`] if an update changes the uuid or patient.
    pub fn save_condition(
        &self,
        condition: Condition,
        actor: &Actor,
    ) -> ConditionResult<Condition> {
        validate_condition(&condition)?;

        match condition.id {
            None => self.insert(condition, actor),
            Some(id) => self.update(id, &condition, actor),
        }
    }

    fn insert(&self, mut condition: Condition, actor: &Actor) -> ConditionResult<Condition> {
        condition.void = None;
        condition.changed = None;
        condition.created = Some(AuditStamp {
            by: actor.clone(),
            at: Utc::now(),
        });

        let saved = self.store.insert(condition)?;
        tracing::info!(
            condition_id = ?saved.id,
            uuid = %saved.uuid,
            "condition created"
        );
        Ok(saved)
    }

    fn update(
        &self,
        id: ConditionId,
        changes: &Condition,
        actor: &Actor,
    ) -> ConditionResult<Condition> {
        let mut stored = self.require(id)?;

        if stored.uuid != changes.uuid {
            return Err(ConditionError::ImmutableField("uuid"));
        }
        if stored.patient != changes.patient {
            return Err(ConditionError::ImmutableField("patient"));
        }

        stored.apply_mutable_fields(changes);
        stored.changed = Some(AuditStamp {
            by: actor.clone(),
            at: Utc::now(),
        });

        self.store.update(&stored)?;
        tracing::info!(condition_id = %id, "condition updated");
        Ok(stored)
    }

    /// Looks a condition up by id.
    pub fn get_condition(&self, id: ConditionId) -> ConditionResult<Option<Condition>> {
        tracing::debug!(condition_id = %id, "get condition");
        Ok(self.store.get(id)?)
    }

    /// Looks a condition up by uuid. Malformed uuids are treated as unknown.
    pub fn get_condition_by_uuid(&self, uuid: &str) -> ConditionResult<Option<Condition>> {
        let Ok(uuid) = RecordUuid::parse(uuid) else {
            tracing::debug!(uuid, "lookup with malformed uuid");
            return Ok(None);
        };
        Ok(self.store.get_by_uuid(&uuid)?)
    }

    /// Conditions of `patient` with clinical status `ACTIVE` that are not voided.
    pub fn get_active_conditions(&self, patient: PatientId) -> ConditionResult<Vec<Condition>> {
        let mut conditions: Vec<Condition> = self
            .store
            .list_by_patient(patient)?
            .into_iter()
            .filter(Condition::is_active)
            .collect();
        conditions.sort_by(newest_first);
        Ok(conditions)
    }

    /// Every stored condition of `patient`, voided ones included.
    pub fn get_all_conditions(&self, patient: PatientId) -> ConditionResult<Vec<Condition>> {
        let mut conditions = self.store.list_by_patient(patient)?;
        conditions.sort_by(newest_first);
        Ok(conditions)
    }

    /// Every stored condition recorded during `encounter`, voided ones included.
    pub fn get_conditions_by_encounter(
        &self,
        encounter: EncounterId,
    ) -> ConditionResult<Vec<Condition>> {
        let mut conditions = self.store.list_by_encounter(encounter)?;
        conditions.sort_by(newest_first);
        Ok(conditions)
    }

    /// Voids a condition, recording `reason`, `actor` and the current time.
    ///
    /// Clinical and verification status are left as they are.
    ///
    /// # Errors
    ///
    /// - [`ConditionError::Unsaved`] if the condition has no id,
    /// - [`ConditionError::NotFound`] if it is no longer stored,
    /// - [`ConditionError::Validation`] if the reason is too long,
    /// - [`ConditionError::InvalidStateTransition`] if it is already voided.
    pub fn void_condition(
        &self,
        condition: &Condition,
        reason: NonEmptyText,
        actor: &Actor,
    ) -> ConditionResult<Condition> {
        let id = condition.id.ok_or(ConditionError::Unsaved)?;
        let reason = NonEmptyText::bounded(reason, VOID_REASON_MAX_LENGTH)?;
        let mut stored = self.require(id)?;

        if stored.is_voided() {
            return Err(ConditionError::InvalidStateTransition {
                id,
                action: "void",
                state: "already voided",
            });
        }

        stored.void = Some(VoidInfo {
            reason,
            by: actor.clone(),
            at: Utc::now(),
        });

        self.store.update(&stored)?;
        tracing::info!(condition_id = %id, user_id = %actor.user_id, "condition voided");
        Ok(stored)
    }

    /// Restores a voided condition, clearing reason, actor and date.
    ///
    /// # Errors
    ///
    /// - [`ConditionError::Unsaved`] if the condition has no id,
    /// - [`ConditionError::NotFound`] if it is no longer stored,
    /// - [`ConditionError::InvalidStateTransition`] if it is not voided.
    pub fn unvoid_condition(&self, condition: &Condition) -> ConditionResult<Condition> {
        let id = condition.id.ok_or(ConditionError::Unsaved)?;
        let mut stored = self.require(id)?;

        if !stored.is_voided() {
            return Err(ConditionError::InvalidStateTransition {
                id,
                action: "unvoid",
                state: "not voided",
            });
        }

        stored.void = None;

        self.store.update(&stored)?;
        tracing::info!(condition_id = %id, "condition unvoided");
        Ok(stored)
    }

    /// Permanently removes a condition.
    ///
    /// # Errors
    ///
    /// - [`ConditionError::Unsaved`] if the condition has no id,
    /// - [`ConditionError::NotFound`] if nothing is stored under its id.
    pub fn purge_condition(&self, condition: &Condition) -> ConditionResult<()> {
        let id = condition.id.ok_or(ConditionError::Unsaved)?;

        if !self.store.delete(id)? {
            return Err(ConditionError::NotFound(id));
        }

        tracing::info!(condition_id = %id, "condition purged");
        Ok(())
    }

    fn require(&self, id: ConditionId) -> ConditionResult<Condition> {
        self.store.get(id)?.ok_or(ConditionError::NotFound(id))
    }
}
