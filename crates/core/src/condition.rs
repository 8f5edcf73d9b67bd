//! Condition records.
//!
//! A [`Condition`] is a clinical problem or diagnosis recorded against a patient and,
//! optionally, the encounter during which it was recorded.
//!
//! Clinical fields are public and freely editable before a save. Identity (`id`, `uuid`)
//! and the audit trail (creation, change and void stamps) are owned by the
//! [`ConditionService`](crate::service::ConditionService) and are read-only to callers.

use crate::error::ValidationError;
use crate::form_field::FormField;
use chrono::{DateTime, Utc};
use conditions_types::NonEmptyText;
use conditions_uuid::RecordUuid;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Surrogate id of a stored condition. Allocated once, never reused.
    ConditionId
);
id_type!(
    /// Reference to the patient owning a condition.
    PatientId
);
id_type!(
    /// Reference to the encounter a condition was recorded during.
    EncounterId
);
id_type!(ConceptId);
id_type!(ConceptNameId);
id_type!(UserId);

/// Clinical status of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClinicalStatus {
    Active,
    Inactive,
    HistoryOf,
}

impl ClinicalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClinicalStatus::Active => "ACTIVE",
            ClinicalStatus::Inactive => "INACTIVE",
            ClinicalStatus::HistoryOf => "HISTORY_OF",
        }
    }
}

impl fmt::Display for ClinicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClinicalStatus {
    type Err = String;

    /// Case-insensitive; accepts `-` in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ACTIVE" => Ok(ClinicalStatus::Active),
            "INACTIVE" => Ok(ClinicalStatus::Inactive),
            "HISTORY_OF" => Ok(ClinicalStatus::HistoryOf),
            other => Err(format!("unknown clinical status: {other}")),
        }
    }
}

/// Verification status of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Provisional,
    Confirmed,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Provisional => "PROVISIONAL",
            VerificationStatus::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROVISIONAL" => Ok(VerificationStatus::Provisional),
            "CONFIRMED" => Ok(VerificationStatus::Confirmed),
            other => Err(format!("unknown verification status: {other}")),
        }
    }
}

/// A diagnosis expressed as a coded concept, free text, or both.
///
/// The default value has nothing set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedOrFreeText {
    pub coded: Option<ConceptId>,
    pub specific_name: Option<ConceptNameId>,
    pub non_coded: Option<String>,
}

impl CodedOrFreeText {
    pub fn coded(concept: ConceptId) -> Self {
        Self {
            coded: Some(concept),
            ..Self::default()
        }
    }

    pub fn free_text(text: impl Into<String>) -> Self {
        Self {
            non_coded: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coded.is_none() && self.specific_name.is_none() && self.non_coded.is_none()
    }
}

/// The authenticated user performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub name: NonEmptyText,
}

impl Actor {
    pub fn new(user_id: UserId, name: NonEmptyText) -> Self {
        Self { user_id, name }
    }
}

/// Who did something to a record, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditStamp {
    pub by: Actor,
    pub at: DateTime<Utc>,
}

/// Soft-delete details. Present exactly when the record is voided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VoidInfo {
    pub reason: NonEmptyText,
    pub by: Actor,
    pub at: DateTime<Utc>,
}

/// A recorded clinical problem or diagnosis.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Condition {
    pub(crate) id: Option<ConditionId>,
    pub(crate) uuid: RecordUuid,
    pub patient: Option<PatientId>,
    pub encounter: Option<EncounterId>,
    pub condition: CodedOrFreeText,
    pub clinical_status: Option<ClinicalStatus>,
    pub verification_status: Option<VerificationStatus>,
    pub onset_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    pub additional_detail: Option<String>,
    pub(crate) form_field: FormField,
    pub(crate) created: Option<AuditStamp>,
    pub(crate) changed: Option<AuditStamp>,
    pub(crate) void: Option<VoidInfo>,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    /// Creates an unsaved condition with a freshly generated uuid and nothing else set.
    pub fn new() -> Self {
        Self {
            id: None,
            uuid: RecordUuid::new(),
            patient: None,
            encounter: None,
            condition: CodedOrFreeText::default(),
            clinical_status: None,
            verification_status: None,
            onset_date: None,
            end_date: None,
            end_reason: None,
            additional_detail: None,
            form_field: FormField::default(),
            created: None,
            changed: None,
            void: None,
        }
    }

    /// Creates an unsaved condition for `patient`.
    pub fn for_patient(patient: PatientId) -> Self {
        Self {
            patient: Some(patient),
            ..Self::new()
        }
    }

    /// Replaces the generated uuid with a caller-supplied one.
    ///
    /// Only meaningful before the first save; the uuid of a stored record is immutable.
    pub fn with_uuid(mut self, uuid: RecordUuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn id(&self) -> Option<ConditionId> {
        self.id
    }

    pub fn uuid(&self) -> &RecordUuid {
        &self.uuid
    }

    /// Sets the originating form field.
    pub fn set_form_field(
        &mut self,
        namespace: Option<&str>,
        path: Option<&str>,
    ) -> Result<(), ValidationError> {
        self.form_field = FormField::new(namespace, path)?;
        Ok(())
    }

    pub fn form_field(&self) -> &FormField {
        &self.form_field
    }

    pub fn form_namespace(&self) -> Option<&str> {
        self.form_field.namespace()
    }

    pub fn form_path(&self) -> Option<&str> {
        self.form_field.path()
    }

    /// Returns `namespace^path` when both are set.
    pub fn form_namespace_and_path(&self) -> Option<String> {
        self.form_field.combined()
    }

    pub fn is_voided(&self) -> bool {
        self.void.is_some()
    }

    pub fn void_reason(&self) -> Option<&NonEmptyText> {
        self.void.as_ref().map(|v| &v.reason)
    }

    pub fn date_voided(&self) -> Option<DateTime<Utc>> {
        self.void.as_ref().map(|v| v.at)
    }

    pub fn voided_by(&self) -> Option<&Actor> {
        self.void.as_ref().map(|v| &v.by)
    }

    pub fn creator(&self) -> Option<&Actor> {
        self.created.as_ref().map(|s| &s.by)
    }

    pub fn date_created(&self) -> Option<DateTime<Utc>> {
        self.created.as_ref().map(|s| s.at)
    }

    pub fn changed_by(&self) -> Option<&Actor> {
        self.changed.as_ref().map(|s| &s.by)
    }

    pub fn date_changed(&self) -> Option<DateTime<Utc>> {
        self.changed.as_ref().map(|s| s.at)
    }

    /// Copies the fields a save may change from `source` into `self`.
    ///
    /// Identity, patient and audit stamps are left alone.
    pub(crate) fn apply_mutable_fields(&mut self, source: &Condition) {
        self.encounter = source.encounter;
        self.condition = source.condition.clone();
        self.clinical_status = source.clinical_status;
        self.verification_status = source.verification_status;
        self.onset_date = source.onset_date;
        self.end_date = source.end_date;
        self.end_reason = source.end_reason.clone();
        self.additional_detail = source.additional_detail.clone();
        self.form_field = source.form_field.clone();
    }

    pub(crate) fn is_active(&self) -> bool {
        self.clinical_status == Some(ClinicalStatus::Active) && !self.is_voided()
    }
}

/// Newest first: by creation time, then by id, both descending.
pub(crate) fn newest_first(a: &Condition, b: &Condition) -> Ordering {
    b.date_created()
        .cmp(&a.date_created())
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_condition_is_unsaved_and_not_voided() {
        let condition = Condition::for_patient(PatientId(2));

        assert_eq!(condition.id(), None);
        assert_eq!(condition.patient, Some(PatientId(2)));
        assert!(!condition.is_voided());
        assert!(condition.void_reason().is_none());
        assert!(condition.date_voided().is_none());
        assert!(condition.voided_by().is_none());
        assert!(condition.condition.is_empty());
    }

    #[test]
    fn with_uuid_replaces_generated_uuid() {
        let uuid = RecordUuid::parse("08002000-4469-12q3-551f-0339000c9a76").unwrap();
        let condition = Condition::new().with_uuid(uuid.clone());
        assert_eq!(condition.uuid(), &uuid);
    }

    #[test]
    fn set_form_field_exposes_combined_value() {
        let mut condition = Condition::new();
        condition
            .set_form_field(Some("my ns"), Some("my path"))
            .expect("valid form field");

        assert_eq!(condition.form_namespace(), Some("my ns"));
        assert_eq!(condition.form_path(), Some("my path"));
        assert_eq!(
            condition.form_namespace_and_path().as_deref(),
            Some("my ns^my path")
        );
    }

    #[test]
    fn status_parsing_is_lenient_about_case_and_dashes() {
        assert_eq!("active".parse::<ClinicalStatus>(), Ok(ClinicalStatus::Active));
        assert_eq!(
            "history-of".parse::<ClinicalStatus>(),
            Ok(ClinicalStatus::HistoryOf)
        );
        assert!("resolved".parse::<ClinicalStatus>().is_err());
        assert_eq!(
            "Confirmed".parse::<VerificationStatus>(),
            Ok(VerificationStatus::Confirmed)
        );
    }

    #[test]
    fn statuses_serialize_in_upper_snake_case() {
        let json = serde_json::to_string(&ClinicalStatus::HistoryOf).unwrap();
        assert_eq!(json, "\"HISTORY_OF\"");
        assert_eq!(ClinicalStatus::HistoryOf.to_string(), "HISTORY_OF");
    }

    #[test]
    fn active_requires_active_status_and_not_voided() {
        let mut condition = Condition::for_patient(PatientId(2));
        assert!(!condition.is_active());

        condition.clinical_status = Some(ClinicalStatus::Active);
        assert!(condition.is_active());

        condition.void = Some(VoidInfo {
            reason: NonEmptyText::new("error").unwrap(),
            by: Actor::new(UserId(1), NonEmptyText::new("admin").unwrap()),
            at: Utc::now(),
        });
        assert!(!condition.is_active());
    }
}
