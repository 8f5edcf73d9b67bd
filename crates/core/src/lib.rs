//! # Conditions Core
//!
//! Core business logic for condition records: the clinical problems and diagnoses
//! recorded against a patient.
//!
//! This crate contains pure data operations:
//! - The [`Condition`] model, its status enumerations and the form-field encoding
//! - Validation applied before every save
//! - [`ConditionService`]: save, lookups, void/unvoid and purge
//! - The [`ConditionStore`] persistence seam with in-memory and YAML file stores
//!
//! **No API concerns**: argument parsing, environment handling and output formatting
//! belong in `conditions-cli`. The acting user is always passed in explicitly.

pub mod condition;
pub mod config;
pub mod constants;
pub mod error;
pub mod form_field;
pub mod service;
pub mod store;
pub mod validation;

pub use condition::{
    Actor, AuditStamp, ClinicalStatus, CodedOrFreeText, ConceptId, ConceptNameId, Condition,
    ConditionId, EncounterId, PatientId, UserId, VerificationStatus, VoidInfo,
};
pub use config::CoreConfig;
pub use error::{ConditionError, ConditionResult, StoreError, StoreResult, ValidationError};
pub use form_field::FormField;
pub use service::ConditionService;
pub use store::{ConditionStore, InMemoryConditionStore, YamlConditionStore};

pub use conditions_types::{NonEmptyText, TextError};
pub use conditions_uuid::{RecordUuid, UuidError};
