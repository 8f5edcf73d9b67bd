use crate::condition::ConditionId;
use conditions_types::TextError;

/// Reasons a condition fails validation before it reaches the store.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("patient is required")]
    MissingPatient,
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
    #[error("end date must not be before onset date")]
    EndDateBeforeOnsetDate,
    #[error("additional detail exceeds maximum length of {max} characters")]
    AdditionalDetailTooLong { max: usize },
    #[error("form namespace must not contain the '{separator}' separator")]
    FormNamespaceContainsSeparator { separator: char },
    #[error("form namespace and path exceed maximum length of {max} characters")]
    FormFieldTooLong { max: usize },
}

/// Errors raised by a [`ConditionStore`](crate::store::ConditionStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read condition file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write condition file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to remove condition file: {0}")]
    FileRemove(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("condition schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },
    #[error("invalid stored condition: {0}")]
    InvalidRecord(String),
    #[error("condition uuid already in use: {0}")]
    DuplicateUuid(String),
    #[error("condition {0} not found")]
    Missing(ConditionId),
    #[error("failed to lock condition store: {0}")]
    Lock(std::io::Error),
    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by [`ConditionService`](crate::service::ConditionService).
#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("condition {0} not found")]
    NotFound(ConditionId),
    #[error("condition has not been saved")]
    Unsaved,
    #[error("cannot {action} condition {id}: it is {state}")]
    InvalidStateTransition {
        id: ConditionId,
        action: &'static str,
        state: &'static str,
    },
    #[error("condition uuid already in use: {0}")]
    DuplicateUuid(String),
    #[error("{0} cannot be changed once a condition is saved")]
    ImmutableField(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ConditionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUuid(uuid) => ConditionError::DuplicateUuid(uuid),
            StoreError::Missing(id) => ConditionError::NotFound(id),
            other => ConditionError::Store(other),
        }
    }
}

impl From<TextError> for ConditionError {
    fn from(err: TextError) -> Self {
        ConditionError::Validation(ValidationError::Text(err))
    }
}

pub type ConditionResult<T> = std::result::Result<T, ConditionError>;
