//! Constants used throughout the condition core crate.
//!
//! Path names, file names and field limits live here so the stores, the validator and the
//! CLI agree on them.

/// Default directory for condition data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "condition_data";

/// Directory name for condition documents, relative to the data directory.
pub const CONDITIONS_DIR_NAME: &str = "conditions";

/// Filename holding the next condition id to allocate.
pub const SEQUENCE_FILENAME: &str = "sequence.yaml";

/// Filename of the advisory lock guarding the conditions directory.
pub const LOCK_FILENAME: &str = "conditions.lock";

/// Extension of a stored condition document.
pub const CONDITION_FILE_EXTENSION: &str = "yaml";

/// Separator between form namespace and form path in the combined form field.
pub const FORM_NAMESPACE_PATH_SEPARATOR: char = '^';

/// Maximum length of the combined `namespace^path` form field.
pub const FORM_NAMESPACE_PATH_MAX_LENGTH: usize = 255;

/// Maximum length of a condition's additional detail text.
pub const ADDITIONAL_DETAIL_MAX_LENGTH: usize = 1024;

/// Maximum length of a void reason.
pub const VOID_REASON_MAX_LENGTH: usize = 255;
