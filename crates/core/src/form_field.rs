//! Form-field encoding.
//!
//! A condition recorded through a form remembers which form field produced it as a
//! namespace and a path. The two halves are stored separately and exposed as a single
//! `namespace^path` string when both are present.

use crate::constants::{FORM_NAMESPACE_PATH_MAX_LENGTH, FORM_NAMESPACE_PATH_SEPARATOR};
use crate::error::ValidationError;
use serde::Serialize;

/// The originating form field of a record.
///
/// Empty strings are normalised to `None`, so `namespace()` and `path()` never return
/// `Some("")`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormField {
    namespace: Option<String>,
    path: Option<String>,
}

impl FormField {
    /// Builds a form field from its two halves.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::FormNamespaceContainsSeparator`] when the namespace
    /// contains `^`, and [`ValidationError::FormFieldTooLong`] when the combined value
    /// would exceed [`FORM_NAMESPACE_PATH_MAX_LENGTH`].
    pub fn new(namespace: Option<&str>, path: Option<&str>) -> Result<Self, ValidationError> {
        let field = Self {
            namespace: non_blank(namespace),
            path: non_blank(path),
        };
        field.validate()?;
        Ok(field)
    }

    /// Parses a combined `namespace^path` value.
    ///
    /// Everything before the first separator is the namespace, everything after it the
    /// path. A value without a separator is a bare namespace.
    pub fn parse(combined: &str) -> Result<Self, ValidationError> {
        match combined.split_once(FORM_NAMESPACE_PATH_SEPARATOR) {
            Some((namespace, path)) => Self::new(Some(namespace), Some(path)),
            None => Self::new(Some(combined), None),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.namespace.is_none() && self.path.is_none()
    }

    /// Returns `namespace^path`, or `None` unless both halves are set.
    pub fn combined(&self) -> Option<String> {
        match (&self.namespace, &self.path) {
            (Some(namespace), Some(path)) => Some(format!(
                "{namespace}{FORM_NAMESPACE_PATH_SEPARATOR}{path}"
            )),
            _ => None,
        }
    }

    /// Checks the separator and length rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(namespace) = &self.namespace {
            if namespace.contains(FORM_NAMESPACE_PATH_SEPARATOR) {
                return Err(ValidationError::FormNamespaceContainsSeparator {
                    separator: FORM_NAMESPACE_PATH_SEPARATOR,
                });
            }
        }

        let namespace_len = self.namespace.as_deref().map_or(0, |s| s.chars().count());
        let path_len = self.path.as_deref().map_or(0, |s| s.chars().count());
        let separator_len = usize::from(self.path.is_some());

        if namespace_len + separator_len + path_len > FORM_NAMESPACE_PATH_MAX_LENGTH {
            return Err(ValidationError::FormFieldTooLong {
                max: FORM_NAMESPACE_PATH_MAX_LENGTH,
            });
        }

        Ok(())
    }
}

/// Blank halves count as unset.
fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).map(str::to_owned)
}
