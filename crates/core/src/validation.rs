//! Condition validation.
//!
//! Runs before every save. A condition that fails here never reaches the store.

use crate::condition::Condition;
use crate::constants::ADDITIONAL_DETAIL_MAX_LENGTH;
use crate::error::ValidationError;

/// Validates a condition prior to insert or update.
///
/// # Errors
///
/// Returns the first rule that fails:
/// - [`ValidationError::MissingPatient`] when no patient is set,
/// - [`ValidationError::EndDateBeforeOnsetDate`] when the end date precedes the onset date,
/// - [`ValidationError::AdditionalDetailTooLong`] when the detail text is too long,
/// - a form-field error when the namespace or path breaks the encoding rules.
pub fn validate_condition(condition: &Condition) -> Result<(), ValidationError> {
    if condition.patient.is_none() {
        return Err(ValidationError::MissingPatient);
    }

    if let (Some(onset), Some(end)) = (condition.onset_date, condition.end_date) {
        if end < onset {
            return Err(ValidationError::EndDateBeforeOnsetDate);
        }
    }

    if let Some(detail) = &condition.additional_detail {
        if detail.chars().count() > ADDITIONAL_DETAIL_MAX_LENGTH {
            return Err(ValidationError::AdditionalDetailTooLong {
                max: ADDITIONAL_DETAIL_MAX_LENGTH,
            });
        }
    }

    condition.form_field().validate()
}
