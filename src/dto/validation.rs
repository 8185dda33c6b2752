//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a username only uses ASCII letters, digits, `_` and `-`.
///
/// Length is checked separately by the `length` rule on the field.
///
/// # Examples
///
/// ```ignore
/// validate_username("ana_92") // Ok
/// validate_username("ana 92") // Err - space
/// validate_username("anä")    // Err - non-ASCII
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("username_format");
        err.message = Some(
            "Username may only contain ASCII letters, digits, underscores and hyphens".into(),
        );
        return Err(err);
    }

    Ok(())
}
