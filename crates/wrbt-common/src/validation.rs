//! Input validation utilities.
//!
//! Centralized validation helpers used across API routes.

use validator::Validate;

use crate::error::WrbtError;

/// Validate a request body, returning a WrbtError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), WrbtError> {
    body.validate().map_err(|e| WrbtError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect();
    // HashMap iteration order is random; keep messages stable for clients
    messages.sort();
    messages.join("; ")
}

/// Validate a platform slug (`discord`, `slack`, `github`, ...).
pub fn validate_platform(platform: &str) -> Result<(), WrbtError> {
    if platform.trim().is_empty() {
        return Err(WrbtError::Validation {
            message: "Platform cannot be empty or whitespace only".into(),
        });
    }

    let valid = platform
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if !valid {
        return Err(WrbtError::Validation {
            message: "Platform can only contain lowercase letters, numbers, hyphens, and underscores"
                .into(),
        });
    }

    Ok(())
}
