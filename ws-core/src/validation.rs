//! Field validation for workspace records.
//!
//! Every check returns the first problem it finds as a [`CoreError::Validation`]
//! so that callers can surface it to users verbatim.

use crate::error::{CoreError, Result};
use crate::uid::MAX_UID_LENGTH;

/// Validate a required free-form field (display names, template references).
pub fn validate_required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} is required", field)));
    }

    if value.contains('\0') || value.chars().any(|c| c.is_control()) {
        return Err(CoreError::Validation(format!(
            "{} contains invalid control characters",
            field
        )));
    }

    Ok(())
}

/// Validate a uid produced by [`crate::generate_uid`] or supplied by a caller.
///
/// Accepts exactly what the generator can emit: 1 to [`MAX_UID_LENGTH`]
/// characters from `[a-z0-9-]`. Leading and trailing `-` are allowed since a
/// name ending in punctuation derives one.
pub fn validate_uid(uid: &str) -> Result<()> {
    if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
        return Err(CoreError::Validation(format!(
            "uid must be between 1 and {} characters",
            MAX_UID_LENGTH
        )));
    }

    if !uid
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(CoreError::Validation(format!(
            "uid '{}' contains invalid characters (only lowercase alphanumeric and '-' allowed)",
            uid
        )));
    }

    Ok(())
}

/// Validate a namespace name (a single RFC 1123 label).
pub fn validate_namespace(namespace: &str) -> Result<()> {
    validate_label(namespace).map_err(|e| match e {
        CoreError::Validation(msg) => CoreError::Validation(format!("namespace: {}", msg)),
        other => other,
    })
}

/// Validate a workflow parameter name such as `storage-prefix` or `sys-host`.
pub fn validate_parameter_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 253 {
        return Err(CoreError::Validation(
            "parameter names must be between 1 and 253 characters".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(format!(
            "parameter name '{}' contains invalid characters",
            name
        )));
    }

    Ok(())
}

fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.len() > 63 {
        return Err(CoreError::Validation(
            "labels must be between 1 and 63 characters".to_string(),
        ));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(CoreError::Validation(format!(
            "label '{}' cannot start or end with a hyphen",
            label
        )));
    }

    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(CoreError::Validation(format!(
            "label '{}' contains invalid characters (only alphanumeric and '-' allowed)",
            label
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_required() {
        assert!(validate_required("name", "nb1").is_ok());
        assert!(validate_required("name", "").is_err());
        assert!(validate_required("name", "   ").is_err());
        assert!(validate_required("name", "nb\n1").is_err());
    }

    #[test]
    fn test_validate_required_message_names_field() {
        let err = validate_required("workspace template uid", "").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: workspace template uid is required"
        );
    }

    #[test]
    fn test_validate_uid() {
        assert!(validate_uid("nb1").is_ok());
        assert!(validate_uid("my--notebook").is_ok());
        assert!(validate_uid("").is_err());
        assert!(validate_uid("NB1").is_err());
        assert!(validate_uid(&"a".repeat(31)).is_err());
    }

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("team-a").is_ok());
        assert!(validate_namespace("team_a").is_err());
        assert!(validate_namespace("").is_err());
    }

    #[test]
    fn test_validate_parameter_name() {
        assert!(validate_parameter_name("sys-host").is_ok());
        assert!(validate_parameter_name("storage.prefix_2").is_ok());
        assert!(validate_parameter_name("").is_err());
        assert!(validate_parameter_name("bad name").is_err());
    }

    #[test]
    fn test_validate_uid_accepts_generated_uids() {
        for name in ["nb 1!", "!nb", "My Notebook", "a_b.c", "café"] {
            let uid = crate::generate_uid(name).unwrap();
            assert!(validate_uid(&uid).is_ok(), "{} -> {}", name, uid);
        }
    }
}
