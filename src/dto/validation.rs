//! Validation helpers for DTOs.

use std::collections::BTreeMap;

use validator::ValidationError;

use crate::state::session::TRUE_RESPONSE;

/// Longest username issued by the identity layer.
pub const MAX_USERNAME_LENGTH: usize = 12;
/// Longest decoy label accepted while grouping.
pub const MAX_LABEL_LENGTH: usize = 64;

/// Validates that a username is non-empty, at most [`MAX_USERNAME_LENGTH`]
/// characters and free of path separators.
///
/// # Examples
///
/// ```ignore
/// validate_username("alice") // Ok
/// validate_username("")      // Err - empty
/// validate_username("a/b")   // Err - separator
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let length = username.chars().count();
    if length == 0 || length > MAX_USERNAME_LENGTH {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be 1 to {MAX_USERNAME_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    if username.contains('/') || username.starts_with('~') || username.trim() != username {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username cannot contain '/', start with '~' or be padded".into());
        return Err(err);
    }

    Ok(())
}

/// Validates every decoy label of a grouping payload.
pub fn validate_group_labels(groups: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for label in groups.values() {
        let label = label.trim();
        if label.is_empty() || label.chars().count() > MAX_LABEL_LENGTH {
            let mut err = ValidationError::new("group_label_length");
            err.message =
                Some(format!("Group labels must be 1 to {MAX_LABEL_LENGTH} characters").into());
            return Err(err);
        }
        if label == TRUE_RESPONSE {
            let mut err = ValidationError::new("group_label_reserved");
            err.message = Some(format!("`{TRUE_RESPONSE}` is reserved").into());
            return Err(err);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_valid() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("P1").is_ok());
        assert!(validate_username("twelve_chars").is_ok());
    }

    #[test]
    fn test_validate_username_invalid() {
        assert!(validate_username("").is_err());
        assert!(validate_username("thirteen_char").is_err());
        assert!(validate_username("a/b").is_err());
        assert!(validate_username("~ai-1").is_err());
        assert!(validate_username(" bob").is_err());
    }

    #[test]
    fn test_validate_group_labels() {
        let ok = BTreeMap::from([("P2".to_string(), " x ".to_string())]);
        assert!(validate_group_labels(&ok).is_ok());

        let blank = BTreeMap::from([("P2".to_string(), "  ".to_string())]);
        assert!(validate_group_labels(&blank).is_err());

        let reserved = BTreeMap::from([("P2".to_string(), TRUE_RESPONSE.to_string())]);
        assert!(validate_group_labels(&reserved).is_err());
    }
}
