//! API key name validation

use thiserror::Error;

/// Errors that can occur when validating a key name
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KeyNameError {
    #[error("Key name cannot be empty")]
    Empty,

    #[error("Key name exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("Key name contains control characters")]
    ControlCharacters,
}

const MAX_KEY_NAME_LENGTH: usize = 80;

/// Validate a human-readable key name.
///
/// Names are free-form display strings; uniqueness per owner is enforced by
/// the repository, not here.
pub fn validate_key_name(name: &str) -> Result<(), KeyNameError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(KeyNameError::Empty);
    }

    if trimmed.chars().count() > MAX_KEY_NAME_LENGTH {
        return Err(KeyNameError::TooLong(MAX_KEY_NAME_LENGTH));
    }

    if trimmed.chars().any(char::is_control) {
        return Err(KeyNameError::ControlCharacters);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_key_name("Production dashboard").is_ok());
        assert!(validate_key_name("bot-1").is_ok());
        assert!(validate_key_name("  padded  ").is_ok());
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(validate_key_name(""), Err(KeyNameError::Empty));
        assert_eq!(validate_key_name("   "), Err(KeyNameError::Empty));
    }

    #[test]
    fn test_too_long_name() {
        let long = "a".repeat(81);
        assert_eq!(validate_key_name(&long), Err(KeyNameError::TooLong(80)));

        let max = "a".repeat(80);
        assert!(validate_key_name(&max).is_ok());
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            validate_key_name("bad\nname"),
            Err(KeyNameError::ControlCharacters)
        );
    }
}
