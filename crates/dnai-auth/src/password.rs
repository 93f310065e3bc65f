//! Password strength policy
//!
//! Passwords are hashed by the hosted auth service; the backend only
//! enforces the policy before a password is submitted there.

use serde::Serialize;

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Check a password against the policy
///
/// # Examples
///
/// ```
/// use dnai_auth::password::validate_password;
///
/// assert!(validate_password("Sunshine1").is_valid);
/// assert_eq!(validate_password("short").errors.len(), 2);
/// ```
pub fn validate_password(password: &str) -> PasswordCheck {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must include at least one capital letter".to_string());
    }

    PasswordCheck {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Human-readable list of the rules
pub fn password_requirements() -> Vec<&'static str> {
    vec!["Minimum 8 characters", "At least one capital letter (A-Z)"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_password() {
        let check = validate_password("Password");
        assert!(check.is_valid);
        assert!(check.errors.is_empty());
    }

    #[test]
    fn test_too_short() {
        let check = validate_password("Abc1234");
        assert!(!check.is_valid);
        assert_eq!(check.errors, vec!["Password must be at least 8 characters long"]);
    }

    #[test]
    fn test_missing_capital() {
        let check = validate_password("lowercase-only");
        assert_eq!(
            check.errors,
            vec!["Password must include at least one capital letter"]
        );
    }

    #[test]
    fn test_non_ascii_capital_does_not_count() {
        let check = validate_password("Ñandúes-son-aves");
        assert!(!check.is_valid);
        assert_eq!(check.errors.len(), 1);
    }

    #[test]
    fn test_requirements_listed() {
        assert_eq!(password_requirements().len(), 2);
    }
}
