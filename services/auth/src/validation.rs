//! Input validation for account payloads

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{NewUser, RegisterRequest, UpdateProfile};

const NAME_MAX: usize = 50;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 128;

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();

    if name.is_empty() {
        return Err("Name is required".to_string());
    }

    if name.chars().count() > NAME_MAX {
        return Err(format!("Name cannot exceed {} characters", NAME_MAX));
    }

    Ok(())
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > EMAIL_MAX {
        return Err(format!("Email must be at most {} characters long", EMAIL_MAX));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Please enter a valid email".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < PASSWORD_MIN {
        return Err(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN
        ));
    }

    if password.chars().count() > PASSWORD_MAX {
        return Err(format!(
            "Password must be at most {} characters long",
            PASSWORD_MAX
        ));
    }

    Ok(())
}

/// Emails compare case-insensitively and are stored lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check a registration payload, stopping at the first bad field
pub fn validate_registration(request: &RegisterRequest) -> Result<NewUser, String> {
    let email = normalize_email(&request.email);

    validate_name(&request.name)?;
    validate_email(&email)?;
    validate_password(&request.password)?;

    Ok(NewUser {
        name: request.name.trim().to_string(),
        email,
        password: request.password.clone(),
    })
}

/// Check a profile update and return it trimmed and normalized
pub fn validate_profile_update(update: &UpdateProfile) -> Result<UpdateProfile, String> {
    let name = match &update.name {
        Some(name) => {
            validate_name(name)?;
            Some(name.trim().to_string())
        }
        None => None,
    };

    let email = match &update.email {
        Some(email) => {
            let email = normalize_email(email);
            validate_email(&email)?;
            Some(email)
        }
        None => None,
    };

    let avatar = update
        .avatar
        .as_deref()
        .map(str::trim)
        .map(str::to_string);

    Ok(UpdateProfile {
        name,
        email,
        avatar,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Alice").is_ok());
        assert_eq!(validate_name("   ").unwrap_err(), "Name is required");
        assert!(validate_name(&"x".repeat(51)).is_err());
        assert!(validate_name(&"é".repeat(50)).is_ok());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("a.b+tag@sub.example.org").is_ok());
        assert_eq!(validate_email("").unwrap_err(), "Email is required");
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@example").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("12345").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
        assert_eq!(validate_password("").unwrap_err(), "Password is required");
    }

    #[test]
    fn test_validate_registration_normalizes() {
        let request = RegisterRequest {
            name: "  Alice ".to_string(),
            email: " Alice@Example.COM ".to_string(),
            password: "hunter22".to_string(),
        };

        let user = validate_registration(&request).unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
    }

    #[test]
    fn test_validate_profile_update() {
        let update = UpdateProfile {
            name: None,
            email: Some("BOB@example.com".to_string()),
            avatar: None,
        };
        let update = validate_profile_update(&update).unwrap();
        assert_eq!(update.email.as_deref(), Some("bob@example.com"));
        assert!(update.name.is_none());

        let bad = UpdateProfile {
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(validate_profile_update(&bad).unwrap_err(), "Name is required");
    }
}
