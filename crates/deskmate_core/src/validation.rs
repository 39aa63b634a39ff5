//! Input validation run before any remote call.
//!
//! # Invariants
//! - A value that fails validation never reaches a backend.
//! - Email format is the loose `\S+@\S+\.\S+` shape; the auth service stays
//!   the authority on deliverability.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Minimum password length accepted by registration.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("valid email regex"));

/// Validation failure surfaced inline, before any network activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Named field is empty after trimming.
    Required(&'static str),
    InvalidEmail(String),
    PasswordTooShort { min: usize },
    PasswordMismatch,
    /// Event end precedes its start.
    EndBeforeStart,
    MissingCustomDate,
    MissingCustomReminder,
    /// Patch carries no field to change.
    EmptyPatch,
    /// Notebook owners cannot be removed from their collaborator set.
    CannotRemoveOwner,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required(field) => write!(f, "{field} is required"),
            Self::InvalidEmail(value) => write!(f, "`{value}` is not a valid email address"),
            Self::PasswordTooShort { min } => {
                write!(f, "password must be at least {min} characters")
            }
            Self::PasswordMismatch => write!(f, "passwords do not match"),
            Self::EndBeforeStart => write!(f, "event end must not be before its start"),
            Self::MissingCustomDate => write!(f, "custom due date requires a date"),
            Self::MissingCustomReminder => write!(f, "custom reminder requires a time"),
            Self::EmptyPatch => write!(f, "nothing to update"),
            Self::CannotRemoveOwner => write!(f, "the notebook owner cannot be removed"),
        }
    }
}

impl Error for ValidationError {}

/// Fails with [`ValidationError::Required`] when `value` is blank.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// Checks presence and shape of an email address.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    require("email", email)?;
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(ValidationError::InvalidEmail(email.trim().to_string()));
    }
    Ok(())
}

/// Credentials for password sign-in.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_email(&self.email)?;
        require("password", &self.password)
    }
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sign-up form including password confirmation.
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// Display name stored in user metadata; optional.
    pub name: Option<String>,
}

impl RegisterForm {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs checks in order: presence, email shape, confirmation match,
    /// length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("email", &self.email)?;
        require("password", &self.password)?;
        require("password confirmation", &self.confirm_password)?;
        validate_email(&self.email)?;
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    /// Trimmed display name, `None` when blank.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

impl std::fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("confirm_password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_email, LoginForm, RegisterForm, ValidationError, MIN_PASSWORD_LEN};

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("ada@example.com").is_ok());
        assert_eq!(
            validate_email("   ").unwrap_err(),
            ValidationError::Required("email")
        );
        assert!(matches!(
            validate_email("ada.example.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            validate_email("ada@example"),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn register_reports_mismatch_before_length() {
        let mismatch = RegisterForm::new("ada@example.com", "abc", "xyz");
        assert_eq!(
            mismatch.validate().unwrap_err(),
            ValidationError::PasswordMismatch
        );

        let short = RegisterForm::new("ada@example.com", "abc", "abc");
        assert_eq!(
            short.validate().unwrap_err(),
            ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN
            }
        );
    }

    #[test]
    fn register_requires_every_field() {
        let form = RegisterForm::new("ada@example.com", "secret1", "");
        assert_eq!(
            form.validate().unwrap_err(),
            ValidationError::Required("password confirmation")
        );
    }

    #[test]
    fn blank_display_name_is_none() {
        let form = RegisterForm::new("a@b.co", "secret1", "secret1").with_name("   ");
        assert_eq!(form.display_name(), None);
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let login = LoginForm::new("ada@example.com", "hunter22");
        assert!(!format!("{login:?}").contains("hunter22"));
        let register = RegisterForm::new("ada@example.com", "hunter22", "hunter22");
        assert!(!format!("{register:?}").contains("hunter22"));
    }
}
