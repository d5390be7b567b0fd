//! User field rules.

use crate::domain::error::FieldViolation;
use crate::domain::posts::bounded_text;

pub const NAME_MAX_CHARS: usize = 100;
pub const EMAIL_MAX_CHARS: usize = 254;

/// Validated user fields, shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
}

impl UserDraft {
    pub fn parse(name: &str, email: &str) -> Result<Self, FieldViolation> {
        let name = bounded_text(name, "name", NAME_MAX_CHARS)?;
        let email = bounded_text(email, "email", EMAIL_MAX_CHARS)?;
        if !is_plausible_email(&email) {
            return Err(FieldViolation::Malformed("email"));
        }
        Ok(Self { name, email })
    }
}

fn is_plausible_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}
