//! Post field rules.

use crate::domain::error::FieldViolation;

pub const TITLE_MAX_CHARS: usize = 200;
pub const CONTENT_MAX_CHARS: usize = 5000;

/// Validated fields of a post that is about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub user_id: i32,
}

impl PostDraft {
    pub fn parse(title: &str, content: &str, user_id: i32) -> Result<Self, FieldViolation> {
        let title = bounded_text(title, "title", TITLE_MAX_CHARS)?;
        let content = bounded_text(content, "content", CONTENT_MAX_CHARS)?;
        if user_id <= 0 {
            return Err(FieldViolation::NotPositive("userId"));
        }

        Ok(Self {
            title,
            content,
            user_id,
        })
    }
}

/// Validated replacement fields for an existing post. The author never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
}

impl PostChanges {
    pub fn parse(title: &str, content: &str) -> Result<Self, FieldViolation> {
        Ok(Self {
            title: bounded_text(title, "title", TITLE_MAX_CHARS)?,
            content: bounded_text(content, "content", CONTENT_MAX_CHARS)?,
        })
    }
}

/// Trim `value` and require it to be non-empty and at most `max` characters.
pub(crate) fn bounded_text(
    value: &str,
    field: &'static str,
    max: usize,
) -> Result<String, FieldViolation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldViolation::Missing(field));
    }
    if trimmed.chars().count() > max {
        return Err(FieldViolation::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}
