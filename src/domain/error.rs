use thiserror::Error;

/// A single field that failed its domain constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldViolation {
    #[error("{0} must not be empty")]
    Missing(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{0} must be a positive identifier")]
    NotPositive(&'static str),
    #[error("{0} is not a valid email address")]
    Malformed(&'static str),
}

impl FieldViolation {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing(field)
            | Self::NotPositive(field)
            | Self::Malformed(field)
            | Self::TooLong { field, .. } => field,
        }
    }

    /// Whether the field was absent rather than present but out of bounds.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_) | Self::NotPositive(_))
    }
}
