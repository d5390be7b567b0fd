//! Domain entities mirrored from persistent storage.

use time::OffsetDateTime;

use crate::domain::version::VersionToken;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub version: VersionToken,
}

/// A post joined with the display name of its author.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub user_id: i32,
    pub user_name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub version: VersionToken,
}
