//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageRequest;
use crate::domain::entities::{PostRecord, UserRecord};
use crate::domain::posts::{PostChanges, PostDraft};
use crate::domain::users::UserDraft;
use crate::domain::version::VersionToken;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("row version changed since it was read")]
    StaleVersion,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostQueryFilter {
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: i32,
    pub changes: PostChanges,
    /// Apply only while the row still carries this version.
    pub expected_version: Option<VersionToken>,
}

#[derive(Debug, Clone)]
pub struct UpdateUserParams {
    pub id: i32,
    pub fields: UserDraft,
    pub expected_version: Option<VersionToken>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Newest first, ties broken by id.
    async fn list_posts(
        &self,
        filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_post(&self, id: i32) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, draft: PostDraft) -> Result<PostRecord, RepoError>;

    /// Replace title and content, bump `updated_at` and the row version.
    ///
    /// Fails with [`RepoError::NotFound`] when the row is gone and
    /// [`RepoError::StaleVersion`] when `expected_version` no longer matches.
    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: i32) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Ordered by id ascending.
    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>, RepoError>;

    async fn user_exists(&self, id: i32) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait UsersWriteRepo: Send + Sync {
    async fn create_user(&self, draft: UserDraft) -> Result<UserRecord, RepoError>;

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;

    /// Fails with [`RepoError::Integrity`] while the user still owns posts.
    async fn delete_user(&self, id: i32) -> Result<(), RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn health_check(&self) -> Result<(), RepoError>;
}
