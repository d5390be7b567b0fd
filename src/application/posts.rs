use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::conditional::{encode_validator, if_match_holds};
use crate::application::pagination::PageRequest;
use crate::application::repos::{
    PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UsersRepo,
};
use crate::domain::entities::PostRecord;
use crate::domain::error::FieldViolation;
use crate::domain::posts::{PostChanges, PostDraft};

#[derive(Debug, Error)]
pub enum PostServiceError {
    #[error(transparent)]
    Invalid(#[from] FieldViolation),
    #[error("user {0} does not exist")]
    UnknownUser(i32),
    #[error("post {0} not found")]
    NotFound(i32),
    #[error("post {0} changed since the presented validator was issued")]
    PreconditionFailed(i32),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub title: String,
    pub content: String,
    pub user_id: i32,
}

#[derive(Debug, Clone)]
pub struct UpdatePostCommand {
    pub id: i32,
    pub title: String,
    pub content: String,
    /// Raw `If-Match` header values; empty when the client sent none.
    pub if_match: Vec<String>,
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    users: Arc<dyn UsersRepo>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        users: Arc<dyn UsersRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            users,
        }
    }

    pub async fn list(
        &self,
        filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, PostServiceError> {
        self.reader
            .list_posts(filter, page)
            .await
            .map_err(PostServiceError::from)
    }

    pub async fn find(&self, id: i32) -> Result<PostRecord, PostServiceError> {
        match self.reader.find_post(id).await? {
            Some(post) => Ok(post),
            None => {
                info!(target = "application::posts::find", id, "post not found");
                Err(PostServiceError::NotFound(id))
            }
        }
    }

    pub async fn create(&self, command: CreatePostCommand) -> Result<PostRecord, PostServiceError> {
        let draft = PostDraft::parse(&command.title, &command.content, command.user_id)
            .inspect_err(|violation| {
                warn!(
                    target = "application::posts::create",
                    field = violation.field(),
                    reason = %violation,
                    "rejected post"
                );
            })?;

        if !self.users.user_exists(draft.user_id).await? {
            warn!(
                target = "application::posts::create",
                user_id = draft.user_id,
                "rejected post for unknown user"
            );
            return Err(PostServiceError::UnknownUser(draft.user_id));
        }

        let user_id = draft.user_id;
        let post = self.writer.create_post(draft).await.map_err(|err| match err {
            // The author was removed between the existence check and the insert.
            RepoError::InvalidInput { .. } => PostServiceError::UnknownUser(user_id),
            other => PostServiceError::Repo(other),
        })?;

        info!(
            target = "application::posts::create",
            id = post.id,
            user_id = post.user_id,
            "post created"
        );
        Ok(post)
    }

    pub async fn update(&self, command: UpdatePostCommand) -> Result<PostRecord, PostServiceError> {
        let id = command.id;
        let changes = PostChanges::parse(&command.title, &command.content).inspect_err(
            |violation| {
                warn!(
                    target = "application::posts::update",
                    id,
                    field = violation.field(),
                    reason = %violation,
                    "rejected post update"
                );
            },
        )?;

        let expected_version = if command.if_match.is_empty() {
            None
        } else {
            let current = self.find(id).await?;
            let validator = encode_validator(Some(&current.version));
            if !if_match_holds(command.if_match.iter().map(String::as_str), &validator) {
                warn!(
                    target = "application::posts::update",
                    id,
                    current = %validator,
                    "post precondition failed"
                );
                return Err(PostServiceError::PreconditionFailed(id));
            }
            Some(current.version)
        };

        let post = self
            .writer
            .update_post(UpdatePostParams {
                id,
                changes,
                expected_version,
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => PostServiceError::NotFound(id),
                RepoError::StaleVersion => PostServiceError::PreconditionFailed(id),
                other => PostServiceError::Repo(other),
            })?;

        info!(target = "application::posts::update", id, "post updated");
        Ok(post)
    }

    pub async fn delete(&self, id: i32) -> Result<(), PostServiceError> {
        self.writer.delete_post(id).await.map_err(|err| match err {
            RepoError::NotFound => PostServiceError::NotFound(id),
            other => PostServiceError::Repo(other),
        })?;

        info!(target = "application::posts::delete", id, "post deleted");
        Ok(())
    }
}
