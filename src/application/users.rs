use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::conditional::{encode_validator, if_match_holds};
use crate::application::pagination::PageRequest;
use crate::application::repos::{RepoError, UpdateUserParams, UsersRepo, UsersWriteRepo};
use crate::domain::entities::UserRecord;
use crate::domain::error::FieldViolation;
use crate::domain::users::UserDraft;

#[derive(Debug, Error)]
pub enum UserServiceError {
    #[error(transparent)]
    Invalid(#[from] FieldViolation),
    #[error("user {0} not found")]
    NotFound(i32),
    #[error("user {0} changed since the presented validator was issued")]
    PreconditionFailed(i32),
    #[error("user {0} still owns posts")]
    HasPosts(i32),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct UserCommand {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct UpdateUserCommand {
    pub id: i32,
    pub fields: UserCommand,
    /// Raw `If-Match` header values; empty when the client sent none.
    pub if_match: Vec<String>,
}

#[derive(Clone)]
pub struct UserService {
    reader: Arc<dyn UsersRepo>,
    writer: Arc<dyn UsersWriteRepo>,
}

impl UserService {
    pub fn new(reader: Arc<dyn UsersRepo>, writer: Arc<dyn UsersWriteRepo>) -> Self {
        Self { reader, writer }
    }

    pub async fn list(&self, page: PageRequest) -> Result<Vec<UserRecord>, UserServiceError> {
        self.reader
            .list_users(page)
            .await
            .map_err(UserServiceError::from)
    }

    pub async fn find(&self, id: i32) -> Result<UserRecord, UserServiceError> {
        self.reader.find_user(id).await?.ok_or_else(|| {
            info!(target = "application::users::find", id, "user not found");
            UserServiceError::NotFound(id)
        })
    }

    pub async fn create(&self, command: UserCommand) -> Result<UserRecord, UserServiceError> {
        let draft = parse_fields(&command, "application::users::create")?;
        let user = self.writer.create_user(draft).await?;

        info!(target = "application::users::create", id = user.id, "user created");
        Ok(user)
    }

    pub async fn update(&self, command: UpdateUserCommand) -> Result<UserRecord, UserServiceError> {
        let id = command.id;
        let fields = parse_fields(&command.fields, "application::users::update")?;

        let expected_version = if command.if_match.is_empty() {
            None
        } else {
            let current = self.find(id).await?;
            let validator = encode_validator(Some(&current.version));
            if !if_match_holds(command.if_match.iter().map(String::as_str), &validator) {
                warn!(
                    target = "application::users::update",
                    id,
                    current = %validator,
                    "user precondition failed"
                );
                return Err(UserServiceError::PreconditionFailed(id));
            }
            Some(current.version)
        };

        let user = self
            .writer
            .update_user(UpdateUserParams {
                id,
                fields,
                expected_version,
            })
            .await
            .map_err(|err| match err {
                RepoError::NotFound => UserServiceError::NotFound(id),
                RepoError::StaleVersion => UserServiceError::PreconditionFailed(id),
                other => UserServiceError::Repo(other),
            })?;

        info!(target = "application::users::update", id, "user updated");
        Ok(user)
    }

    pub async fn delete(&self, id: i32) -> Result<(), UserServiceError> {
        self.writer.delete_user(id).await.map_err(|err| match err {
            RepoError::NotFound => UserServiceError::NotFound(id),
            RepoError::Integrity { .. } | RepoError::InvalidInput { .. } => {
                UserServiceError::HasPosts(id)
            }
            other => UserServiceError::Repo(other),
        })?;

        info!(target = "application::users::delete", id, "user deleted");
        Ok(())
    }
}

fn parse_fields(
    command: &UserCommand,
    operation: &'static str,
) -> Result<UserDraft, FieldViolation> {
    UserDraft::parse(&command.name, &command.email).inspect_err(|violation| {
        warn!(
            target = operation,
            field = violation.field(),
            reason = %violation,
            "rejected user"
        );
    })
}
