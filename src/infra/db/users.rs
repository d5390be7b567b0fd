use async_trait::async_trait;

use crate::application::pagination::PageRequest;
use crate::application::repos::{RepoError, UpdateUserParams, UsersRepo, UsersWriteRepo};
use crate::domain::entities::UserRecord;
use crate::domain::users::UserDraft;
use crate::domain::version::VersionToken;

use super::{PostgresRepositories, expected_sequence, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    email: String,
    version: i64,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            version: VersionToken::from_sequence(row.version),
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserRecord>, RepoError> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, version FROM users ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>, RepoError> {
        let row =
            sqlx::query_as::<_, UserRow>("SELECT id, name, email, version FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn user_exists(&self, id: i32) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl UsersWriteRepo for PostgresRepositories {
    async fn create_user(&self, draft: UserDraft) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email)
            VALUES ($1, $2)
            RETURNING id, name, email, version
            "#,
        )
        .bind(draft.name)
        .bind(draft.email)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let UpdateUserParams {
            id,
            fields,
            expected_version,
        } = params;
        let expected = expected_sequence(expected_version)?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users
            SET name = $1, email = $2, version = nextval('row_version_seq')
            WHERE id = $3 AND ($4::bigint IS NULL OR version = $4)
            RETURNING id, name, email, version
            "#,
        )
        .bind(fields.name)
        .bind(fields.email)
        .bind(id)
        .bind(expected)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(UserRecord::from(row)),
            None if expected.is_some() && self.user_exists(id).await? => {
                Err(RepoError::StaleVersion)
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_user(&self, id: i32) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
