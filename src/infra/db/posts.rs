use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::pagination::PageRequest;
use crate::application::repos::{
    PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::domain::posts::PostDraft;
use crate::domain::version::VersionToken;

use super::{PostgresRepositories, expected_sequence, map_sqlx_error};

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.user_id, u.name AS user_name, \
     p.created_at, p.updated_at, p.version";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i32,
    title: String,
    content: String,
    user_id: i32,
    user_name: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    version: i64,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            user_id: row.user_id,
            user_name: row.user_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: VersionToken::from_sequence(row.version),
        }
    }
}

impl PostgresRepositories {
    fn apply_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: PostQueryFilter) {
        if let Some(user_id) = filter.user_id {
            qb.push(" AND p.user_id = ");
            qb.push_bind(user_id);
        }
    }

    async fn post_exists(&self, id: i32) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(POST_COLUMNS);
        qb.push(" FROM posts p INNER JOIN users u ON u.id = p.user_id WHERE 1=1");
        Self::apply_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_post(&self, id: i32) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p INNER JOIN users u ON u.id = p.user_id WHERE p.id = $1"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, draft: PostDraft) -> Result<PostRecord, RepoError> {
        let PostDraft {
            title,
            content,
            user_id,
        } = draft;

        let sql = format!(
            "WITH p AS ( \
                 INSERT INTO posts (title, content, user_id) \
                 VALUES ($1, $2, $3) \
                 RETURNING * \
             ) \
             SELECT {POST_COLUMNS} FROM p INNER JOIN users u ON u.id = p.user_id"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(title)
            .bind(content)
            .bind(user_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let UpdatePostParams {
            id,
            changes,
            expected_version,
        } = params;
        let expected = expected_sequence(expected_version)?;

        let sql = format!(
            "WITH p AS ( \
                 UPDATE posts \
                 SET title = $1, content = $2, updated_at = now(), \
                     version = nextval('row_version_seq') \
                 WHERE id = $3 AND ($4::bigint IS NULL OR version = $4) \
                 RETURNING * \
             ) \
             SELECT {POST_COLUMNS} FROM p INNER JOIN users u ON u.id = p.user_id"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(changes.title)
            .bind(changes.content)
            .bind(id)
            .bind(expected)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(PostRecord::from(row)),
            None if expected.is_some() && self.post_exists(id).await? => {
                Err(RepoError::StaleVersion)
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn delete_post(&self, id: i32) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
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
