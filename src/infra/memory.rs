//! In-process repository used when no database is configured.
//!
//! Rows live behind one async mutex; the store-wide version counter is bumped
//! under that same lock, so a row's fields and its version change together.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::application::pagination::PageRequest;
use crate::application::repos::{
    HealthRepo, PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
    UpdateUserParams, UsersRepo, UsersWriteRepo,
};
use crate::domain::entities::{PostRecord, UserRecord};
use crate::domain::posts::PostDraft;
use crate::domain::users::UserDraft;
use crate::domain::version::VersionToken;

#[derive(Debug, Clone)]
struct StoredUser {
    name: String,
    email: String,
    version: i64,
}

#[derive(Debug, Clone)]
struct StoredPost {
    title: String,
    content: String,
    user_id: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    version: i64,
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<i32, StoredUser>,
    posts: BTreeMap<i32, StoredPost>,
    next_user_id: i32,
    next_post_id: i32,
    last_version: i64,
}

impl Tables {
    fn next_version(&mut self) -> i64 {
        self.last_version += 1;
        self.last_version
    }

    fn allocate_user_id(&mut self) -> Result<i32, RepoError> {
        self.next_user_id = self
            .next_user_id
            .checked_add(1)
            .ok_or_else(|| RepoError::from_persistence("user id space exhausted"))?;
        Ok(self.next_user_id)
    }

    fn allocate_post_id(&mut self) -> Result<i32, RepoError> {
        self.next_post_id = self
            .next_post_id
            .checked_add(1)
            .ok_or_else(|| RepoError::from_persistence("post id space exhausted"))?;
        Ok(self.next_post_id)
    }

    fn user_record(&self, id: i32) -> Option<UserRecord> {
        self.users.get(&id).map(|user| UserRecord {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
            version: VersionToken::from_sequence(user.version),
        })
    }

    fn post_record(&self, id: i32) -> Result<Option<PostRecord>, RepoError> {
        let Some(post) = self.posts.get(&id) else {
            return Ok(None);
        };
        let author = self.users.get(&post.user_id).ok_or_else(|| RepoError::Integrity {
            message: format!("post {id} references missing user {}", post.user_id),
        })?;

        Ok(Some(PostRecord {
            id,
            title: post.title.clone(),
            content: post.content.clone(),
            user_id: post.user_id,
            user_name: author.name.clone(),
            created_at: post.created_at,
            updated_at: post.updated_at,
            version: VersionToken::from_sequence(post.version),
        }))
    }

    /// Check `expected` against the stored version, distinguishing a missing row.
    fn check_version(
        current: Option<i64>,
        expected: Option<&VersionToken>,
    ) -> Result<(), RepoError> {
        let current = current.ok_or(RepoError::NotFound)?;
        match expected {
            Some(token) if token.to_sequence() != Some(current) => Err(RepoError::StaleVersion),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

fn window<T>(items: impl Iterator<Item = T>, page: PageRequest) -> impl Iterator<Item = T> {
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(page.limit()).unwrap_or(0);
    items.skip(skip).take(take)
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn list_posts(
        &self,
        filter: PostQueryFilter,
        page: PageRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.lock().await;

        let mut ids: Vec<(OffsetDateTime, i32)> = tables
            .posts
            .iter()
            .filter(|(_, post)| filter.user_id.is_none_or(|user_id| post.user_id == user_id))
            .map(|(id, post)| (post.created_at, *id))
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        window(ids.into_iter(), page)
            .filter_map(|(_, id)| tables.post_record(id).transpose())
            .collect()
    }

    async fn find_post(&self, id: i32) -> Result<Option<PostRecord>, RepoError> {
        self.tables.lock().await.post_record(id)
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryRepositories {
    async fn create_post(&self, draft: PostDraft) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&draft.user_id) {
            return Err(RepoError::InvalidInput {
                message: format!("user {} does not exist", draft.user_id),
            });
        }

        let id = tables.allocate_post_id()?;
        let version = tables.next_version();
        let now = OffsetDateTime::now_utc();
        tables.posts.insert(
            id,
            StoredPost {
                title: draft.title,
                content: draft.content,
                user_id: draft.user_id,
                created_at: now,
                updated_at: now,
                version,
            },
        );

        tables
            .post_record(id)?
            .ok_or_else(|| RepoError::from_persistence("inserted post vanished"))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let current = tables.posts.get(&params.id).map(|post| post.version);
        Tables::check_version(current, params.expected_version.as_ref())?;

        let version = tables.next_version();
        let post = tables.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.title = params.changes.title;
        post.content = params.changes.content;
        post.updated_at = OffsetDateTime::now_utc();
        post.version = version;

        tables.post_record(params.id)?.ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: i32) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        tables.posts.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl UsersRepo for InMemoryRepositories {
    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(window(tables.users.keys().copied(), page)
            .filter_map(|id| tables.user_record(id))
            .collect())
    }

    async fn find_user(&self, id: i32) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.tables.lock().await.user_record(id))
    }

    async fn user_exists(&self, id: i32) -> Result<bool, RepoError> {
        Ok(self.tables.lock().await.users.contains_key(&id))
    }
}

#[async_trait]
impl UsersWriteRepo for InMemoryRepositories {
    async fn create_user(&self, draft: UserDraft) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let id = tables.allocate_user_id()?;
        let version = tables.next_version();
        tables.users.insert(
            id,
            StoredUser {
                name: draft.name,
                email: draft.email,
                version,
            },
        );

        tables
            .user_record(id)
            .ok_or_else(|| RepoError::from_persistence("inserted user vanished"))
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let current = tables.users.get(&params.id).map(|user| user.version);
        Tables::check_version(current, params.expected_version.as_ref())?;

        let version = tables.next_version();
        let user = tables.users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        user.name = params.fields.name;
        user.email = params.fields.email;
        user.version = version;

        tables.user_record(params.id).ok_or(RepoError::NotFound)
    }

    async fn delete_user(&self, id: i32) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        if tables.posts.values().any(|post| post.user_id == id) {
            return Err(RepoError::Integrity {
                message: format!("user {id} still owns posts"),
            });
        }
        tables.users.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl HealthRepo for InMemoryRepositories {
    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}
