use std::sync::Arc;

use crate::application::pagination::PageBounds;
use crate::application::posts::PostService;
use crate::application::users::UserService;
use crate::cache::CacheState;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub posts: Arc<PostService>,
    pub users: Arc<UserService>,
    pub pagination: PageBounds,
    pub cache: CacheState,
    /// `None` disables rate limiting.
    pub rate_limiter: Option<Arc<ApiRateLimiter>>,
}
