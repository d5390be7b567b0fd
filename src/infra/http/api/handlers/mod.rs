//! API handlers organized by resource type.
//!
//! Request parsing helpers and the service error conversions shared by the
//! resource modules live here.

mod posts;
mod users;

pub use posts::*;
pub use users::*;

use axum::Json;
use axum::extract::Path;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use crate::application::conditional::{ConditionalOutcome, evaluate_if_none_match};
use crate::application::pagination::{PageBounds, PageRequest, parse_lenient};
use crate::application::posts::PostServiceError;
use crate::application::repos::RepoError;
use crate::application::users::UserServiceError;

use super::error::{ApiError, codes};

// ----- Request parsing -----

/// Collection query parameters. Keys match case-insensitively; the first occurrence wins.
#[derive(Debug, Default)]
pub struct ListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub user_id: Option<String>,
}

impl ListParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(query) = query else {
            return params;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = if key.eq_ignore_ascii_case("page") {
                &mut params.page
            } else if key.eq_ignore_ascii_case("pageSize") {
                &mut params.page_size
            } else if key.eq_ignore_ascii_case("userId") {
                &mut params.user_id
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Unparsable or out-of-range values fall back to the defaults.
    pub fn page_request(&self, bounds: PageBounds) -> PageRequest {
        PageRequest::normalize(
            parse_lenient(self.page.as_deref()),
            parse_lenient(self.page_size.as_deref()),
            bounds,
        )
    }

    /// Blank means no filter; anything else must be an integer.
    pub fn user_id(&self) -> Result<Option<i32>, ApiError> {
        match self.user_id.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse::<i32>().map(Some).map_err(|_| {
                ApiError::validation(format!("userId must be an integer, got `{raw}`"))
            }),
        }
    }
}

pub(crate) fn path_id(path: Result<Path<i32>, PathRejection>) -> Result<i32, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::bad_request("Invalid id", Some(rejection.body_text())))
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::bad_request("Invalid request body", Some(rejection.body_text()))
    })
}

pub(crate) fn if_none_match(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
}

pub(crate) fn if_match(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::IF_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

// ----- Response shaping -----

/// Answer a single-item read: `304` with an empty body when the client's
/// validator is current, otherwise `200` with the body. Both carry `ETag`.
///
/// `body` only runs on a miss.
pub(crate) fn conditional_read<T, F>(
    headers: &HeaderMap,
    validator: &str,
    body: F,
) -> Result<Response, ApiError>
where
    T: Serialize,
    F: FnOnce() -> T,
{
    let etag = HeaderValue::from_str(validator).map_err(|err| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Invalid validator",
            Some(err.to_string()),
        )
    })?;

    let mut response = match evaluate_if_none_match(if_none_match(headers), validator) {
        ConditionalOutcome::Hit => {
            debug!(target = "nebula::api::conditional", validator, "not modified");
            StatusCode::NOT_MODIFIED.into_response()
        }
        ConditionalOutcome::Miss => Json(body()).into_response(),
    };
    response.headers_mut().insert(header::ETAG, etag);
    Ok(response)
}

pub(crate) fn created<T: Serialize>(location: String, body: T) -> Response {
    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

// ----- Shared error conversions -----

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::StaleVersion => ApiError::precondition_failed("Resource was modified"),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(msg),
        ),
    }
}

pub(crate) fn post_to_api(err: PostServiceError) -> ApiError {
    match err {
        PostServiceError::Invalid(violation) => ApiError::validation(violation.to_string()),
        PostServiceError::UnknownUser(user_id) => {
            ApiError::validation(format!("user {user_id} does not exist"))
        }
        PostServiceError::NotFound(_) => ApiError::not_found("post not found"),
        PostServiceError::PreconditionFailed(_) => {
            ApiError::precondition_failed("Post was modified")
        }
        PostServiceError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn user_to_api(err: UserServiceError) -> ApiError {
    match err {
        UserServiceError::Invalid(violation) => ApiError::validation(violation.to_string()),
        UserServiceError::NotFound(_) => ApiError::not_found("user not found"),
        UserServiceError::PreconditionFailed(_) => {
            ApiError::precondition_failed("User was modified")
        }
        UserServiceError::HasPosts(id) => ApiError::conflict(
            "User still owns posts",
            Some(format!("delete the posts of user {id} first")),
        ),
        UserServiceError::Repo(repo) => repo_to_api(repo),
    }
}
