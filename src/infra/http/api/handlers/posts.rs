//! Posts handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::conditional::encode_validator;
use crate::application::posts::{CreatePostCommand, UpdatePostCommand};
use crate::application::repos::PostQueryFilter;

use super::{ListParams, conditional_read, created, if_match, json_body, path_id, post_to_api};
use crate::infra::http::api::ApiVersion;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_posts(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<PostDto>>, ApiError> {
    let params = ListParams::from_query(query.as_deref());
    let filter = PostQueryFilter {
        user_id: params.user_id()?,
    };
    let page = params.page_request(state.pagination);

    let posts = state.posts.list(filter, page).await.map_err(post_to_api)?;
    Ok(Json(posts.into_iter().map(PostDto::from).collect()))
}

pub async fn get_post(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let post = state.posts.find(id).await.map_err(post_to_api)?;

    let validator = encode_validator(Some(&post.version));
    conditional_read(&headers, &validator, || PostDto::from(post))
}

pub async fn create_post(
    State(state): State<ApiState>,
    payload: Result<Json<CreatePostDto>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(payload)?;

    let post = state
        .posts
        .create(CreatePostCommand {
            title: payload.title,
            content: payload.content,
            user_id: payload.user_id,
        })
        .await
        .map_err(post_to_api)?;

    let location = format!("{}/posts/{}", ApiVersion::V1.prefix(), post.id);
    Ok(created(location, PostDto::from(post)))
}

pub async fn update_post(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<UpdatePostDto>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let payload = json_body(payload)?;

    state
        .posts
        .update(UpdatePostCommand {
            id,
            title: payload.title,
            content: payload.content,
            if_match: if_match(&headers),
        })
        .await
        .map_err(post_to_api)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete_post(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state.posts.delete(id).await.map_err(post_to_api)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
