//! Users handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::conditional::encode_validator;
use crate::application::users::{UpdateUserCommand, UserCommand};

use super::{ListParams, conditional_read, created, if_match, json_body, path_id, user_to_api};
use crate::infra::http::api::ApiVersion;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

pub async fn list_users(
    State(state): State<ApiState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let page = ListParams::from_query(query.as_deref()).page_request(state.pagination);
    let users = state.users.list(page).await.map_err(user_to_api)?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

pub async fn get_user(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let user = state.users.find(id).await.map_err(user_to_api)?;

    let validator = encode_validator(Some(&user.version));
    conditional_read(&headers, &validator, || UserDto::from(user))
}

pub async fn create_user(
    State(state): State<ApiState>,
    payload: Result<Json<CreateUserDto>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(payload)?;

    let user = state
        .users
        .create(UserCommand {
            name: payload.name,
            email: payload.email,
        })
        .await
        .map_err(user_to_api)?;

    let location = format!("{}/users/{}", ApiVersion::V1.prefix(), user.id);
    Ok(created(location, UserDto::from(user)))
}

pub async fn update_user(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<UpdateUserDto>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    let payload = json_body(payload)?;

    state
        .users
        .update(UpdateUserCommand {
            id,
            fields: UserCommand {
                name: payload.name,
                email: payload.email,
            },
            if_match: if_match(&headers),
        })
        .await
        .map_err(user_to_api)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn delete_user(
    State(state): State<ApiState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = path_id(id)?;
    state.users.delete(id).await.map_err(user_to_api)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
