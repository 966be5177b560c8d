use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    error::AppError,
    state::AppState,
    validation::{format_issues, validate_user_update},
};

use super::dto::{UpdateUserRequest, UserListResponse, UserMessageResponse, UserResponse};
use super::repo::{is_unique_violation, User};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<UserListResponse>, AppError> {
    let users = User::list(&state.db).await?;
    info!(count = users.len(), "listed users");
    Ok(Json(UserListResponse { users }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, AppError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserResponse { user }))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserMessageResponse>, AppError> {
    if let Err(issues) = validate_user_update(&payload) {
        warn!(user_id = id, "update payload failed validation");
        return Err(AppError::Validation(format_issues(&issues)));
    }

    if User::find_by_id(&state.db, id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    let user = match User::update(&state.db, id, &payload).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AppError::NotFound("User")),
        Err(e) if is_unique_violation(&e) => {
            warn!(user_id = id, "update with taken email");
            return Err(AppError::EmailTaken);
        }
        Err(e) => return Err(AppError::Internal(e)),
    };

    info!(user_id = user.id, "user updated");
    Ok(Json(UserMessageResponse {
        message: "User updated successfully",
        user,
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserMessageResponse>, AppError> {
    let user = User::delete(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    info!(user_id = user.id, email = %user.email, "user deleted");
    Ok(Json(UserMessageResponse {
        message: "User deleted successfully",
        user,
    }))
}
