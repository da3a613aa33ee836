use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::{error_response, AppState};
use crate::models::users::{Credentials, NewUser};
use crate::services::{call, users::UserRequest, ServiceError};

pub async fn sign_up(State(state): State<AppState>, Json(new_user): Json<NewUser>) -> Response {
    let result = call(&state.channels.users, "Users", |response| UserRequest::SignUp {
        new_user,
        response,
    })
    .await;

    match result {
        Ok(signed_up) => (StatusCode::CREATED, Json(json!(signed_up))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Response {
    let result = call(&state.channels.users, "Users", |response| UserRequest::SignIn {
        credentials,
        response,
    })
    .await;

    match result {
        Ok(session) => (StatusCode::OK, Json(json!(session))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn sign_out(State(state): State<AppState>) -> Response {
    let result = call(&state.channels.users, "Users", |response| UserRequest::SignOut {
        response,
    })
    .await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let result = call(&state.channels.users, "Users", |response| UserRequest::GetUser {
        id: user_id.clone(),
        response,
    })
    .await;

    match result {
        Ok(Some(user)) => (StatusCode::OK, Json(json!(user))).into_response(),
        Ok(None) => error_response(ServiceError::NotFound(format!("user {user_id}"))),
        Err(e) => error_response(e),
    }
}
