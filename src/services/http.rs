use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::{Channels, ServiceError};
use crate::repositories::identity::AuthError;
use crate::settings::Referrals;

mod referrals;
mod users;

#[derive(Clone)]
pub struct AppState {
    channels: Channels,
    page_size: usize,
    default_tree_depth: u32,
    max_tree_depth: u32,
}

impl AppState {
    pub fn new(channels: Channels, settings: &Referrals) -> Self {
        Self {
            channels,
            page_size: settings.page_size,
            default_tree_depth: settings.default_tree_depth,
            max_tree_depth: settings.max_tree_depth,
        }
    }
}

fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::InvalidInput(_) | ServiceError::InvalidReferralCode(_) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::Identity(AuthError::InvalidEmail | AuthError::WeakPassword) => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::Identity(
            AuthError::WrongPassword | AuthError::UserNotFound | AuthError::UserDisabled,
        ) => StatusCode::UNAUTHORIZED,
        ServiceError::Identity(AuthError::EmailInUse) => StatusCode::CONFLICT,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Identity(AuthError::Unknown(_))
        | ServiceError::AccountCreationFailed(_)
        | ServiceError::Repository(..)
        | ServiceError::Communication(..) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: ServiceError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        log::error!("Request failed: {}", error);
    }

    let kind = match &error {
        ServiceError::InvalidReferralCode(_) => "Invalid referral code",
        ServiceError::Identity(_) => "Authentication error",
        ServiceError::NotFound(_) => "Not found",
        _ if status.is_server_error() => "Internal server error",
        _ => "Bad request",
    };

    (
        status,
        Json(json!({
            "error": kind,
            "details": error.to_string()
        })),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(users::sign_up))
        .route("/signin", post(users::sign_in))
        .route("/signout", post(users::sign_out))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/referrals", get(referrals::get_referrals))
        .route("/users/{id}/referrals/stats", get(referrals::get_stats))
        .route("/users/{id}/referrals/export", get(referrals::export))
        .route("/users/{id}/tree", get(referrals::get_tree))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    channels: Channels,
    settings: &Referrals,
) -> Result<(), anyhow::Error> {
    let app = router(AppState::new(channels, settings));

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::repositories::{identity::MemoryIdentity, store::MemoryStore};
    use crate::services::spawn_services;
    use crate::settings::Settings;

    fn app() -> Router {
        let settings = Settings::default();
        let channels = spawn_services(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryIdentity::new()),
            &settings,
        );
        router(AppState::new(channels, &settings.referrals))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn sign_up(app: &Router, name: &str, code: Option<&str>) -> (StatusCode, Value) {
        let payload = json!({
            "name": name,
            "email": format!("{name}@example.com"),
            "phone": "0500000000",
            "password": "secret1",
            "referralCode": code,
        });
        let request = Request::post("/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();

        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health() {
        let (status, body) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn sign_up_and_browse_the_network() {
        let app = app();

        let (status, sponsor) = sign_up(&app, "amal", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let sponsor_id = sponsor["userId"].as_str().unwrap().to_string();
        let code = sponsor["referralCode"].as_str().unwrap().to_string();

        for i in 0..12 {
            let (status, _) = sign_up(&app, &format!("member{i}"), Some(code.as_str())).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, page) = get_json(&app, &format!("/users/{sponsor_id}/referrals?page=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 12);
        assert_eq!(page["totalPages"], 2);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);

        let (_, filtered) = get_json(
            &app,
            &format!("/users/{sponsor_id}/referrals?term=member1&level=1"),
        )
        .await;
        // member1, member10, member11
        assert_eq!(filtered["total"], 3);

        let (status, user) = get_json(&app, &format!("/users/{sponsor_id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["referralCount"], 12);

        let (status, stats) = get_json(&app, &format!("/users/{sponsor_id}/referrals/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["direct"], 12);

        let (status, tree) = get_json(&app, &format!("/users/{sponsor_id}/tree?depth=0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree["children"].as_object().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn invalid_codes_and_filters_are_bad_requests() {
        let app = app();

        let (status, body) = sign_up(&app, "amal", Some("NOPE0000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid referral code");

        let (status, _) = get_json(&app, "/users/someone/referrals?level=first").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_users_are_not_found() {
        let app = app();

        let (status, body) = get_json(&app, "/users/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");

        let (status, body) = get_json(&app, "/users/ghost/tree").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn sign_in_and_out() {
        let app = app();
        let (_, signed_up) = sign_up(&app, "amal", None).await;

        let request = Request::post("/signin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"email": "amal@example.com", "password": "secret1"}).to_string(),
            ))
            .unwrap();
        let (status, body) = send(&app, request).await;
        let session: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["userId"], signed_up["userId"]);

        let request = Request::post("/signin")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"email": "amal@example.com", "password": "nope!!"}).to_string(),
            ))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Request::post("/signout").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn export_is_a_csv_attachment() {
        let app = app();
        let (_, sponsor) = sign_up(&app, "amal", None).await;
        let code = sponsor["referralCode"].as_str().unwrap().to_string();
        sign_up(&app, "omar", Some(code.as_str())).await;

        let uri = format!("/users/{}/referrals/export", sponsor["userId"].as_str().unwrap());
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(body.to_vec()).unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("omar,omar@example.com,"));
    }
}
