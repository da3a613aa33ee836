use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{error_response, AppState};
use crate::models::referrals::{LevelFilter, Page};
use crate::services::{call, referrals::ReferralRequest, ServiceError};

#[derive(Debug, Default, Deserialize)]
pub struct NetworkQuery {
    #[serde(default)]
    term: String,
    level: Option<String>,
    page: Option<usize>,
}

impl NetworkQuery {
    fn level(&self) -> Result<LevelFilter, ServiceError> {
        match self.level.as_deref() {
            Some(level) => level
                .parse()
                .map_err(|e: crate::models::referrals::InvalidLevelFilter| {
                    ServiceError::InvalidInput(e.to_string())
                }),
            None => Ok(LevelFilter::All),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TreeQuery {
    depth: Option<u32>,
}

pub async fn get_referrals(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> Response {
    let level = match query.level() {
        Ok(level) => level,
        Err(e) => return error_response(e),
    };

    let result = call(&state.channels.referrals, "Referrals", |response| {
        ReferralRequest::Search {
            user_id,
            term: query.term.clone(),
            level,
            response,
        }
    })
    .await;

    match result {
        Ok(referrals) => {
            let page = Page::from_items(referrals, query.page.unwrap_or(1), state.page_size);
            (StatusCode::OK, Json(json!(page))).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn get_stats(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let result = call(&state.channels.referrals, "Referrals", |response| {
        ReferralRequest::GetStats { user_id, response }
    })
    .await;

    match result {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_tree(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Response {
    let max_depth = query
        .depth
        .unwrap_or(state.default_tree_depth)
        .min(state.max_tree_depth);

    let result = call(&state.channels.referrals, "Referrals", |response| {
        ReferralRequest::GetSubtree {
            user_id,
            max_depth,
            response,
        }
    })
    .await;

    match result {
        Ok(tree) => (StatusCode::OK, Json(json!(tree))).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn export(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<NetworkQuery>,
) -> Response {
    let level = match query.level() {
        Ok(level) => level,
        Err(e) => return error_response(e),
    };

    let result = call(&state.channels.referrals, "Referrals", |response| {
        ReferralRequest::Export {
            user_id,
            term: query.term.clone(),
            level,
            response,
        }
    })
    .await;

    match result {
        Ok(csv) => {
            let filename = format!(
                "attachment; filename=\"network_{}.csv\"",
                chrono::Utc::now().format("%Y-%m-%d")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, filename),
                ],
                csv,
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}
