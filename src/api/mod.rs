//! # 查询 API
//!
//! 对外暴露条目查询的 axum 路由。查询路径上的失败以显式错误响应
//! 返回给调用方，与捕获路径的吞错策略相反。

use crate::recorder::Telescope;
use crate::storage::EntryQuery;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// 构建查询 API 路由，嵌套在配置的路由前缀之下
#[must_use]
pub fn router(telescope: Telescope) -> Router {
    let prefix = telescope.config().server.route_prefix.clone();

    let api = Router::new()
        .route("/entries", get(list_entries))
        .route("/entries/{id}", get(get_entry))
        .with_state(telescope);

    Router::new()
        .nest(&format!("{prefix}/api"), api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
}

/// `GET {prefix}/api/entries` - 过滤分页查询
async fn list_entries(
    State(telescope): State<Telescope>,
    Query(query): Query<EntryQuery>,
) -> Response {
    match telescope.entries(&query).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to retrieve entries");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to retrieve entries" })),
            )
                .into_response()
        }
    }
}

/// `GET {prefix}/api/entries/{id}` - 单条目查询
async fn get_entry(State(telescope): State<Telescope>, Path(id): Path<String>) -> Response {
    match telescope.entry(&id).await {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Log entry not found" })),
        )
            .into_response(),
        Err(e) => {
            warn!(id = %id, error = %e, "Error fetching log entry");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
