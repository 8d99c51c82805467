//! # 捕获拦截器
//!
//! 在宿主边界观测请求/响应生命周期的 axum 中间件。捕获工作全部是
//! 内存操作加后台任务，任何失败都被吞掉并记录日志，宿主交换的行为
//! 与结果不受影响。
//!
//! 用法：
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         telescope.clone(),
//!         request_telescope::capture::record,
//!     ));
//! ```

pub mod body;

use crate::config::WatchedEntry;
use crate::error::TelescopeError;
use crate::recorder::models::RequestFragment;
use crate::recorder::Telescope;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use body::{CaptureContext, TeeBody};
use chrono::Utc;
use indexmap::IndexMap;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// 按惯例携带请求体的方法
fn carries_body(method: &axum::http::Method) -> bool {
    matches!(
        *method,
        axum::http::Method::POST | axum::http::Method::PUT | axum::http::Method::PATCH
    )
}

/// 请求/响应捕获中间件
///
/// 请求片段在进入宿主处理器之前以后台任务提交；响应体被旁路装饰器
/// 逐块复制，流结束后提交响应片段。
pub async fn record(
    State(telescope): State<Telescope>,
    request: Request,
    next: Next,
) -> Response {
    if !telescope.watches(WatchedEntry::Requests) {
        return next.run(request).await;
    }

    let started = Instant::now();
    let id = Uuid::new_v4().to_string();

    let (parts, raw_body) = request.into_parts();

    let method = parts.method.to_string();
    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.to_string(), ToString::to_string);
    let ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());
    // HeaderName 本身就是小写，保留到达顺序
    let headers: IndexMap<String, String> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    // 请求体已由宿主解析链路缓冲；这里整体读出后原样装回
    let (request, captured_body) = if carries_body(&parts.method) {
        match axum::body::to_bytes(raw_body, usize::MAX).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                (
                    Request::from_parts(parts, Body::from(bytes)),
                    Some(text),
                )
            }
            Err(e) => {
                let err = TelescopeError::capture_with_source("Failed to buffer request body", e);
                warn!(id = %id, error = %err, "Request body not captured");
                (Request::from_parts(parts, Body::empty()), None)
            }
        }
    } else {
        (Request::from_parts(parts, raw_body), None)
    };

    let fragment = RequestFragment {
        id: id.clone(),
        method,
        url,
        ip,
        headers,
        body: captured_body,
        timestamp: Utc::now(),
    };

    // 登记是纯内存操作，就地完成；同一 ID 的请求片段必须先于
    // 响应片段到达关联引擎
    telescope.correlator().register_request(fragment);

    let response = next.run(request).await;

    let (parts, response_body) = response.into_parts();
    let context = CaptureContext {
        id,
        status_code: parts.status.as_u16(),
        started,
        body_limit: telescope.config().capture.response_body_limit,
        correlator: telescope.correlator(),
    };
    let tee = TeeBody::new(response_body, context);
    Response::from_parts(parts, Body::from_stream(tee))
}
