//! # 查询 API 与捕获中间件集成测试
//!
//! 通过 `tower::ServiceExt::oneshot` 驱动路由，不经过真实网络

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use chrono::Utc;
use request_telescope::config::{StorageConfig, TelescopeConfig};
use request_telescope::{EntryKind, EntryQuery, Fragment, LogFragment, Telescope};
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;

fn test_telescope(dir: &Path) -> Telescope {
    let config = TelescopeConfig {
        storage: StorageConfig {
            path: dir.to_path_buf(),
            ..StorageConfig::default()
        },
        ..TelescopeConfig::default()
    };
    Telescope::new(config).expect("telescope setup")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn entries_endpoint_returns_paginated_shape() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    for i in 0..3 {
        telescope
            .log("info", format!("m{i}"), serde_json::Value::Null)
            .await
            .unwrap();
    }

    let response = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri("/telescope/api/entries?page=1&perPage=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["totalEntries"], 3);
    assert_eq!(json["page"], 1);
    assert_eq!(json["perPage"], 2);
    assert_eq!(json["totalPages"], 2);
    assert_eq!(json["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn entries_endpoint_applies_method_filter() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    telescope
        .submit(Fragment::Request(request_telescope::RequestFragment {
            id: "g1".to_string(),
            method: "GET".to_string(),
            url: "/a".to_string(),
            ip: None,
            headers: indexmap::IndexMap::new(),
            body: None,
            timestamp: Utc::now(),
        }))
        .await
        .unwrap();
    telescope
        .submit(Fragment::Response(request_telescope::ResponseFragment {
            id: "g1".to_string(),
            status_code: 200,
            response_time: 3,
            response_body: String::new(),
            timestamp: Utc::now(),
        }))
        .await
        .unwrap();
    telescope
        .log("info", "not a request", serde_json::Value::Null)
        .await
        .unwrap();

    let response = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri("/telescope/api/entries?method=GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["totalEntries"], 1);
    assert_eq!(json["entries"][0]["id"], "g1");
    assert_eq!(json["entries"][0]["statusCode"], 200);
}

#[tokio::test]
async fn entry_endpoint_returns_entry_or_404() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    let stored = telescope
        .log("info", "hello", serde_json::Value::Null)
        .await
        .unwrap()
        .unwrap();

    let found = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri(format!("/telescope/api/entries/{}", stored.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let json = body_json(found).await;
    assert_eq!(json["id"], stored.id.as_str());
    assert_eq!(json["type"], "log");

    let missing = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri("/telescope/api/entries/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let json = body_json(missing).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn route_prefix_is_configurable() {
    let dir = tempfile::tempdir().unwrap();
    let config = TelescopeConfig {
        storage: StorageConfig {
            path: dir.path().to_path_buf(),
            ..StorageConfig::default()
        },
        server: request_telescope::config::ServerConfig {
            route_prefix: "/observer".to_string(),
            ..request_telescope::config::ServerConfig::default()
        },
        ..TelescopeConfig::default()
    };
    let telescope = Telescope::new(config).unwrap();

    let response = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri("/observer/api/entries")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// 等待后台片段提交完成后按条件取回条目
async fn wait_for_entries(telescope: &Telescope, expected: u64) -> request_telescope::EntryPage {
    for _ in 0..100 {
        let page = telescope.entries(&EntryQuery::default()).await.unwrap();
        if page.total_entries >= expected {
            return page;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("entries did not appear in time");
}

#[tokio::test]
async fn capture_middleware_records_merged_entry() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    let app = Router::new()
        .route("/hello", get(|| async { "hello world" }))
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/hello?name=x")
                .header("x-test-header", "abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 转发给调用方的响应体不受捕获影响
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let page = wait_for_entries(&telescope, 1).await;
    let entry = &page.entries[0];
    assert_eq!(entry.kind, EntryKind::Merged);
    assert_eq!(entry.method.as_deref(), Some("GET"));
    assert_eq!(entry.url.as_deref(), Some("/hello?name=x"));
    assert_eq!(entry.status_code, Some(200));
    assert_eq!(entry.response_body.as_deref(), Some("hello world"));
    assert_eq!(
        entry
            .headers
            .as_ref()
            .unwrap()
            .get("x-test-header")
            .map(String::as_str),
        Some("abc")
    );
    assert!(entry.response_time.is_some());
}

/// 请求片段在转交处理器之前就已登记：即使处理器立即完成、
/// 响应片段在多线程运行时下抢先调度，也不会产生孤儿条目
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn instant_handlers_never_produce_orphan_entries() {
    const EXCHANGES: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    let app = Router::new()
        .route("/instant", get(|| async { "done" }))
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    for _ in 0..EXCHANGES {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/instant")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
    }

    let page = wait_for_entries(&telescope, EXCHANGES as u64).await;
    assert_eq!(page.total_entries, EXCHANGES as u64);
    assert!(
        page.entries
            .iter()
            .all(|entry| entry.kind == EntryKind::Merged),
        "every exchange yields exactly one merged entry"
    );
}

#[tokio::test]
async fn capture_concatenates_chunked_response_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    let app = Router::new()
        .route(
            "/chunks",
            get(|| async {
                let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                    Ok(Bytes::from_static(b"part-one|")),
                    Ok(Bytes::from_static(b"part-two|")),
                    Ok(Bytes::from_static(b"part-three")),
                ];
                Body::from_stream(futures::stream::iter(chunks)).into_response()
            }),
        )
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    let response = app
        .oneshot(Request::builder().uri("/chunks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"part-one|part-two|part-three");

    let page = wait_for_entries(&telescope, 1).await;
    assert_eq!(
        page.entries[0].response_body.as_deref(),
        Some("part-one|part-two|part-three")
    );
}

#[tokio::test]
async fn capture_buffers_post_request_body() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    let app = Router::new()
        .route(
            "/echo",
            axum::routing::post(|body: String| async move { body }),
        )
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .body(Body::from(r#"{"amount":42}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    // 下游处理器仍能读到完整请求体
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"amount":42}"#);

    let page = wait_for_entries(&telescope, 1).await;
    let entry = &page.entries[0];
    assert_eq!(entry.method.as_deref(), Some("POST"));
    assert_eq!(entry.body.as_deref(), Some(r#"{"amount":42}"#));
}

#[tokio::test]
async fn capture_truncates_response_body_at_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = TelescopeConfig {
        storage: StorageConfig {
            path: dir.path().to_path_buf(),
            ..StorageConfig::default()
        },
        capture: request_telescope::config::CaptureConfig {
            response_body_limit: 10,
            ..request_telescope::config::CaptureConfig::default()
        },
        ..TelescopeConfig::default()
    };
    let telescope = Telescope::new(config).unwrap();

    let app = Router::new()
        .route("/long", get(|| async { "x".repeat(500) }))
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    let response = app
        .oneshot(Request::builder().uri("/long").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.len(), 500, "delivered body is never truncated");

    let page = wait_for_entries(&telescope, 1).await;
    assert_eq!(
        page.entries[0].response_body.as_deref(),
        Some("xxxxxxxxxx"),
        "persisted body is capped"
    );
}

#[tokio::test]
async fn capture_is_disabled_when_requests_not_watched() {
    let dir = tempfile::tempdir().unwrap();
    let config = TelescopeConfig {
        storage: StorageConfig {
            path: dir.path().to_path_buf(),
            ..StorageConfig::default()
        },
        capture: request_telescope::config::CaptureConfig {
            watched_entries: vec![request_telescope::WatchedEntry::Logs],
            ..request_telescope::config::CaptureConfig::default()
        },
        ..TelescopeConfig::default()
    };
    let telescope = Telescope::new(config).unwrap();

    let app = Router::new()
        .route("/hello", get(|| async { "hi" }))
        .layer(axum::middleware::from_fn_with_state(
            telescope.clone(),
            request_telescope::capture::record,
        ));

    let response = app
        .oneshot(Request::builder().uri("/hello").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let page = telescope.entries(&EntryQuery::default()).await.unwrap();
    assert_eq!(page.total_entries, 0);
}

/// 日志片段落盘后按日志形态返回
#[tokio::test]
async fn log_entries_expose_reduced_shape() {
    let dir = tempfile::tempdir().unwrap();
    let telescope = test_telescope(dir.path());

    telescope
        .submit(Fragment::Log(LogFragment {
            level: "error".to_string(),
            message: "boom".to_string(),
            metadata: serde_json::json!({"stack": "..."}),
            timestamp: Utc::now(),
        }))
        .await
        .unwrap();

    let response = telescope
        .router()
        .oneshot(
            Request::builder()
                .uri("/telescope/api/entries")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    let entry = &json["entries"][0];
    assert_eq!(entry["type"], "log");
    assert_eq!(entry["level"], "error");
    assert_eq!(entry["message"], "boom");
    assert!(entry.get("method").is_none());
}
