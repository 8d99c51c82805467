//! # Request Telescope
//!
//! 嵌入式 HTTP 请求遥测记录器：在宿主 axum 应用中观测请求/响应生命
//! 周期，把两个片段关联成完整记录，写入按天分区的文件存储，并通过
//! 查询 API 与实时广播对外提供。
//!
//! ```ignore
//! let telescope = Telescope::new(TelescopeConfig::default())?;
//! let app = Router::new()
//!     .route("/", get(handler))
//!     .merge(telescope.router())
//!     .layer(axum::middleware::from_fn_with_state(
//!         telescope.clone(),
//!         request_telescope::capture::record,
//!     ));
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod live;
pub mod logging;
pub mod recorder;
pub mod storage;

// Re-export commonly used types
pub use config::{TelescopeConfig, WatchedEntry};
pub use error::{Result, TelescopeError};
pub use live::Subscription;
pub use recorder::models::{Entry, EntryKind, Fragment, LogFragment, RequestFragment, ResponseFragment};
pub use recorder::Telescope;
pub use storage::{EntryPage, EntryQuery};
