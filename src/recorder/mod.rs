//! # 记录器入口
//!
//! `Telescope` 是整条捕获-关联-存储-查询-推送流水线的组装点，
//! 可廉价克隆后在中间件、API 状态与宿主代码之间共享。

pub mod correlator;
pub mod models;

use crate::api;
use crate::config::{TelescopeConfig, WatchedEntry};
use crate::error::{Result, TelescopeError};
use crate::live::{LiveFeed, Subscription};
use crate::recorder::correlator::Correlator;
use crate::recorder::models::{Entry, Fragment, LogFragment};
use crate::storage::{self, EntryPage, EntryQuery, FileStorage, Storage};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// 请求遥测记录器
///
/// 构建时会启动分区清理与挂起请求驱逐两个后台任务；全部 `Telescope`
/// 克隆体被释放后任务自行退出。
#[derive(Debug, Clone)]
pub struct Telescope {
    config: Arc<TelescopeConfig>,
    storage: Arc<dyn Storage>,
    correlator: Arc<Correlator>,
    feed: Arc<LiveFeed>,
}

impl Telescope {
    /// 按配置组装整条流水线
    ///
    /// 必须在 tokio 运行时内调用。不支持的存储后端在此处失败。
    pub fn new(config: TelescopeConfig) -> Result<Self> {
        let file_storage: Arc<FileStorage> = storage::create_storage(&config.storage)?;
        FileStorage::spawn_pruner(&file_storage);
        let storage: Arc<dyn Storage> = file_storage;

        let feed = Arc::new(LiveFeed::new(storage.clone(), config.live.replay_limit));
        let correlator = Arc::new(Correlator::new(
            storage.clone(),
            feed.clone(),
            config.capture.pending_timeout(),
        ));
        Correlator::spawn_eviction_sweep(&correlator, config.capture.eviction_interval());

        info!(
            path = %config.storage.path.display(),
            prefix = %config.server.route_prefix,
            "Telescope recorder initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            correlator,
            feed,
        })
    }

    /// 当前配置
    #[must_use]
    pub fn config(&self) -> &TelescopeConfig {
        &self.config
    }

    /// 关联引擎句柄，捕获中间件使用
    #[must_use]
    pub fn correlator(&self) -> Arc<Correlator> {
        self.correlator.clone()
    }

    /// 是否监视指定类别
    #[must_use]
    pub fn watches(&self, kind: WatchedEntry) -> bool {
        self.config.capture.watches(kind)
    }

    /// 提交一个片段给关联引擎
    pub async fn submit(&self, fragment: Fragment) -> Result<Option<Entry>> {
        self.correlator.submit(fragment).await
    }

    /// 手动写入一个日志条目
    ///
    /// 未监视 `logs` 类别时静默跳过并返回 `Ok(None)`。
    pub async fn log(
        &self,
        level: impl Into<String>,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<Option<Entry>> {
        if !self.watches(WatchedEntry::Logs) {
            return Ok(None);
        }
        self.submit(Fragment::Log(LogFragment {
            level: level.into(),
            message: message.into(),
            metadata,
            timestamp: Utc::now(),
        }))
        .await
    }

    /// 手动持久化一个条目并广播
    pub async fn store(&self, entry: Entry) -> Result<()> {
        self.storage.append(entry.clone()).await?;
        self.feed.publish(&entry);
        Ok(())
    }

    /// 分页查询条目
    pub async fn entries(&self, query: &EntryQuery) -> Result<EntryPage> {
        self.storage.list(query).await
    }

    /// 按 ID 查询条目，不存在返回 `Ok(None)` 而非错误
    pub async fn entry(&self, id: &str) -> Result<Option<Entry>> {
        self.storage.get(id).await
    }

    /// 最近 `limit` 条，按时间戳降序
    pub async fn recent(&self, limit: usize) -> Result<Vec<Entry>> {
        self.storage.recent(limit).await
    }

    /// 立即执行一次分区清理
    pub async fn force_prune(&self) -> Result<usize> {
        self.storage.prune().await
    }

    /// 订阅实时推送：最近条目回放 + 后续新条目接收端
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.feed.subscribe().await
    }

    /// 查询 API 路由，已嵌套在配置的路由前缀之下
    #[must_use]
    pub fn router(&self) -> axum::Router {
        api::router(self.clone())
    }

    /// 绑定配置的地址端口并对外提供查询 API
    pub async fn serve(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.config.server.bind_address, self.config.server.port
        );
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            TelescopeError::internal_with_source(format!("Failed to bind {addr}"), e)
        })?;
        info!(addr = %addr, "Telescope API listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| TelescopeError::internal_with_source("API server exited", e))
    }
}
