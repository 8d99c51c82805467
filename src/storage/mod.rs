//! # 存储后端
//!
//! 统一的持久化接口与后端工厂。后端负责分区、容量上限与保留期清理。

pub mod file;
pub mod query;

pub use file::FileStorage;
pub use query::{EntryPage, EntryQuery};

use crate::config::StorageConfig;
use crate::error::{Result, TelescopeError};
use crate::recorder::models::Entry;
use async_trait::async_trait;
use std::sync::Arc;

/// 持久化后端接口
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// 追加一个条目到当天分区
    async fn append(&self, entry: Entry) -> Result<()>;

    /// 按 ID 查找条目，从最新分区开始扫描；不存在返回 `Ok(None)`
    async fn get(&self, id: &str) -> Result<Option<Entry>>;

    /// 过滤、排序、分页查询
    async fn list(&self, query: &EntryQuery) -> Result<EntryPage>;

    /// 最近 `limit` 条，按时间戳降序
    async fn recent(&self, limit: usize) -> Result<Vec<Entry>>;

    /// 删除保留期外的整个分区，返回删除的分区数
    async fn prune(&self) -> Result<usize>;
}

/// 按配置构建存储后端
///
/// 未知的后端类型在构建期即失败，属于致命配置错误。
pub fn create_storage(config: &StorageConfig) -> Result<Arc<FileStorage>> {
    match config.backend.as_str() {
        "file" => Ok(Arc::new(FileStorage::new(config)?)),
        other => Err(TelescopeError::config(format!(
            "unsupported storage backend: {other}"
        ))),
    }
}
