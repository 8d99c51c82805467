//! # 文件存储后端
//!
//! 按天分区的 JSON 文件存储。每个分区的写入通过独立互斥锁串行化，
//! 写回采用临时文件加原子重命名，并发读取永远不会看到半截分区。

use crate::config::StorageConfig;
use crate::error::{Result, TelescopeError};
use crate::recorder::models::Entry;
use crate::storage::query::{self, EntryPage, EntryQuery};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 文件存储后端
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    max_entries_per_file: usize,
    max_age: Duration,
    prune_interval: Duration,
    /// 分区文件名到写锁的映射，append 与 prune 删除都要先持锁。
    /// 锁项一旦创建就不再移除（每天至多新增一项），移除会让已取出
    /// 旧锁的写入者与新建锁的写入者各持一把锁并发改写同一分区
    partition_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileStorage {
    /// 创建文件存储，确保存储目录存在
    pub fn new(config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path).map_err(|e| {
            TelescopeError::storage_with_source(
                format!("Failed to create storage directory: {}", config.path.display()),
                e,
            )
        })?;

        Ok(Self {
            path: config.path.clone(),
            max_entries_per_file: config.max_entries_per_file,
            max_age: config.max_age(),
            prune_interval: config.prune_interval(),
            partition_locks: DashMap::new(),
        })
    }

    /// 当天分区的文件名，分区归属由写入时刻决定而非条目时间戳
    fn partition_name(day: NaiveDate) -> String {
        format!("http-{day}.json")
    }

    fn lock_for(&self, partition: &str) -> Arc<Mutex<()>> {
        self.partition_locks
            .entry(partition.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 读取单个分区，文件缺失视为空分区，损坏内容记录后按空处理
    async fn read_partition(path: &Path) -> Vec<Entry> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read partition file");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt partition file, treating as empty");
                Vec::new()
            }
        }
    }

    /// 整体写回分区：先写临时文件再原子重命名
    async fn write_partition(&self, path: &Path, entries: &[Entry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| TelescopeError::serialization("Failed to encode partition", e))?;

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            TelescopeError::storage_with_source(
                format!("Failed to write partition temp file: {}", tmp.display()),
                e,
            )
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            TelescopeError::storage_with_source(
                format!("Failed to replace partition file: {}", path.display()),
                e,
            )
        })
    }

    /// 枚举分区文件，按文件名降序（日期命名，最新分区在前）
    async fn partition_files(&self) -> Result<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.path).await.map_err(|e| {
            TelescopeError::storage_with_source(
                format!("Failed to read storage directory: {}", self.path.display()),
                e,
            )
        })?;

        let mut files = Vec::new();
        while let Some(dirent) = dir.next_entry().await.map_err(|e| {
            TelescopeError::storage_with_source("Failed to enumerate storage directory", e)
        })? {
            let path = dirent.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                files.push(path);
            }
        }

        files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
        Ok(files)
    }

    /// 启动周期清理任务
    ///
    /// 任务持弱引用，存储被释放后自动退出。
    pub fn spawn_pruner(storage: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(storage);
        let interval = storage.prune_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(storage) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = storage.prune().await {
                    warn!(error = %e, "Periodic partition pruning failed");
                }
            }
        })
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn append(&self, entry: Entry) -> Result<()> {
        let partition = Self::partition_name(Utc::now().date_naive());
        let path = self.path.join(&partition);

        // 同一分区的 read-modify-write 必须串行，否则并发写入会互相覆盖
        let lock = self.lock_for(&partition);
        let _guard = lock.lock().await;

        let mut entries = Self::read_partition(&path).await;
        entries.push(entry);

        if entries.len() > self.max_entries_per_file {
            let excess = entries.len() - self.max_entries_per_file;
            entries.drain(..excess);
        }

        self.write_partition(&path, &entries).await
    }

    async fn get(&self, id: &str) -> Result<Option<Entry>> {
        for path in self.partition_files().await? {
            let entries = Self::read_partition(&path).await;
            if let Some(entry) = entries.into_iter().find(|entry| entry.id == id) {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    async fn list(&self, query: &EntryQuery) -> Result<EntryPage> {
        let mut all_entries = Vec::new();
        for path in self.partition_files().await? {
            all_entries.extend(Self::read_partition(&path).await);
        }
        Ok(query::paginate(all_entries, query))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Entry>> {
        let page = self.list(&EntryQuery::recent(limit)).await?;
        Ok(page.entries)
    }

    async fn prune(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut pruned = 0;

        for path in self.partition_files().await? {
            let age = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => now.duration_since(modified).unwrap_or_default(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to stat partition file");
                    continue;
                }
            };

            if age <= self.max_age {
                continue;
            }

            let partition = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            let lock = self.lock_for(&partition);
            let _guard = lock.lock().await;

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Pruned expired partition");
                    pruned += 1;
                }
                // 单个分区删除失败不阻止其余分区的清理
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to prune partition file");
                }
            }
        }

        Ok(pruned)
    }
}
