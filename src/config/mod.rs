//! # 应用配置结构定义
//!
//! 所有配置段都有默认值，可从 TOML 文件加载后逐段覆盖

use crate::error::{Result, TelescopeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeConfig {
    /// 存储配置
    pub storage: StorageConfig,
    /// 捕获配置
    pub capture: CaptureConfig,
    /// 实时推送配置
    pub live: LiveConfig,
    /// API 服务配置
    pub server: ServerConfig,
}

impl TelescopeConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TelescopeError::config_with_source(
                format!("Failed to read config file: {}", path.display()),
                e,
            )
        })?;
        toml::from_str(&raw).map_err(|e| {
            TelescopeError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })
    }
}

/// 存储后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 后端类型，目前仅支持 "file"
    pub backend: String,
    /// 分区文件存放目录
    pub path: PathBuf,
    /// 单个分区文件最大条目数，超出后从最旧插入的条目开始丢弃
    pub max_entries_per_file: usize,
    /// 分区最大保留时长（秒），按文件修改时间判定
    pub max_age_secs: u64,
    /// 清理任务执行间隔（秒）
    pub prune_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path: PathBuf::from("telescope-storage"),
            max_entries_per_file: 1000,
            max_age_secs: 24 * 60 * 60,
            prune_interval_secs: 60 * 60,
        }
    }
}

impl StorageConfig {
    /// 分区最大保留时长
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// 清理任务间隔
    #[must_use]
    pub const fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

/// 被监视的条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchedEntry {
    /// 请求/响应生命周期
    Requests,
    /// 手动写入的日志条目
    Logs,
    /// 错误条目
    Errors,
}

/// 捕获拦截器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 捕获哪些类别的条目
    pub watched_entries: Vec<WatchedEntry>,
    /// 响应体持久化截断上限（字符数）
    pub response_body_limit: usize,
    /// 未收到响应的挂起请求的驱逐超时（秒）
    pub pending_timeout_secs: u64,
    /// 驱逐扫描间隔（秒）
    pub eviction_interval_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            watched_entries: vec![
                WatchedEntry::Requests,
                WatchedEntry::Logs,
                WatchedEntry::Errors,
            ],
            response_body_limit: 1000,
            pending_timeout_secs: 300,
            eviction_interval_secs: 60,
        }
    }
}

impl CaptureConfig {
    /// 挂起请求驱逐超时
    #[must_use]
    pub const fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    /// 驱逐扫描间隔
    #[must_use]
    pub const fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// 是否监视指定类别
    #[must_use]
    pub fn watches(&self, kind: WatchedEntry) -> bool {
        self.watched_entries.contains(&kind)
    }
}

/// 实时推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// 新订阅者回放的最近条目数量
    pub replay_limit: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self { replay_limit: 100 }
    }
}

/// API 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 路由前缀
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            route_prefix: "/telescope".to_string(),
        }
    }
}
