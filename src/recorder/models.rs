//! # 条目数据模型
//!
//! 定义持久化条目与关联前的请求/响应片段

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// 仅请求片段（响应超时被驱逐时落盘）
    Request,
    /// 仅响应片段
    Response,
    /// 请求与响应合并后的完整记录
    Merged,
    /// 手动写入的日志条目
    Log,
    /// 没有匹配到挂起请求的响应
    OrphanResponse,
}

/// 持久化条目 - 存储与查询的统一单元
///
/// 合并条目与日志条目共用一个结构，缺失字段在序列化时省略，
/// 对外 JSON 形态与字段名保持 camelCase。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// 关联 ID，一次请求生命周期内唯一
    pub id: String,
    /// 条目类别
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// 片段创建时刻（合并条目取请求片段的时间，按请求开始时间排序）
    pub timestamp: DateTime<Utc>,
    /// HTTP 方法
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// 请求 URL（路径 + 查询串）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 请求头，键已转为小写，保持捕获顺序
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<IndexMap<String, String>>,
    /// 请求体
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// 客户端地址
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// 响应状态码
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// 响应耗时（毫秒）
    #[serde(rename = "responseTime", skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    /// 截断后的响应体
    #[serde(rename = "responseBody", skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// 日志级别（仅日志条目）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// 日志内容（仅日志条目）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 日志附加数据（仅日志条目）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Entry {
    fn empty(id: String, kind: EntryKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            timestamp,
            method: None,
            url: None,
            headers: None,
            body: None,
            ip: None,
            status_code: None,
            response_time: None,
            response_body: None,
            level: None,
            message: None,
            metadata: None,
        }
    }

    /// 由未匹配到响应的请求片段构建条目
    #[must_use]
    pub fn from_request(fragment: RequestFragment) -> Self {
        let mut entry = Self::empty(fragment.id, EntryKind::Request, fragment.timestamp);
        entry.method = Some(fragment.method);
        entry.url = Some(fragment.url);
        entry.headers = Some(fragment.headers);
        entry.body = fragment.body;
        entry.ip = fragment.ip;
        entry
    }

    /// 合并请求与响应片段，时间戳取请求片段
    #[must_use]
    pub fn merged(request: RequestFragment, response: ResponseFragment) -> Self {
        let mut entry = Self::empty(request.id, EntryKind::Merged, request.timestamp);
        entry.method = Some(request.method);
        entry.url = Some(request.url);
        entry.headers = Some(request.headers);
        entry.body = request.body;
        entry.ip = request.ip;
        entry.status_code = Some(response.status_code);
        entry.response_time = Some(response.response_time);
        entry.response_body = Some(response.response_body);
        entry
    }

    /// 由没有匹配挂起请求的响应片段构建孤儿条目
    #[must_use]
    pub fn orphan_response(fragment: ResponseFragment) -> Self {
        let mut entry = Self::empty(fragment.id, EntryKind::OrphanResponse, fragment.timestamp);
        entry.status_code = Some(fragment.status_code);
        entry.response_time = Some(fragment.response_time);
        entry.response_body = Some(fragment.response_body);
        entry
    }

    /// 由日志片段构建条目
    #[must_use]
    pub fn from_log(fragment: LogFragment) -> Self {
        let mut entry = Self::empty(
            Uuid::new_v4().to_string(),
            EntryKind::Log,
            fragment.timestamp,
        );
        entry.level = Some(fragment.level);
        entry.message = Some(fragment.message);
        entry.metadata = Some(fragment.metadata);
        entry
    }
}

/// 请求片段 - 关联前的请求半边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFragment {
    /// 关联 ID
    pub id: String,
    /// HTTP 方法
    pub method: String,
    /// 请求 URL
    pub url: String,
    /// 客户端地址
    pub ip: Option<String>,
    /// 请求头（键小写）
    pub headers: IndexMap<String, String>,
    /// 请求体
    pub body: Option<String>,
    /// 观测到请求的时刻
    pub timestamp: DateTime<Utc>,
}

/// 响应片段 - 关联前的响应半边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFragment {
    /// 关联 ID，与对应请求片段相同
    pub id: String,
    /// 响应状态码
    pub status_code: u16,
    /// 自观测到请求起的耗时（毫秒）
    pub response_time: u64,
    /// 截断后的响应体
    pub response_body: String,
    /// 观测到响应完成的时刻
    pub timestamp: DateTime<Utc>,
}

/// 日志片段 - 绕过关联直接落盘
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFragment {
    /// 日志级别
    pub level: String,
    /// 日志内容
    pub message: String,
    /// 附加数据
    pub metadata: serde_json::Value,
    /// 写入时刻
    pub timestamp: DateTime<Utc>,
}

/// 提交给关联引擎的片段
#[derive(Debug, Clone)]
pub enum Fragment {
    /// 请求片段
    Request(RequestFragment),
    /// 响应片段
    Response(ResponseFragment),
    /// 日志片段
    Log(LogFragment),
}
