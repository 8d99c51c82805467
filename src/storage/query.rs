//! # 查询引擎
//!
//! 过滤、排序、分页的纯逻辑层，叠加在存储的全量读取之上

use crate::recorder::models::Entry;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// 默认每页条目数
pub const DEFAULT_PER_PAGE: u64 = 100;

/// 条目查询参数
///
/// 直接作为 axum `Query` 提取器使用，字段名与外部 API 保持 camelCase。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryQuery {
    /// HTTP 方法精确匹配
    pub method: Option<String>,
    /// 时间戳下界（含）
    #[serde(deserialize_with = "deserialize_date")]
    pub start_date: Option<DateTime<Utc>>,
    /// 时间戳上界（含）
    #[serde(deserialize_with = "deserialize_date")]
    pub end_date: Option<DateTime<Utc>>,
    /// 页码，1 起始
    pub page: Option<u64>,
    /// 每页条目数
    pub per_page: Option<u64>,
}

impl EntryQuery {
    /// 等价于 `perPage=limit, page=1` 且无过滤条件的便捷查询
    #[must_use]
    pub fn recent(limit: usize) -> Self {
        Self {
            per_page: Some(limit as u64),
            ..Self::default()
        }
    }

    /// 生效的页码（1 起始）
    #[must_use]
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// 生效的每页条目数
    #[must_use]
    pub fn per_page(&self) -> u64 {
        match self.per_page {
            Some(0) | None => DEFAULT_PER_PAGE,
            Some(n) => n,
        }
    }
}

/// 分页查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    /// 当前页条目，按时间戳降序
    pub entries: Vec<Entry>,
    /// 过滤后的条目总数
    pub total_entries: u64,
    /// 当前页码
    pub page: u64,
    /// 每页条目数
    pub per_page: u64,
    /// 总页数 `ceil(total / perPage)`
    pub total_pages: u64,
}

/// 对全量条目执行过滤、降序排序与分页
///
/// 物理插入顺序与查询顺序无关；越界页返回空列表而非错误。
#[must_use]
pub fn paginate(mut entries: Vec<Entry>, query: &EntryQuery) -> EntryPage {
    if let Some(method) = &query.method {
        entries.retain(|entry| entry.method.as_deref() == Some(method.as_str()));
    }
    if let Some(start) = query.start_date {
        entries.retain(|entry| entry.timestamp >= start);
    }
    if let Some(end) = query.end_date {
        entries.retain(|entry| entry.timestamp <= end);
    }

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let total_entries = entries.len() as u64;
    let page = query.page();
    let per_page = query.per_page();
    let total_pages = total_entries.div_ceil(per_page);

    let start_index = (page - 1).saturating_mul(per_page);
    let page_entries: Vec<Entry> = entries
        .into_iter()
        .skip(usize::try_from(start_index).unwrap_or(usize::MAX))
        .take(usize::try_from(per_page).unwrap_or(usize::MAX))
        .collect();

    EntryPage {
        entries: page_entries,
        total_entries,
        page,
        per_page,
        total_pages,
    }
}

/// 日期参数宽松解析：接受 RFC 3339 或 `YYYY-MM-DD`（按 UTC 零点）
fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Ok(date) = raw.parse::<NaiveDate>() {
        let midnight = date.and_hms_opt(0, 0, 0).expect("valid midnight");
        return Ok(Some(DateTime::from_naive_utc_and_offset(midnight, Utc)));
    }
    Err(serde::de::Error::custom(format!("invalid date: {raw}")))
}
