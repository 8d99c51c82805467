//! # 关联引擎
//!
//! 把请求片段与响应片段按关联 ID 合并成一条持久化记录。
//! 挂起请求保存在引擎自有的并发映射中，由周期扫描驱逐永远等不到
//! 响应的请求，避免无界增长。

use crate::error::Result;
use crate::live::LiveFeed;
use crate::recorder::models::{Entry, Fragment, RequestFragment};
use crate::storage::Storage;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 挂起的请求片段
#[derive(Debug)]
struct PendingRequest {
    fragment: RequestFragment,
    seen_at: Instant,
}

/// 关联引擎
#[derive(Debug)]
pub struct Correlator {
    storage: Arc<dyn Storage>,
    feed: Arc<LiveFeed>,
    pending: DashMap<String, PendingRequest>,
    pending_timeout: Duration,
}

impl Correlator {
    /// 创建关联引擎
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, feed: Arc<LiveFeed>, pending_timeout: Duration) -> Self {
        Self {
            storage,
            feed,
            pending: DashMap::new(),
            pending_timeout,
        }
    }

    /// 登记一个请求片段，等待响应片段到来
    ///
    /// 纯内存插入，无挂起点。捕获路径在转交宿主处理器之前同步调用，
    /// 保证同一 ID 的请求片段先于响应片段对关联引擎可见。
    pub fn register_request(&self, request: RequestFragment) {
        let replaced = self.pending.insert(
            request.id.clone(),
            PendingRequest {
                fragment: request,
                seen_at: Instant::now(),
            },
        );
        // ID 生成保证生命周期内唯一，覆盖只该出现在时钟回绕级别的异常里
        if let Some(old) = replaced {
            warn!(id = %old.fragment.id, "Pending request overwritten by duplicate id");
        }
    }

    /// 提交一个片段
    ///
    /// 请求片段进入挂起映射并返回 `Ok(None)`；响应与日志片段落盘后
    /// 返回持久化的条目。
    pub async fn submit(&self, fragment: Fragment) -> Result<Option<Entry>> {
        match fragment {
            Fragment::Request(request) => {
                self.register_request(request);
                Ok(None)
            }
            Fragment::Response(response) => {
                let entry = match self.pending.remove(&response.id) {
                    Some((_, pending)) => Entry::merged(pending.fragment, response),
                    None => {
                        debug!(id = %response.id, "No pending request for response, storing orphan");
                        Entry::orphan_response(response)
                    }
                };
                self.persist(entry).await.map(Some)
            }
            Fragment::Log(log) => self.persist(Entry::from_log(log)).await.map(Some),
        }
    }

    /// 持久化并在写入确认后广播
    async fn persist(&self, entry: Entry) -> Result<Entry> {
        self.storage.append(entry.clone()).await?;
        self.feed.publish(&entry);
        Ok(entry)
    }

    /// 当前挂起的请求数量
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 驱逐超时的挂起请求，返回驱逐数量
    ///
    /// 被驱逐的请求按 `request` 类别落盘，仍可通过查询接口检视。
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|item| now.duration_since(item.seen_at) > self.pending_timeout)
            .map(|item| item.key().clone())
            .collect();

        let mut evicted = 0;
        for id in expired {
            let Some((_, pending)) = self.pending.remove(&id) else {
                continue;
            };
            warn!(id = %id, "Evicting pending request that never saw a response");
            if let Err(e) = self.persist(Entry::from_request(pending.fragment)).await {
                warn!(id = %id, error = %e, "Failed to persist evicted request fragment");
            }
            evicted += 1;
        }
        evicted
    }

    /// 启动周期驱逐扫描任务，引擎被释放后任务自动退出
    pub fn spawn_eviction_sweep(
        correlator: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(correlator);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(correlator) = weak.upgrade() else {
                    break;
                };
                let evicted = correlator.evict_expired().await;
                if evicted > 0 {
                    debug!(evicted, "Evicted expired pending requests");
                }
            }
        })
    }
}
