//! # 实时推送
//!
//! 新条目持久化成功后的广播分发。订阅拆成两个显式步骤：
//! 先做一次快照回放，再注册广播接收端。传输层由宿主自行选择。

use crate::error::Result;
use crate::recorder::models::Entry;
use crate::storage::Storage;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

/// 广播通道容量，慢订阅者超出后丢弃最旧事件（至多一次投递）
const CHANNEL_CAPACITY: usize = 256;

/// 一次订阅的结果
#[derive(Debug)]
pub struct Subscription {
    /// 最近条目快照，降序排列，与查询引擎的顺序一致
    pub replay: Vec<Entry>,
    /// 后续新条目的接收端
    pub receiver: broadcast::Receiver<Entry>,
}

impl Subscription {
    /// 把接收端转成 `Stream`，方便接入 SSE 或 WebSocket 转发循环
    ///
    /// 慢订阅者被挤掉的事件以 `BroadcastStreamRecvError::Lagged` 出现在
    /// 流里，调用方可选择跳过或断开。
    #[must_use]
    pub fn into_stream(self) -> BroadcastStream<Entry> {
        BroadcastStream::new(self.receiver)
    }
}

/// 实时推送通道
#[derive(Debug)]
pub struct LiveFeed {
    sender: broadcast::Sender<Entry>,
    storage: Arc<dyn Storage>,
    replay_limit: usize,
}

impl LiveFeed {
    /// 创建推送通道
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, replay_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            storage,
            replay_limit,
        }
    }

    /// 推送一个已持久化的条目，尽力而为
    ///
    /// 只允许在存储确认写入之后调用，保证订阅者看到的条目都能再查到。
    pub fn publish(&self, entry: &Entry) {
        if self.sender.send(entry.clone()).is_err() {
            debug!(id = %entry.id, "No live subscribers, entry not broadcast");
        }
    }

    /// 订阅：快照回放 + 实时接收端
    pub async fn subscribe(&self) -> Result<Subscription> {
        let replay = self.storage.recent(self.replay_limit).await?;
        let receiver = self.sender.subscribe();
        Ok(Subscription { replay, receiver })
    }

    /// 当前订阅者数量
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
