//! # 响应体旁路捕获
//!
//! 包装响应体数据流的显式装饰器：每个向真实调用方转发的数据块同时
//! 拷贝进内存缓冲，流结束时把缓冲内容作为响应片段提交给关联引擎。
//! 不改写、不延迟任何转发给调用方的字节。

use crate::error::TelescopeError;
use crate::recorder::correlator::Correlator;
use crate::recorder::models::{Fragment, ResponseFragment};
use axum::body::{Body, BodyDataStream, Bytes};
use bytes::BytesMut;
use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tracing::{debug, warn};

/// 流结束时构建响应片段所需的上下文
#[derive(Debug)]
pub struct CaptureContext {
    /// 关联 ID，与请求片段相同
    pub id: String,
    /// 响应状态码
    pub status_code: u16,
    /// 观测到请求的时刻，用于计算响应耗时
    pub started: Instant,
    /// 响应体持久化截断上限（字符数）
    pub body_limit: usize,
    /// 片段提交目标
    pub correlator: Arc<Correlator>,
}

/// 旁路捕获的响应体流
///
/// 通过 `axum::body::Body::from_stream` 重新装回响应。
pub struct TeeBody {
    inner: BodyDataStream,
    buffer: BytesMut,
    // 流结束时取走，保证片段至多提交一次
    context: Option<CaptureContext>,
}

impl TeeBody {
    /// 包装一个响应体
    #[must_use]
    pub fn new(body: Body, context: CaptureContext) -> Self {
        Self {
            inner: body.into_data_stream(),
            buffer: BytesMut::new(),
            context: Some(context),
        }
    }

    /// 流正常结束：计算耗时、截断缓冲、提交响应片段
    ///
    /// 提交在独立任务中进行，失败只记录日志，绝不影响响应投递。
    fn finalize(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        let elapsed_ms = u64::try_from(context.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let text = String::from_utf8_lossy(&self.buffer);
        let response_body: String = text.chars().take(context.body_limit).collect();

        let fragment = ResponseFragment {
            id: context.id,
            status_code: context.status_code,
            response_time: elapsed_ms,
            response_body,
            timestamp: Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(e) = context
                .correlator
                .submit(Fragment::Response(fragment))
                .await
            {
                let err =
                    TelescopeError::capture_with_source("Failed to record response fragment", e);
                warn!(error = %err, "Response capture dropped");
            }
        });
    }
}

impl Stream for TeeBody {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.buffer.extend_from_slice(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // 响应体中断，放弃本次捕获；挂起的请求片段交给驱逐扫描
                if let Some(context) = this.context.take() {
                    debug!(id = %context.id, "Response body errored, capture abandoned");
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
