//! 事件分发器（Dispatcher）
//!
//! 对单个信封执行“账本检查 → 目录查找 → 解码 → 处理 → 记录”，保证每个事件至多应用一次。
//! 账本键优先取 Broker 的 `message_id`，缺失时回退到载荷中的 `EventId`。
//!
use super::catalog::Catalog;
use crate::domain_event::{Envelope, EventHeader};
use crate::error::{EventingError, EventingResult as Result};
use crate::persist::ConsumedEventLedger;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// 单个信封的应用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// 处理器已执行，消费记录已缓冲到工作单元
    Applied,
    /// 账本中已存在，什么也没做
    AlreadyConsumed,
}

pub struct Dispatcher<W> {
    catalog: Arc<Catalog<W>>,
}

impl<W> Clone for Dispatcher<W> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
        }
    }
}

impl<W> Dispatcher<W>
where
    W: ConsumedEventLedger + Send + 'static,
{
    pub fn new(catalog: Arc<Catalog<W>>) -> Self {
        Self { catalog }
    }

    /// 在工作单元上应用一个信封
    ///
    /// 未知类型与解码失败是致命错误，会以 `error!` 记录；处理器错误原样返回，由调用方放弃整批。
    #[instrument(skip_all, fields(kind = envelope.kind(), message_id = envelope.message_id(), delivery_tag = envelope.delivery_tag()))]
    pub async fn apply(&self, envelope: &Envelope, work: &mut W) -> Result<ApplyOutcome> {
        let result = self.apply_inner(envelope, work).await;

        if let Err(err) = &result {
            if err.is_fatal() {
                error!(
                    kind = envelope.kind().unwrap_or("<none>"),
                    message_id = envelope.message_id().unwrap_or("<none>"),
                    error = %err,
                    "event cannot be consumed"
                );
            }
        }
        result
    }

    async fn apply_inner(&self, envelope: &Envelope, work: &mut W) -> Result<ApplyOutcome> {
        let key = ledger_key(envelope)?;

        if work.has_consumed(&key).await? {
            debug!(event_id = %key, "event already consumed, skipping");
            return Ok(ApplyOutcome::AlreadyConsumed);
        }

        let kind = envelope.kind().unwrap_or_default();
        let Some(entry) = self.catalog.get(kind) else {
            return Err(EventingError::UnknownKind {
                kind: kind.to_string(),
            });
        };

        let event = entry.decode(envelope.payload())?;
        if event.event_id() != key {
            warn!(
                event_id = event.event_id(),
                message_id = %key,
                "message id differs from payload event id, ledger uses message id"
            );
        }

        let published_at = event.published_at();
        entry.handle(event, work).await?;
        work.record_consumed(&key, Utc::now()).await?;
        debug!(event_id = %key, %published_at, "event applied");
        Ok(ApplyOutcome::Applied)
    }
}

/// 账本键：`message_id`，缺失或为空时解码载荷中的事件头
fn ledger_key(envelope: &Envelope) -> Result<String> {
    if let Some(id) = envelope.message_id().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    serde_json::from_slice::<EventHeader>(envelope.payload())
        .map(|header| header.event_id().to_string())
        .map_err(|e| EventingError::Decode {
            kind: envelope.kind().unwrap_or_default().to_string(),
            reason: format!("missing message id and unreadable event header: {e}"),
        })
}
