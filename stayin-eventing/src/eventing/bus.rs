//! 事件总线（EventBus）协议
//!
//! 定义发布与批量拉取的统一抽象。确认是累计的：确认批次中最大的投递标签即可一次性结算整批消息。
//! 拉取失败在客户端边界被记录并表现为空批次，由消费循环在下个周期重试，而不是终止进程。
//!
use crate::domain_event::{Envelope, Event, OutgoingMessage};
use crate::error::EventingResult as Result;
use async_trait::async_trait;
use tracing::{debug, error, warn};

/// 结算一整批消息所需的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHandle {
    /// 批次中最大的投递标签
    pub delivery_tag: u64,
    /// 拉取时所用通道的会话号；通道重建后旧句柄失效
    pub session: u64,
}

/// 批次结算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// 确认（requeue = false），消息离开队列
    Accept,
    /// 否定确认并重新入队（requeue = true），下个周期重新投递
    Requeue,
}

/// 一次轮询拉取到的全部消息
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    envelopes: Vec<Envelope>,
    ack: Option<AckHandle>,
}

impl PendingBatch {
    pub fn new(envelopes: Vec<Envelope>, ack: Option<AckHandle>) -> Self {
        Self { envelopes, ack }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn ack_handle(&self) -> Option<AckHandle> {
        self.ack
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

/// 事件总线：负责向命名队列发布消息并批量取回待消费消息
#[async_trait]
pub trait EventBus: Send + Sync {
    /// 目标队列名
    fn queue_name(&self) -> &str;

    /// 发布一条已序列化的消息；队列在首次使用时声明为持久队列
    async fn publish_message(&self, message: &OutgoingMessage) -> Result<()>;

    /// 逐条拉取直到队列为空，返回整批消息与结算句柄
    async fn fetch_pending(&self) -> Result<PendingBatch>;

    /// 累计结算到 `ack.delivery_tag` 为止的所有消息
    async fn settle(&self, ack: AckHandle, settlement: Settlement) -> Result<()>;
}

/// 面向调用方的便捷操作：失败只记录并上报，不会让进程崩溃
#[async_trait]
pub trait EventBusExt: EventBus {
    /// 序列化并发布事件，返回是否成功；是否重试由调用方决定
    async fn publish<E: Event>(&self, event: &E) -> bool {
        let message = match OutgoingMessage::from_event(event) {
            Ok(message) => message,
            Err(err) => {
                error!(kind = E::KIND, event_id = event.event_id(), error = %err, "failed to serialize event");
                return false;
            }
        };

        match self.publish_message(&message).await {
            Ok(()) => {
                debug!(queue = self.queue_name(), kind = E::KIND, event_id = event.event_id(), "event published");
                true
            }
            Err(err) => {
                error!(queue = self.queue_name(), kind = E::KIND, event_id = event.event_id(), error = %err, "failed to publish event");
                false
            }
        }
    }

    /// 拉取待消费消息；传输失败时记录日志并返回空批次
    async fn get_pending(&self) -> PendingBatch {
        match self.fetch_pending().await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(queue = self.queue_name(), error = %err, "failed to fetch pending events");
                PendingBatch::empty()
            }
        }
    }

    /// 结算批次；空批次无需结算
    async fn settle_batch(&self, batch: &PendingBatch, settlement: Settlement) -> bool {
        let Some(ack) = batch.ack_handle() else {
            return true;
        };

        match self.settle(ack, settlement).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    queue = self.queue_name(),
                    delivery_tag = ack.delivery_tag,
                    ?settlement,
                    error = %err,
                    "failed to settle batch"
                );
                false
            }
        }
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}
