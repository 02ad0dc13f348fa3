//! 内存版事件总线（InMemoryEventBus）
//!
//! 以进程内持久队列模拟 AMQP 的 basic.get 语义，满足 `EventBus` 协议：
//! - `publish_message`：追加到就绪队列尾部；
//! - `fetch_pending`：逐条取出并分配递增的投递标签，消息转入未确认集合；
//! - `settle`：累计结算，`Accept` 移除消息，`Requeue` 按原顺序放回队首；
//! - `set_unreachable`：模拟 Broker 不可达。
//!
//! 典型用途：测试环境、示例与本地开发。

use super::bus::{AckHandle, EventBus, PendingBatch, Settlement};
use crate::domain_event::{Envelope, OutgoingMessage};
use crate::error::{EventingError, EventingResult as Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    kind: Option<String>,
    message_id: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: BTreeMap<u64, StoredMessage>,
    last_tag: u64,
    unreachable: bool,
}

/// 简单的内存队列实现，克隆共享同一队列
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    queue: String,
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryEventBus {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// 模拟 Broker 不可达：发布、拉取与结算都返回传输错误
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// 直接写入一条原始消息，可构造缺少属性或载荷损坏的消息
    pub fn push_raw(&self, payload: impl Into<Vec<u8>>, kind: Option<&str>, message_id: Option<&str>) {
        self.lock().ready.push_back(StoredMessage {
            payload: payload.into(),
            kind: kind.map(str::to_string),
            message_id: message_id.map(str::to_string),
        });
    }

    /// 等待投递的消息数
    pub fn ready_len(&self) -> usize {
        self.lock().ready.len()
    }

    /// 已投递但尚未结算的消息数
    pub fn unacked_len(&self) -> usize {
        self.lock().unacked.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self, state: &QueueState) -> Result<()> {
        if state.unreachable {
            return Err(EventingError::broker(format!(
                "broker unreachable: queue={}",
                self.queue
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn publish_message(&self, message: &OutgoingMessage) -> Result<()> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;

        state.ready.push_back(StoredMessage {
            payload: message.payload().to_vec(),
            kind: Some(message.kind().to_string()),
            message_id: Some(message.message_id().to_string()),
        });
        Ok(())
    }

    async fn fetch_pending(&self) -> Result<PendingBatch> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;

        let mut envelopes = Vec::with_capacity(state.ready.len());
        while let Some(message) = state.ready.pop_front() {
            state.last_tag += 1;
            let tag = state.last_tag;

            envelopes.push(
                Envelope::builder()
                    .payload(message.payload.clone())
                    .maybe_kind(message.kind.clone())
                    .maybe_message_id(message.message_id.clone())
                    .delivery_tag(tag)
                    .build(),
            );
            state.unacked.insert(tag, message);
        }

        let ack = envelopes.last().map(|last| AckHandle {
            delivery_tag: last.delivery_tag(),
            session: 0,
        });
        Ok(PendingBatch::new(envelopes, ack))
    }

    async fn settle(&self, ack: AckHandle, settlement: Settlement) -> Result<()> {
        let mut state = self.lock();
        self.ensure_reachable(&state)?;

        // 标签 <= delivery_tag 的消息一起结算
        let remaining = state.unacked.split_off(&(ack.delivery_tag + 1));
        let settled = std::mem::replace(&mut state.unacked, remaining);

        if settlement == Settlement::Requeue {
            for message in settled.into_values().rev() {
                state.ready.push_front(message);
            }
        }
        Ok(())
    }
}
