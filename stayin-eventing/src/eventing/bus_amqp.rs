//! AMQP 事件总线（`amqp`）
//!
//! 基于 lapin 的 RabbitMQ 实现：
//! - 发布：默认交换机 + 路由键为队列名，属性 `type`/`message_id`/`delivery_mode = 2`；
//! - 拉取：`basic.get`（手动确认）逐条取回直到队列为空；
//! - 结算：`basic.ack` / `basic.nack(requeue = true)`，均为 `multiple = true` 的累计结算。
//!
//! 连接与通道跨周期复用，由异步互斥锁保护，发布与拉取不会在同一通道上交错。
//! 任何通道错误都会丢弃当前会话，下次使用时重建；旧会话上的未确认消息由 Broker 自动重新入队，
//! 因此携带旧会话号的结算句柄会被忽略。
use super::bus::{AckHandle, EventBus, PendingBatch, Settlement};
use crate::config::BrokerConfig;
use crate::domain_event::{Envelope, OutgoingMessage};
use crate::error::{EventingError, EventingResult as Result};
use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

struct AmqpSession {
    connection: Connection,
    channel: Channel,
    id: u64,
}

pub struct AmqpEventBus {
    config: BrokerConfig,
    session: Mutex<Option<AmqpSession>>,
    sessions_opened: AtomicU64,
}

impl AmqpEventBus {
    /// 创建总线；连接在首次使用时建立
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            sessions_opened: AtomicU64::new(0),
        }
    }

    /// 关闭当前连接（若有）
    pub async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            session.connection.close(200, "consumer shutdown").await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %self.config.queue), err)]
    async fn connect(&self) -> Result<AmqpSession> {
        let connection =
            Connection::connect(&self.config.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        // 持久、非独占、不自动删除
        channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let id = self.sessions_opened.fetch_add(1, Ordering::Relaxed) + 1;
        info!(session = id, "amqp session opened");
        Ok(AmqpSession {
            connection,
            channel,
            id,
        })
    }

    /// 取得可用会话，必要时重建
    async fn ensure_session<'a>(
        &self,
        slot: &'a mut Option<AmqpSession>,
    ) -> Result<&'a mut AmqpSession> {
        let healthy = slot
            .as_ref()
            .is_some_and(|s| s.connection.status().connected() && s.channel.status().connected());

        if !healthy {
            *slot = Some(self.connect().await?);
        }

        slot.as_mut()
            .ok_or_else(|| EventingError::broker("amqp session unavailable"))
    }

    async fn publish_on(channel: &Channel, queue: &str, message: &OutgoingMessage) -> Result<()> {
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                message.payload(),
                message_properties(message),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn drain_on(channel: &Channel, queue: &str, session: u64) -> Result<PendingBatch> {
        let mut envelopes = Vec::new();

        while let Some(message) = channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await?
        {
            let delivery = message.delivery;
            let kind = delivery
                .properties
                .kind()
                .as_ref()
                .map(|s| s.as_str().to_string());
            let message_id = delivery
                .properties
                .message_id()
                .as_ref()
                .map(|s| s.as_str().to_string());

            envelopes.push(
                Envelope::builder()
                    .payload(delivery.data)
                    .maybe_kind(kind)
                    .maybe_message_id(message_id)
                    .delivery_tag(delivery.delivery_tag)
                    .build(),
            );
        }

        let ack = envelopes.last().map(|last| AckHandle {
            delivery_tag: last.delivery_tag(),
            session,
        });
        Ok(PendingBatch::new(envelopes, ack))
    }
}

#[async_trait]
impl EventBus for AmqpEventBus {
    fn queue_name(&self) -> &str {
        &self.config.queue
    }

    #[instrument(skip(self, message), fields(queue = %self.config.queue, kind = message.kind(), message_id = message.message_id()), err)]
    async fn publish_message(&self, message: &OutgoingMessage) -> Result<()> {
        let mut slot = self.session.lock().await;
        let session = self.ensure_session(&mut *slot).await?;

        let result = Self::publish_on(&session.channel, &self.config.queue, message).await;
        if result.is_err() {
            *slot = None;
        }
        result
    }

    #[instrument(skip(self), fields(queue = %self.config.queue), err)]
    async fn fetch_pending(&self) -> Result<PendingBatch> {
        let mut slot = self.session.lock().await;
        let session = self.ensure_session(&mut *slot).await?;
        let id = session.id;

        match Self::drain_on(&session.channel, &self.config.queue, id).await {
            Ok(batch) => {
                debug!(fetched = batch.len(), session = id, "drained queue");
                Ok(batch)
            }
            Err(err) => {
                // 丢弃会话：已取回但未确认的消息随通道关闭重新入队
                *slot = None;
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(queue = %self.config.queue), err)]
    async fn settle(&self, ack: AckHandle, settlement: Settlement) -> Result<()> {
        let mut slot = self.session.lock().await;

        let Some(session) = slot.as_ref().filter(|s| s.id == ack.session) else {
            warn!(
                session = ack.session,
                delivery_tag = ack.delivery_tag,
                "session closed before settlement, broker will redeliver"
            );
            return Ok(());
        };

        let result = match settlement {
            Settlement::Accept => {
                session
                    .channel
                    .basic_ack(ack.delivery_tag, BasicAckOptions { multiple: true })
                    .await
            }
            Settlement::Requeue => {
                session
                    .channel
                    .basic_nack(
                        ack.delivery_tag,
                        BasicNackOptions {
                            multiple: true,
                            requeue: true,
                        },
                    )
                    .await
            }
        };

        if result.is_err() {
            *slot = None;
        }
        result.map_err(EventingError::from)
    }
}

fn message_properties(message: &OutgoingMessage) -> BasicProperties {
    let properties = BasicProperties::default()
        .with_type(ShortString::from(message.kind().to_string()))
        .with_message_id(ShortString::from(message.message_id().to_string()))
        .with_content_type(ShortString::from("application/json".to_string()));
    if message.persistent() {
        properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE)
    } else {
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::{Event, EventHeader};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Archived {
        #[serde(flatten)]
        header: EventHeader,
    }

    impl Event for Archived {
        const KIND: &'static str = "ArchivedEvent";

        fn header(&self) -> &EventHeader {
            &self.header
        }
    }

    #[test]
    fn properties_carry_type_id_and_persistence() {
        let message = OutgoingMessage::from_event(&Archived {
            header: EventHeader::with_id("a1"),
        })
        .unwrap();
        let properties = message_properties(&message);

        assert_eq!(properties.kind().as_ref().map(|s| s.as_str()), Some("ArchivedEvent"));
        assert_eq!(properties.message_id().as_ref().map(|s| s.as_str()), Some("a1"));
        assert_eq!(*properties.delivery_mode(), Some(PERSISTENT_DELIVERY_MODE));
    }
}
