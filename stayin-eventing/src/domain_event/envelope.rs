use super::Event;
use crate::error::EventingResult;
use bon::Builder;

/// 消费端观察到的在途消息：原始载荷 + 类型标识 + Broker 消息 ID + 投递标签
#[derive(Debug, Clone, Builder)]
pub struct Envelope {
    payload: Vec<u8>,
    /// 传输属性 `type`，对应目录中的事件类型
    kind: Option<String>,
    /// 传输属性 `message_id`，等于事件 ID
    message_id: Option<String>,
    /// Broker 分配的投递标签，同一通道内单调递增
    delivery_tag: u64,
}

impl Envelope {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }
}

/// 待发布的消息：序列化后的事件与传输元数据
#[derive(Debug, Clone, Builder)]
pub struct OutgoingMessage {
    payload: Vec<u8>,
    #[builder(into)]
    kind: String,
    #[builder(into)]
    message_id: String,
    #[builder(default = true)]
    persistent: bool,
}

impl OutgoingMessage {
    /// 序列化事件：`kind` 取事件类型，`message_id` 取事件 ID，始终持久化
    pub fn from_event<E: Event>(event: &E) -> EventingResult<Self> {
        let payload = serde_json::to_vec(event)?;

        Ok(Self::builder()
            .payload(payload)
            .kind(E::KIND)
            .message_id(event.event_id())
            .build())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }
}
