use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 事件载荷需要满足的通用能力边界
///
/// `KIND` 与传输层的 `type` 属性一一对应，也是目录中的注册键。
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 事件类型标识（形如 `UserCreatedEvent`）
    const KIND: &'static str;

    /// 公共事件头
    fn header(&self) -> &EventHeader;

    /// 事件唯一标识，由生产者生成
    fn event_id(&self) -> &str {
        self.header().event_id()
    }

    /// 事件发布时间
    fn published_at(&self) -> DateTime<Utc> {
        self.header().published_time()
    }
}

/// 所有事件共享的事件头，序列化时展开到载荷顶层
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventHeader {
    event_id: String,
    published_time: DateTime<Utc>,
}

impl EventHeader {
    /// 生成新的事件头：随机 UUID + 当前时间
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            published_time: Utc::now(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn published_time(&self) -> DateTime<Utc> {
        self.published_time
    }
}

impl Default for EventHeader {
    fn default() -> Self {
        Self::new()
    }
}
