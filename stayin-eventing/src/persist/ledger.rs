use crate::error::EventingResult as Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 账本中的一行：某个事件曾被应用过
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedEventRecord {
    pub event_id: String,
    pub consumed_at: DateTime<Utc>,
}

/// 已消费事件账本：判断“是否已应用”的唯一依据
#[async_trait]
pub trait ConsumedEventLedger: Send {
    /// 事件是否已被应用（包含当前工作单元中尚未提交的记录）
    async fn has_consumed(&mut self, event_id: &str) -> Result<bool>;

    /// 在当前工作单元中缓冲一条消费记录，`commit` 后生效
    async fn record_consumed(&mut self, event_id: &str, consumed_at: DateTime<Utc>) -> Result<()>;
}

/// 工作单元：账本写入与副作用变更一起提交或一起丢弃
#[async_trait]
pub trait UnitOfWork: ConsumedEventLedger {
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// 数据存储：每个轮询周期开启一个工作单元，不跨周期共享
#[async_trait]
pub trait DataStore: Send + Sync {
    type Work: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Work>;
}
