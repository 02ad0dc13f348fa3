//! 持久化契约（persist）
//!
//! 定义已消费事件账本与数据存储的工作单元：
//! - `ConsumedEventLedger`：查询/追加已应用的事件 ID；
//! - `UnitOfWork`：账本写入与事件副作用在一次提交中原子落盘；
//! - `DataStore`：为每个轮询周期开启独立的工作单元。
//!
//! 内存实现用于测试与本地开发；Postgres 实现位于 `infra-sqlx` 特性之后。
//!
mod ledger;
mod ledger_inmemory;
#[cfg(feature = "infra-sqlx")]
pub mod ledger_postgres;

pub use ledger::{ConsumedEventLedger, ConsumedEventRecord, DataStore, UnitOfWork};
pub use ledger_inmemory::{InMemoryLedger, InMemoryLedgerWork, LedgerBuffer};
