//! 事件子系统（eventing）
//!
//! 提供事件发布与消费的协议与运行时：
//! - `EventBus`：发布事件、批量拉取待消费消息、确认或重新入队；
//! - `Catalog`：事件类型到（解码器，处理器）的注册表，启动时一次性填充；
//! - `Dispatcher`：账本检查 → 解码 → 处理 → 记录，保证每个事件至多应用一次；
//! - `EventConsumer`：按周期拉取、处理、提交、确认的长驻任务，支持协作式取消。
//!
//! 该模块仅定义协议与引擎，不绑定具体传输实现；内存总线用于测试，AMQP 总线位于 `amqp` 特性之后。
//!
pub mod bus;
#[cfg(feature = "amqp")]
pub mod bus_amqp;
pub mod bus_inmemory;
pub mod catalog;
pub mod consumer;
pub mod dispatcher;

pub use bus::{AckHandle, EventBus, EventBusExt, PendingBatch, Settlement};
pub use bus_inmemory::InMemoryEventBus;
pub use catalog::{Catalog, DecodedEvent, EventHandler};
pub use consumer::{ConsumerHandle, ConsumerState, CycleOutcome, CycleReport, EventConsumer};
pub use dispatcher::{ApplyOutcome, Dispatcher};
