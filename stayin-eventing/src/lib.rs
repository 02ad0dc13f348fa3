//! 事件消费内核（stayin-eventing）
//!
//! 提供事件驱动消费端的通用构件：
//! - 领域事件（`domain_event`）：事件契约、公共事件头与传输信封
//! - 事件系统（`eventing`）：总线协议、类型目录、分发器与消费循环
//! - 持久化契约（`persist`）：已消费事件账本与按周期开启的工作单元
//! - 运行配置（`config`）与统一错误（`error`）
//!
//! 本 crate 不命名任何具体事件，事件类型与处理器由上层应用在启动时注册到 `Catalog`。
//! 传输与存储实现均可替换：内存版用于测试，AMQP（`amqp`）与 Postgres（`infra-sqlx`）位于特性之后。
//!
//! 典型用法：
//! 1. 为事件实现 `Event`，为处理器实现 `EventHandler`；
//! 2. 构建 `Catalog` 并逐个 `register`；
//! 3. 选择 `EventBus` 与 `DataStore` 实现，构建 `EventConsumer` 并 `start`；
//! 4. 退出时调用 `ConsumerHandle::shutdown` 并 `join`。
//!
pub mod config;
pub mod domain_event;
pub mod error;
pub mod eventing;
pub mod persist;
