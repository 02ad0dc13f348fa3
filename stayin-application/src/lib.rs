//! Stayin 应用层（stayin-application）
//!
//! 在事件消费内核之上提供 Stayin 的具体内容：
//! - 事件（`events`）：用户、房源与预订服务发布的事件；
//! - 存储契约（`store`）：处理器可见的副作用操作；
//! - 处理器（`handlers`）与目录装配（`catalog`）；
//! - 存储实现：内存版（`store_inmemory`）与 Postgres 版（`store_postgres`，`infra-sqlx`）。
//!
pub mod catalog;
pub mod error;
pub mod events;
pub mod handlers;
pub mod store;
pub mod store_inmemory;
#[cfg(feature = "infra-sqlx")]
pub mod store_postgres;

pub use catalog::stayin_catalog;
pub use error::{AppError, AppResult};
pub use store_inmemory::InMemoryStayinStore;
