//! 领域事件（Event）与传输信封（Envelope）
//!
//! 事件是不可变的领域事实，只携带数据；如何改变持久化状态由目录（`Catalog`）中登记的处理器决定。
//! 信封是事件在 Broker 上的在途形态，生命周期不超过一次轮询周期。

mod envelope;
mod event;

pub use envelope::{Envelope, OutgoingMessage};
pub use event::{Event, EventHeader};
