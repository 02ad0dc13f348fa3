//! 事件消费内核统一错误定义
//!
//! 按处理方式划分：
//! - 瞬时错误（传输不可达、存储冲突、处理器失败）：记录日志，放弃本轮批次，下个周期重试；
//! - 致命错误（未知事件类型、载荷解码失败）：生产者与消费者契约漂移，必须显式上报，不得吞掉。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventingError {
    // --- 序列化/目录 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("decode failed: kind={kind}, reason={reason}")]
    Decode { kind: String, reason: String },
    #[error("unknown event kind: {kind}")]
    UnknownKind { kind: String },
    #[error("event kind already registered: {kind}")]
    DuplicateKind { kind: String },
    #[error("event handler error: kind={kind}, reason={reason}")]
    Handler { kind: String, reason: String },

    // --- 传输 ---
    #[error("broker error: {reason}")]
    Broker { reason: String },

    // --- 存储 ---
    #[error("store error: {reason}")]
    Store { reason: String },
    #[error("store conflict: {reason}")]
    Conflict { reason: String },

    // --- 运行时/配置 ---
    #[error("invalid config: {reason}")]
    Config { reason: String },
    #[error("runtime error: {reason}")]
    Runtime { reason: String },
}

impl EventingError {
    pub fn broker(reason: impl Into<String>) -> Self {
        Self::Broker {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// 契约漂移类错误：重试无法恢复
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownKind { .. } | Self::Decode { .. })
    }

    /// 可在下个周期重试的错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Broker { .. } | Self::Store { .. } | Self::Conflict { .. } | Self::Handler { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type EventingResult<T> = Result<T, EventingError>;

// ---- Cross-crate conversions for infrastructure convenience ----

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for EventingError {
    fn from(err: sqlx::Error) -> Self {
        // 23505 unique_violation / 40001 serialization_failure / 40P01 deadlock_detected
        let conflict = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| matches!(&*code, "23505" | "40001" | "40P01"));

        if conflict {
            EventingError::Conflict {
                reason: err.to_string(),
            }
        } else {
            EventingError::Store {
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for EventingError {
    fn from(err: lapin::Error) -> Self {
        EventingError::Broker {
            reason: err.to_string(),
        }
    }
}
