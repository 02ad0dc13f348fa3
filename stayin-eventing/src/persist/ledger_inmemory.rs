//! 内存版账本（InMemoryLedger）
//!
//! 满足 `DataStore` 协议的轻量实现：
//! - 工作单元缓冲消费记录与副作用日志，`commit` 时在同一把锁内落盘；
//! - 同一工作单元内已缓冲的记录对后续 `has_consumed` 可见，批内重复投递同样是空操作；
//! - 可注入提交失败，用于验证“提交失败后消息重新投递”。
//!
//! 典型用途：测试环境、示例与本地开发。应用层的内存存储复用 `LedgerBuffer` 与 `commit_with`。
use super::{ConsumedEventLedger, ConsumedEventRecord, DataStore, UnitOfWork};
use crate::error::{EventingError, EventingResult as Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    records: Arc<Mutex<BTreeMap<String, DateTime<Utc>>>>,
    effects: Arc<Mutex<Vec<String>>>,
    commit_failures: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的记录中是否包含该事件
    pub fn contains(&self, event_id: &str) -> bool {
        self.lock_records().contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    /// 已提交的副作用日志（按提交顺序）
    pub fn effects(&self) -> Vec<String> {
        self.effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 让接下来的 `n` 次提交以存储冲突失败
    pub fn fail_next_commits(&self, n: usize) {
        self.commit_failures.store(n, Ordering::SeqCst);
    }

    pub fn buffer(&self) -> LedgerBuffer {
        LedgerBuffer {
            ledger: self.clone(),
            pending: Vec::new(),
        }
    }

    /// 原子提交：在持有账本锁期间执行 `apply`，随后写入缓冲的记录
    ///
    /// 注入的失败在任何写入之前返回，`apply` 不会被调用。
    pub fn commit_with(&self, buffer: LedgerBuffer, apply: impl FnOnce()) -> Result<()> {
        if self.take_commit_failure() {
            return Err(EventingError::Conflict {
                reason: "injected commit failure".to_string(),
            });
        }

        let mut records = self.lock_records();
        apply();
        for record in buffer.pending {
            records.entry(record.event_id).or_insert(record.consumed_at);
        }
        Ok(())
    }

    fn take_commit_failure(&self) -> bool {
        self.commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn lock_records(&self) -> MutexGuard<'_, BTreeMap<String, DateTime<Utc>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 工作单元内尚未提交的消费记录
pub struct LedgerBuffer {
    ledger: InMemoryLedger,
    pending: Vec<ConsumedEventRecord>,
}

impl LedgerBuffer {
    /// 已提交或已在本单元中缓冲
    pub fn contains(&self, event_id: &str) -> bool {
        self.pending.iter().any(|r| r.event_id == event_id) || self.ledger.contains(event_id)
    }

    pub fn push(&mut self, event_id: &str, consumed_at: DateTime<Utc>) {
        self.pending.push(ConsumedEventRecord {
            event_id: event_id.to_string(),
            consumed_at,
        });
    }
}

#[async_trait]
impl DataStore for InMemoryLedger {
    type Work = InMemoryLedgerWork;

    async fn begin(&self) -> Result<Self::Work> {
        Ok(InMemoryLedgerWork {
            buffer: self.buffer(),
            effects: Vec::new(),
        })
    }
}

/// 仅包含账本与副作用日志的工作单元
pub struct InMemoryLedgerWork {
    buffer: LedgerBuffer,
    effects: Vec<String>,
}

impl InMemoryLedgerWork {
    /// 记录一条副作用，随工作单元一起提交
    pub fn record_effect(&mut self, effect: impl Into<String>) {
        self.effects.push(effect.into());
    }}

#[async_trait]
impl ConsumedEventLedger for InMemoryLedgerWork {
    async fn has_consumed(&mut self, event_id: &str) -> Result<bool> {
        Ok(self.buffer.contains(event_id))
    }

    async fn record_consumed(&mut self, event_id: &str, consumed_at: DateTime<Utc>) -> Result<()> {
        self.buffer.push(event_id, consumed_at);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryLedgerWork {
    async fn commit(self) -> Result<()> {
        let Self { buffer, effects } = self;
        let ledger = buffer.ledger.clone();
        let journal = ledger.effects.clone();

        ledger.commit_with(buffer, move || {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(effects);
        })
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
