//! Postgres 账本（`infra-sqlx`）
//!
//! 账本表 `consumed_events` 以 `event_id` 为主键；所有读写都在调用方持有的事务连接上执行，
//! 因此消费记录与事件副作用处于同一个事务中，一起提交或一起回滚。
//!
//! 错误映射：唯一键冲突（23505）、序列化失败（40001）与死锁（40P01）视为 `Conflict`，
//! 其余数据库错误视为 `Store`，两者都是瞬时错误，由消费循环在下个周期重试。
use super::{ConsumedEventLedger, DataStore, UnitOfWork};
use crate::error::EventingResult as Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::instrument;

pub const CONSUMED_EVENTS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS consumed_events (
    event_id    TEXT PRIMARY KEY,
    consumed_at TIMESTAMPTZ NOT NULL
)
"#;

/// 确保账本表存在（幂等）
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CONSUMED_EVENTS_DDL).execute(pool).await?;
    Ok(())
}

/// 在给定事务连接上查询账本
pub async fn has_consumed(conn: &mut PgConnection, event_id: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM consumed_events WHERE event_id = $1)")
            .bind(event_id)
            .fetch_one(conn)
            .await?;
    Ok(exists)
}

const RECORD_CONSUMED_SQL: &str =
    "INSERT INTO consumed_events (event_id, consumed_at) VALUES ($1, $2)";

/// 在给定事务连接上追加消费记录
///
/// 重复 ID 触发唯一键冲突（`Conflict`）：另一个消费者已提交同一事件时，本事务随之失败，
/// 整批在下个周期重新投递并在账本中命中。
pub async fn record_consumed(
    conn: &mut PgConnection,
    event_id: &str,
    consumed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(RECORD_CONSUMED_SQL)
        .bind(event_id)
        .bind(consumed_at)
        .execute(conn)
        .await?;
    Ok(())
}

/// 仅维护账本的 Postgres 存储；应用层存储在同一事务上叠加自身的副作用表
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataStore for PgLedgerStore {
    type Work = PgLedgerWork;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Work> {
        Ok(PgLedgerWork {
            tx: self.pool.begin().await?,
        })
    }
}

pub struct PgLedgerWork {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerWork {
    /// 当前事务连接，供处理器执行副作用语句
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl ConsumedEventLedger for PgLedgerWork {
    async fn has_consumed(&mut self, event_id: &str) -> Result<bool> {
        has_consumed(&mut self.tx, event_id).await
    }

    async fn record_consumed(&mut self, event_id: &str, consumed_at: DateTime<Utc>) -> Result<()> {
        record_consumed(&mut self.tx, event_id, consumed_at).await
    }
}

#[async_trait]
impl UnitOfWork for PgLedgerWork {
    #[instrument(skip(self), err)]
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
