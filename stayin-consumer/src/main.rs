//! Stayin 事件消费进程
//!
//! 从 RabbitMQ 队列拉取事件，在 Postgres 事务中应用并记录账本，收到 Ctrl-C 后优雅退出。
//!
//! 环境变量：`DATABASE_URL`（必填）、`RABBITMQ_URI`、`RABBITMQ_QUEUE`、
//! `CONSUMER_POLL_INTERVAL_SECS`、`CONSUMER_FATAL_POLICY`、`RUST_LOG`。
mod telemetry;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use stayin_application::stayin_catalog;
use stayin_application::store_postgres::{self, PgStayinStore};
use stayin_eventing::config::{BrokerConfig, ConsumerConfig};
use stayin_eventing::eventing::EventConsumer;
use stayin_eventing::eventing::bus_amqp::AmqpEventBus;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_DB_CONNECTIONS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let broker = BrokerConfig::from_env()?;
    let config = ConsumerConfig::from_env()?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;
    store_postgres::ensure_schema(&pool).await?;

    info!(queue = %broker.queue, fatal_policy = ?config.fatal_policy, "starting stayin consumer");
    let bus = Arc::new(AmqpEventBus::new(broker));
    let consumer = Arc::new(
        EventConsumer::builder()
            .event_bus(bus.clone())
            .store(Arc::new(PgStayinStore::new(pool)))
            .catalog(Arc::new(stayin_catalog()?))
            .config(config)
            .build(),
    );

    let mut handle = consumer.start();
    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
            None
        }
        result = handle.wait() => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None => {
            handle.shutdown();
            handle.join().await
        }
    };

    if let Err(err) = bus.close().await {
        warn!(error = %err, "failed to close broker connection");
    }
    result?;
    Ok(())
}
