//! 消费循环（EventConsumer）
//!
//! 单队列的长驻任务，按周期编排“拉取 → 处理 → 提交 → 确认 → 休眠”：
//! - 每个周期拉取队列中的全部消息，在一个工作单元内按到达顺序逐条分发；
//! - 全部成功才提交，提交成功后累计确认整批；任何失败都回滚并让整批重新入队；
//! - 致命错误（未知类型、解码失败）按 `FatalPolicy` 停止循环或记录后继续；
//! - 拉取、逐条应用与休眠期间都会观察取消令牌；提交开始后不再观察取消。
//!
//! 状态通过 `watch` 通道发布，由 `ConsumerHandle::state` 读取。
//!
use super::bus::{EventBus, EventBusExt, PendingBatch, Settlement};
use super::catalog::Catalog;
use super::dispatcher::{ApplyOutcome, Dispatcher};
use crate::config::{ConsumerConfig, FatalPolicy};
use crate::error::{EventingError, EventingResult as Result};
use crate::persist::{DataStore, UnitOfWork};
use bon::Builder;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::event_consumer_builder::{IsUnset, SetDispatcher, State as BuilderState};

/// 消费循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Polling,
    Processing,
    Committing,
    Sleeping,
    Stopped,
}

/// 一个周期的结束方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 队列为空，未开启工作单元
    #[default]
    Idle,
    /// 已提交并确认
    Committed,
    /// 已回滚，整批重新入队，下个周期重试
    Abandoned,
    /// 拉取或处理途中被取消，已取回的消息重新入队
    Cancelled,
}

/// 周期报告；未提交时计数只反映中止前的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub applied: usize,
    pub skipped: usize,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn idle() -> Self {
        Self::default()
    }

    fn abandoned(fetched: usize) -> Self {
        Self {
            fetched,
            outcome: CycleOutcome::Abandoned,
            ..Self::default()
        }
    }
}

/// EventConsumer：
/// - 周期性从 Bus 拉取整批消息
/// - 在 DataStore 的工作单元中逐条分发，提交后确认
#[derive(Builder)]
pub struct EventConsumer<S: DataStore> {
    event_bus: Arc<dyn EventBus>,
    store: Arc<S>,
    #[builder(setters(vis = "pub(crate)"))]
    dispatcher: Dispatcher<S::Work>,
    #[builder(default)]
    config: ConsumerConfig,
    #[builder(skip = watch::channel(ConsumerState::Idle).0)]
    state: watch::Sender<ConsumerState>,
}

impl<S: DataStore, St: BuilderState> EventConsumerBuilder<S, St> {
    /// 设置事件目录，内部包装为 `Dispatcher`
    pub fn catalog(self, catalog: Arc<Catalog<S::Work>>) -> EventConsumerBuilder<S, SetDispatcher<St>>
    where
        St::Dispatcher: IsUnset,
    {
        self.dispatcher(Dispatcher::new(catalog))
    }
}

impl<S: DataStore + 'static> EventConsumer<S> {
    /// 启动消费循环，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> ConsumerHandle {
        let token = CancellationToken::new();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run_loop(token.clone()));

        ConsumerHandle {
            token,
            state,
            task: Some(task),
        }
    }

    /// 执行一个完整周期（不可取消）；仅致命错误以 `Err` 返回
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.cycle(&CancellationToken::new()).await
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    async fn run_loop(self: Arc<Self>, token: CancellationToken) -> Result<()> {
        info!(
            queue = self.event_bus.queue_name(),
            poll_interval = ?self.config.poll_interval,
            "event consumer started"
        );

        let result = loop {
            if token.is_cancelled() {
                break Ok(());
            }

            match self.cycle(&token).await {
                Ok(report) if report.outcome == CycleOutcome::Cancelled => break Ok(()),
                Ok(_) => {}
                Err(err) => match self.config.fatal_policy {
                    FatalPolicy::Halt => {
                        error!(queue = self.event_bus.queue_name(), error = %err, "event consumer halted");
                        break Err(err);
                    }
                    FatalPolicy::Requeue => {
                        warn!(queue = self.event_bus.queue_name(), error = %err, "fatal event requeued, consumer keeps polling");
                    }
                },
            }

            self.set_state(ConsumerState::Sleeping);
            tokio::select! {
                _ = token.cancelled() => break Ok(()),
                _ = time::sleep(self.config.poll_interval) => {}
            }
        };

        self.set_state(ConsumerState::Stopped);
        info!(queue = self.event_bus.queue_name(), "event consumer stopped");
        result
    }

    async fn cycle(&self, token: &CancellationToken) -> Result<CycleReport> {
        self.set_state(ConsumerState::Polling);
        let batch = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Ok(CycleReport {
                    outcome: CycleOutcome::Cancelled,
                    ..CycleReport::default()
                });
            }
            batch = self.event_bus.get_pending() => batch,
        };
        if batch.is_empty() {
            return Ok(CycleReport::idle());
        }

        self.set_state(ConsumerState::Processing);
        let fetched = batch.len();
        let mut work = match self.store.begin().await {
            Ok(work) => work,
            Err(err) => {
                warn!(fetched, error = %err, "failed to begin unit of work, batch requeued");
                self.requeue(&batch).await;
                return Ok(CycleReport::abandoned(fetched));
            }
        };

        let mut report = CycleReport {
            fetched,
            ..CycleReport::default()
        };

        for envelope in batch.envelopes() {
            let applied = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.dispatcher.apply(envelope, &mut work) => Some(result),
            };
            let Some(result) = applied else {
                Self::discard(work).await;
                self.requeue(&batch).await;
                report.outcome = CycleOutcome::Cancelled;
                return Ok(report);
            };

            match result {
                Ok(ApplyOutcome::Applied) => report.applied += 1,
                Ok(ApplyOutcome::AlreadyConsumed) => report.skipped += 1,
                Err(err) => {
                    Self::discard(work).await;
                    self.requeue(&batch).await;

                    if err.is_fatal() {
                        return Err(err);
                    }
                    warn!(
                        fetched,
                        delivery_tag = envelope.delivery_tag(),
                        error = %err,
                        "event apply failed, batch requeued"
                    );
                    report.outcome = CycleOutcome::Abandoned;
                    return Ok(report);
                }
            }
        }

        self.set_state(ConsumerState::Committing);
        if let Err(err) = work.commit().await {
            warn!(fetched, error = %err, "commit failed, batch requeued");
            self.requeue(&batch).await;
            report.outcome = CycleOutcome::Abandoned;
            return Ok(report);
        }

        // 确认失败时消息会被重新投递，届时在账本中命中而成为空操作
        self.event_bus
            .settle_batch(&batch, Settlement::Accept)
            .await;

        info!(
            fetched,
            applied = report.applied,
            skipped = report.skipped,
            "batch committed"
        );
        report.outcome = CycleOutcome::Committed;
        Ok(report)
    }

    async fn requeue(&self, batch: &PendingBatch) {
        self.event_bus
            .settle_batch(batch, Settlement::Requeue)
            .await;
    }

    async fn discard(work: S::Work) {
        if let Err(err) = work.rollback().await {
            warn!(error = %err, "rollback failed");
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}

/// 消费循环句柄：用于优雅关闭与等待任务结束
pub struct ConsumerHandle {
    token: CancellationToken,
    state: watch::Receiver<ConsumerState>,
    task: Option<JoinHandle<Result<()>>>,
}

impl ConsumerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// 订阅状态变化
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// 等待循环结束（不会主动取消）
    ///
    /// 可在 `select!` 中使用：未完成时被丢弃不会丢失任务结果，之后的 `wait`/`join` 仍会等待它；
    /// 结果取走后再次调用立即返回 `Ok`。
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };

        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(err) => Err(EventingError::Runtime {
                reason: format!("consumer task failed: {err}"),
            }),
        }
    }

    pub async fn join(mut self) -> Result<()> {
        self.wait().await
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
