use anyhow::Result as AnyResult;
use serde::{Deserialize, Serialize};
use stayin_eventing::config::{ConsumerConfig, FatalPolicy};
use stayin_eventing::domain_event::{Event, EventHeader};
use stayin_eventing::error::EventingError;
use stayin_eventing::domain_event::OutgoingMessage;
use stayin_eventing::error::EventingResult;
use stayin_eventing::eventing::{
    AckHandle, Catalog, ConsumerState, CycleOutcome, EventBus, EventBusExt, EventConsumer,
    EventHandler, InMemoryEventBus, PendingBatch, Settlement,
};
use stayin_eventing::persist::{InMemoryLedger, InMemoryLedgerWork};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Pinged {
    #[serde(flatten)]
    header: EventHeader,
    target: String,
}

impl Event for Pinged {
    const KIND: &'static str = "PingedEvent";

    fn header(&self) -> &EventHeader {
        &self.header
    }
}

fn pinged(id: &str, target: &str) -> Pinged {
    Pinged {
        header: EventHeader::with_id(id),
        target: target.to_string(),
    }
}

/// 记录副作用；`flaky` 目标在前 `failures` 次调用时失败，`stall` 目标永不返回
#[derive(Clone, Default)]
struct PingHandler {
    calls: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl EventHandler<Pinged, InMemoryLedgerWork> for PingHandler {
    async fn handle(&self, event: Pinged, work: &mut InMemoryLedgerWork) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if event.target == "stall" {
            std::future::pending::<()>().await;
        }
        if event.target == "flaky"
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            anyhow::bail!("downstream not ready");
        }
        work.record_effect(format!("ping:{}", event.target));
        Ok(())
    }
}

struct Fixture {
    bus: Arc<InMemoryEventBus>,
    ledger: InMemoryLedger,
    handler: PingHandler,
}

impl Fixture {
    fn new() -> Self {
        Self {
            bus: Arc::new(InMemoryEventBus::new("stayin-test")),
            ledger: InMemoryLedger::new(),
            handler: PingHandler::default(),
        }
    }

    fn consumer(&self, config: ConsumerConfig) -> Arc<EventConsumer<InMemoryLedger>> {
        let catalog = Catalog::new();
        catalog
            .register::<Pinged, _>(self.handler.clone())
            .expect("register PingedEvent");

        Arc::new(
            EventConsumer::builder()
                .event_bus(self.bus.clone())
                .store(Arc::new(self.ledger.clone()))
                .catalog(Arc::new(catalog))
                .config(config)
                .build(),
        )
    }

    fn calls(&self) -> usize {
        self.handler.calls.load(Ordering::SeqCst)
    }
}

fn fast(policy: FatalPolicy) -> ConsumerConfig {
    ConsumerConfig::builder()
        .poll_interval(Duration::from_millis(10))
        .fatal_policy(policy)
        .build()
}

async fn eventually(mut condition: impl FnMut() -> bool) -> AnyResult<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn published_event_is_applied_once_and_acknowledged() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());

    assert!(fx.bus.publish(&pinged("u1", "alice")).await);
    let report = consumer.run_cycle().await?;

    assert_eq!(report.outcome, CycleOutcome::Committed);
    assert_eq!((report.fetched, report.applied, report.skipped), (1, 1, 0));
    assert!(fx.ledger.contains("u1"));
    assert_eq!(fx.ledger.effects(), vec!["ping:alice".to_string()]);
    assert_eq!(fx.bus.ready_len() + fx.bus.unacked_len(), 0);
    Ok(())
}

#[tokio::test]
async fn redelivered_event_is_a_no_op() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());
    let event = pinged("u1", "alice");

    fx.bus.publish(&event).await;
    consumer.run_cycle().await?;
    fx.bus.publish(&event).await;
    let report = consumer.run_cycle().await?;

    assert_eq!(report.outcome, CycleOutcome::Committed);
    assert_eq!((report.applied, report.skipped), (0, 1));
    assert_eq!(fx.calls(), 1);
    assert_eq!(fx.ledger.len(), 1);
    assert_eq!(fx.bus.ready_len(), 0);
    Ok(())
}

#[tokio::test]
async fn duplicate_inside_one_batch_is_applied_once() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());
    let event = pinged("u1", "alice");

    fx.bus.publish(&event).await;
    fx.bus.publish(&event).await;
    let report = consumer.run_cycle().await?;

    assert_eq!((report.fetched, report.applied, report.skipped), (2, 1, 1));
    assert_eq!(fx.ledger.effects().len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_commit_redelivers_and_applies_exactly_once() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());
    fx.ledger.fail_next_commits(1);

    fx.bus.publish(&pinged("u1", "alice")).await;
    let report = consumer.run_cycle().await?;
    assert_eq!(report.outcome, CycleOutcome::Abandoned);
    assert!(fx.ledger.is_empty());
    assert_eq!(fx.bus.ready_len(), 1);

    let report = consumer.run_cycle().await?;
    assert_eq!(report.outcome, CycleOutcome::Committed);
    assert!(fx.ledger.contains("u1"));
    assert_eq!(fx.ledger.effects(), vec!["ping:alice".to_string()]);
    Ok(())
}

#[tokio::test]
async fn handler_failure_abandons_the_whole_batch() -> AnyResult<()> {
    let fx = Fixture::new();
    fx.handler.failures.store(1, Ordering::SeqCst);
    let consumer = fx.consumer(ConsumerConfig::default());

    fx.bus.publish(&pinged("e1", "alice")).await;
    fx.bus.publish(&pinged("e2", "flaky")).await;

    let report = consumer.run_cycle().await?;
    assert_eq!(report.outcome, CycleOutcome::Abandoned);
    assert!(fx.ledger.is_empty());
    assert!(fx.ledger.effects().is_empty());
    assert_eq!(fx.bus.ready_len(), 2);

    let report = consumer.run_cycle().await?;
    assert_eq!(report.outcome, CycleOutcome::Committed);
    assert_eq!(
        fx.ledger.effects(),
        vec!["ping:alice".to_string(), "ping:flaky".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn decode_failure_mid_batch_commits_nothing() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());

    fx.bus.publish(&pinged("e1", "alice")).await;
    fx.bus
        .push_raw(&br#"{"EventId":"e2","Target":42}"#[..], Some(Pinged::KIND), Some("e2"));
    fx.bus.publish(&pinged("e3", "carol")).await;

    let err = consumer.run_cycle().await.unwrap_err();
    assert!(matches!(err, EventingError::Decode { .. }));
    assert!(!fx.ledger.contains("e1"));
    assert!(!fx.ledger.contains("e3"));
    assert!(fx.ledger.effects().is_empty());
    assert_eq!(fx.bus.ready_len(), 3);
    assert_eq!(fx.bus.unacked_len(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_kind_is_reported_and_never_consumed() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(ConsumerConfig::default());
    fx.bus
        .push_raw(&br#"{"EventId":"m1"}"#[..], Some("MysteryEvent"), Some("m1"));

    for _ in 0..2 {
        let err = consumer.run_cycle().await.unwrap_err();
        assert!(matches!(err, EventingError::UnknownKind { ref kind } if kind == "MysteryEvent"));
    }
    assert!(!fx.ledger.contains("m1"));
    assert_eq!(fx.bus.ready_len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_broker_yields_idle_cycles_and_loop_recovers() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Halt));
    fx.bus.set_unreachable(true);

    let report = consumer.run_cycle().await?;
    assert_eq!(report.outcome, CycleOutcome::Idle);
    assert!(fx.ledger.is_empty());

    let handle = consumer.clone().start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ne!(handle.state(), ConsumerState::Stopped);

    fx.bus.set_unreachable(false);
    assert!(fx.bus.publish(&pinged("u1", "alice")).await);
    eventually(|| fx.ledger.contains("u1")).await?;

    handle.shutdown();
    handle.join().await?;
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_sleep_stops_the_loop() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(
        ConsumerConfig::builder()
            .poll_interval(Duration::from_secs(3600))
            .build(),
    );
    fx.bus.publish(&pinged("u1", "alice")).await;

    let handle = consumer.clone().start();
    handle
        .watch_state()
        .wait_for(|state| *state == ConsumerState::Sleeping)
        .await?;
    assert!(fx.ledger.contains("u1"));

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle.join()).await??;
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn halt_policy_stops_on_contract_drift() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Halt));
    fx.bus
        .push_raw(&br#"{"EventId":"m1"}"#[..], Some("MysteryEvent"), Some("m1"));

    let handle = consumer.clone().start();
    let err = tokio::time::timeout(Duration::from_secs(2), handle.join())
        .await?
        .unwrap_err();

    assert!(matches!(err, EventingError::UnknownKind { .. }));
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(fx.bus.ready_len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn requeue_policy_keeps_polling_after_contract_drift() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Requeue));
    fx.bus
        .push_raw(&br#"{"EventId":"m1"}"#[..], Some("MysteryEvent"), Some("m1"));

    let handle = consumer.clone().start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_ne!(handle.state(), ConsumerState::Stopped);
    assert!(fx.ledger.is_empty());

    handle.shutdown();
    handle.join().await?;
    assert_eq!(fx.bus.ready_len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_mid_batch_rolls_back_and_requeues() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Halt));
    fx.bus.publish(&pinged("e1", "alice")).await;
    fx.bus.publish(&pinged("e2", "stall")).await;

    let handle = consumer.clone().start();
    eventually(|| fx.calls() == 2).await?;
    assert_eq!(handle.state(), ConsumerState::Processing);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle.join()).await??;

    assert!(fx.ledger.is_empty());
    assert!(fx.ledger.effects().is_empty());
    assert_eq!(fx.bus.ready_len(), 2);
    assert_eq!(fx.bus.unacked_len(), 0);
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    Ok(())
}

#[tokio::test]
async fn shutdown_before_first_poll_leaves_the_queue_untouched() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Halt));
    fx.bus.publish(&pinged("e1", "alice")).await;

    let handle = consumer.clone().start();
    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle.join()).await??;

    assert_eq!(fx.calls(), 0);
    assert!(fx.ledger.is_empty());
    assert_eq!(fx.bus.ready_len(), 1);
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_wait_keeps_the_halt_error_for_join() -> AnyResult<()> {
    let fx = Fixture::new();
    let consumer = fx.consumer(fast(FatalPolicy::Halt));
    let mut handle = consumer.clone().start();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(30)) => {}
        result = handle.wait() => anyhow::bail!("consumer stopped early: {result:?}"),
    }

    fx.bus
        .push_raw(&br#"{"EventId":"m1"}"#[..], Some("MysteryEvent"), Some("m1"));
    let mut state = handle.watch_state();
    tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|state| *state == ConsumerState::Stopped),
    )
    .await??;

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, EventingError::UnknownKind { ref kind } if kind == "MysteryEvent"));
    Ok(())
}

/// 拉取永不返回的总线
struct StalledBus {
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl EventBus for StalledBus {
    fn queue_name(&self) -> &str {
        "stalled"
    }

    async fn publish_message(&self, _message: &OutgoingMessage) -> EventingResult<()> {
        Ok(())
    }

    async fn fetch_pending(&self) -> EventingResult<PendingBatch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn settle(&self, _ack: AckHandle, _settlement: Settlement) -> EventingResult<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_during_fetch_stops_the_loop() -> AnyResult<()> {
    let bus = Arc::new(StalledBus {
        fetches: AtomicUsize::new(0),
    });
    let ledger = InMemoryLedger::new();
    let consumer = Arc::new(
        EventConsumer::builder()
            .event_bus(bus.clone())
            .store(Arc::new(ledger.clone()))
            .catalog(Arc::new(Catalog::new()))
            .config(fast(FatalPolicy::Halt))
            .build(),
    );

    let handle = consumer.clone().start();
    eventually(|| bus.fetches.load(Ordering::SeqCst) == 1).await?;
    assert_eq!(handle.state(), ConsumerState::Polling);

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle.join()).await??;
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert!(ledger.is_empty());
    Ok(())
}
