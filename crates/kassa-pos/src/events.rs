//! # Events
//!
//! Outbound notifications and audit records, published after a financial
//! transaction commits and delivered in the background.
//!
//! ## Delivery Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Event Delivery                                  │
//! │                                                                         │
//! │  create_sale / refund_sale / close_shift / record_payment ...           │
//! │       │ tx.commit()                                                     │
//! │       ▼                                                                 │
//! │  EventPublisher::publish ── try_send ──► bounded mpsc channel           │
//! │       │ full or closed: warn! and drop                 │                │
//! │       ▼                                                ▼                │
//! │  operation returns Ok                        EventDispatcher task       │
//! │                                                        │                │
//! │                                   ┌────────────────────┼────────────┐   │
//! │                                   ▼                    ▼            ▼   │
//! │                              TracingSink        AuditLogSink   MemorySink│
//! │                              (info! log)        (audit_log)    (tests)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Publishing never blocks and never fails the operation that published.
//! A sink error is logged and the next sink still runs.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use kassa_core::{Actor, AuditEntry, Money, Quantity, Role};
use kassa_db::Database;

use crate::error::PosResult;

// =============================================================================
// Event Types
// =============================================================================

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// Every staff member with this role.
    Role(Role),
    /// A specific client.
    Client(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// Stock fell below the store threshold.
    LowStock {
        product_id: String,
        product_name: String,
        stock: Quantity,
        threshold: Quantity,
    },
    ShiftClosed {
        shift_id: String,
        cashier_id: String,
        closing_balance: Money,
        expected_balance: Money,
        difference: Money,
    },
    DebtSale {
        sale_id: String,
        receipt_number: String,
        amount: Money,
        balance: Money,
        due_date: Option<NaiveDate>,
    },
    DebtPayment {
        amount: Money,
        balance: Money,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PosEvent {
    Notification {
        recipient: Recipient,
        kind: NotificationKind,
    },
    Audit {
        actor_id: String,
        action: String,
        detail: String,
    },
}

impl PosEvent {
    pub fn notify(recipient: Recipient, kind: NotificationKind) -> Self {
        PosEvent::Notification { recipient, kind }
    }

    pub fn audit(actor: &Actor, action: &str, detail: impl Into<String>) -> Self {
        PosEvent::Audit {
            actor_id: actor.id.clone(),
            action: action.to_string(),
            detail: detail.into(),
        }
    }

    /// Audit action code, if this is an audit record.
    pub fn action(&self) -> Option<&str> {
        match self {
            PosEvent::Audit { action, .. } => Some(action),
            PosEvent::Notification { .. } => None,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// A destination for published events (bot, SMS gateway, audit table).
#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &PosEvent) -> PosResult<()>;
}

/// Logs every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn deliver(&self, event: &PosEvent) -> PosResult<()> {
        match event {
            PosEvent::Notification { recipient, kind } => {
                info!(?recipient, ?kind, "Notification");
            }
            PosEvent::Audit {
                actor_id,
                action,
                detail,
            } => {
                info!(actor_id = %actor_id, action = %action, detail = %detail, "Audit");
            }
        }
        Ok(())
    }
}

/// Persists audit events into `audit_log`. Ignores notifications.
#[derive(Debug, Clone)]
pub struct AuditLogSink {
    db: Database,
}

impl AuditLogSink {
    pub fn new(db: Database) -> Self {
        AuditLogSink { db }
    }
}

#[async_trait]
impl EventSink for AuditLogSink {
    fn name(&self) -> &'static str {
        "audit_log"
    }

    async fn deliver(&self, event: &PosEvent) -> PosResult<()> {
        if let PosEvent::Audit {
            actor_id,
            action,
            detail,
        } = event
        {
            let entry = AuditEntry {
                id: Uuid::new_v4().to_string(),
                actor_id: actor_id.clone(),
                action: action.clone(),
                detail: detail.clone(),
                created_at: Utc::now(),
            };
            self.db.audit().insert(&entry).await?;
        }
        Ok(())
    }
}

/// Keeps every event in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<PosEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PosEvent> {
        self.events.lock().await.clone()
    }

    pub async fn notifications(&self) -> Vec<NotificationKind> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                PosEvent::Notification { kind, .. } => Some(kind.clone()),
                PosEvent::Audit { .. } => None,
            })
            .collect()
    }

    pub async fn actions(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| e.action().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn deliver(&self, event: &PosEvent) -> PosResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

// =============================================================================
// Publisher
// =============================================================================

/// Fire-and-forget handle given to every service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<PosEvent>,
}

impl EventPublisher {
    pub fn publish(&self, event: PosEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(?event, "Event dispatcher stopped, dropping event");
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = PosEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Background task fanning events out to the sinks.
pub struct EventDispatcher {
    rx: mpsc::Receiver<PosEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    sinks: Vec<Arc<dyn EventSink>>,
}

/// Stops the dispatcher.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawns the dispatcher task and returns the publisher feeding it.
    pub fn spawn(
        capacity: usize,
        sinks: Vec<Arc<dyn EventSink>>,
    ) -> (EventPublisher, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = EventDispatcher {
            rx,
            shutdown_rx,
            sinks,
        };
        let join = tokio::spawn(dispatcher.run());

        (EventPublisher { tx }, DispatcherHandle { shutdown_tx, join })
    }

    async fn run(mut self) {
        info!(sinks = self.sinks.len(), "Event dispatcher starting");

        loop {
            tokio::select! {
                Some(event) = self.rx.recv() => {
                    self.dispatch(&event).await;
                }

                _ = self.shutdown_rx.recv() => {
                    self.drain().await;
                    break;
                }

                else => break,
            }
        }

        info!("Event dispatcher stopped");
    }

    /// Delivers what is already queued, refusing new events.
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0usize;
        while let Some(event) = self.rx.recv().await {
            self.dispatch(&event).await;
            drained += 1;
        }
        debug!(drained, "Event queue drained");
    }

    async fn dispatch(&self, event: &PosEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event).await {
                warn!(sink = sink.name(), error = %e, "Event sink failed");
            }
        }
    }
}

impl DispatcherHandle {
    /// Drains queued events, then waits for the task to finish.
    pub async fn shutdown(self) {
        // The task may already be gone; the join below covers both cases.
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            warn!(error = %e, "Event dispatcher task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosError;
    use kassa_db::DbConfig;

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _event: &PosEvent) -> PosResult<()> {
            Err(PosError::ShuttingDown)
        }
    }

    fn audit(action: &str) -> PosEvent {
        let actor = Actor::new("u1", "Dilnoza", Role::Cashier);
        PosEvent::audit(&actor, action, "detail")
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_to_every_sink() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let (publisher, handle) = EventDispatcher::spawn(
            16,
            vec![
                Arc::new(first.clone()),
                Arc::new(FailingSink),
                Arc::new(second.clone()),
            ],
        );

        publisher.publish(audit("sale.create"));
        publisher.publish(audit("sale.refund"));
        publisher.publish(PosEvent::notify(
            Recipient::Role(Role::Admin),
            NotificationKind::LowStock {
                product_id: "p1".into(),
                product_name: "Tuz".into(),
                stock: Quantity::from_units(4),
                threshold: Quantity::from_units(5),
            },
        ));
        handle.shutdown().await;

        assert_eq!(first.actions().await, vec!["sale.create", "sale.refund"]);
        assert_eq!(second.events().await.len(), 3);
        assert_eq!(second.notifications().await.len(), 1);

        // Dispatcher gone: publishing is a logged no-op.
        publisher.publish(audit("late"));
        assert_eq!(first.events().await.len(), 3);
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let sink = MemorySink::new();
        let (publisher, handle) = EventDispatcher::spawn(1, vec![Arc::new(sink.clone())]);

        for _ in 0..50 {
            publisher.publish(audit("burst"));
        }
        handle.shutdown().await;

        let delivered = sink.events().await.len();
        assert!(delivered >= 1 && delivered <= 50);
    }

    #[tokio::test]
    async fn test_audit_log_sink_persists_audit_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sink = AuditLogSink::new(db.clone());

        sink.deliver(&audit("shift.open")).await.unwrap();
        sink.deliver(&PosEvent::notify(
            Recipient::Client("c1".into()),
            NotificationKind::DebtPayment {
                amount: Money::from_som(20_000),
                balance: Money::from_som(-30_000),
            },
        ))
        .await
        .unwrap();

        let rows = db.audit().list_recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "shift.open");
        assert_eq!(rows[0].actor_id, "u1");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(PosEvent::notify(
            Recipient::Client("c1".into()),
            NotificationKind::DebtPayment {
                amount: Money::from_som(1),
                balance: Money::zero(),
            },
        ))
        .unwrap();
        assert_eq!(json["event"], "notification");
        assert_eq!(json["recipient"]["type"], "client");
        assert_eq!(json["kind"]["kind"], "debt_payment");
    }
}
