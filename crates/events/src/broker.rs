//! Multi-subscriber broadcast broker.
//!
//! The subscriber registry is owned by a single control loop spawned in
//! [`Broker::start`]. Every operation (subscribe, unsubscribe, publish,
//! stats, shutdown) is a [`Command`] sent over one FIFO channel and handled
//! to completion before the next one, so registry changes and broadcasts
//! are totally ordered:
//!
//! - a subscribe that has returned sees every later publish;
//! - a publish that has returned is never delivered to a later subscriber.
//!
//! Delivery never blocks the loop. Each subscriber has a bounded queue; when
//! it is full the event is dropped for that subscriber only, and a
//! subscriber that misses [`BrokerConfig::max_missed`] events in a row is
//! evicted. A subscriber whose reader has gone away is removed on the next
//! delivery attempt.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::event::TelemetryEvent;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default number of consecutive dropped events before eviction.
pub const DEFAULT_MAX_MISSED: u32 = 16;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Opaque subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tuning for the fan-out backpressure policy.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    /// Bounded delivery queue size per subscriber (minimum 1).
    pub queue_capacity: usize,
    /// Consecutive full-queue drops tolerated before a subscriber is evicted
    /// (minimum 1).
    pub max_missed: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_missed: DEFAULT_MAX_MISSED,
        }
    }
}

/// Counters maintained by the control loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Currently active subscribers.
    pub subscribers: usize,
    /// Publish commands processed.
    pub published: u64,
    /// Events placed into a subscriber queue.
    pub delivered: u64,
    /// Events dropped because a subscriber queue was full.
    pub dropped: u64,
    /// Subscribers removed for missing too many events.
    pub evicted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker control loop is not running")]
    Closed,
}

enum Command {
    Subscribe {
        reply: oneshot::Sender<(SubscriberId, mpsc::Receiver<TelemetryEvent>)>,
    },
    Unsubscribe {
        id: SubscriberId,
        ack: Option<oneshot::Sender<bool>>,
    },
    Publish {
        event: TelemetryEvent,
    },
    Stats {
        reply: oneshot::Sender<BrokerStats>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Broker handle
// ---------------------------------------------------------------------------

/// Cheaply clonable handle to the broker control loop.
#[derive(Clone)]
pub struct Broker {
    commands: mpsc::UnboundedSender<Command>,
}

impl Broker {
    /// Spawn the control loop on the current Tokio runtime.
    ///
    /// The loop runs until [`Broker::shutdown`] is called or every handle
    /// (including subscriber handles) has been dropped.
    pub fn start(config: BrokerConfig) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let control = ControlLoop::new(config, rx);
        let handle = tokio::spawn(control.run());
        (Self { commands }, handle)
    }

    /// Register a new subscriber with an empty queue.
    ///
    /// Resolves once the control loop has added it to the registry.
    pub async fn subscribe(&self) -> Result<SubscriberHandle, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { reply })
            .map_err(|_| BrokerError::Closed)?;
        let (id, queue) = rx.await.map_err(|_| BrokerError::Closed)?;

        Ok(SubscriberHandle {
            id,
            queue,
            commands: self.commands.clone(),
            released: false,
        })
    }

    /// Remove a subscriber by id and close its queue.
    ///
    /// Returns `true` if the subscriber was active. Unknown or already
    /// removed ids, and a stopped broker, are a no-op returning `false`.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        request_unsubscribe(&self.commands, id).await
    }

    /// Queue `event` for delivery to every subscriber active when the
    /// control loop reaches it. Never blocks and never fails; a stopped
    /// broker just logs the drop.
    pub fn publish(&self, event: TelemetryEvent) {
        if self.commands.send(Command::Publish { event }).is_err() {
            tracing::warn!("Broker stopped, dropping published event");
        }
    }

    /// Snapshot of the control loop counters.
    pub async fn stats(&self) -> Result<BrokerStats, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stats { reply })
            .map_err(|_| BrokerError::Closed)?;
        rx.await.map_err(|_| BrokerError::Closed)
    }

    /// Number of active subscribers.
    pub async fn subscriber_count(&self) -> Result<usize, BrokerError> {
        self.stats().await.map(|s| s.subscribers)
    }

    /// Close every subscriber queue and stop the control loop.
    ///
    /// Commands already queued ahead of the shutdown are still processed.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// `true` once the control loop has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

async fn request_unsubscribe(commands: &mpsc::UnboundedSender<Command>, id: SubscriberId) -> bool {
    let (ack, rx) = oneshot::channel();
    if commands
        .send(Command::Unsubscribe { id, ack: Some(ack) })
        .is_err()
    {
        return false;
    }
    rx.await.unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Subscriber handle
// ---------------------------------------------------------------------------

/// A registered consumer of the live stream.
///
/// Dropping the handle unsubscribes it.
pub struct SubscriberHandle {
    id: SubscriberId,
    queue: mpsc::Receiver<TelemetryEvent>,
    commands: mpsc::UnboundedSender<Command>,
    released: bool,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event in publish order, or `None` once the subscriber has been
    /// closed and its queue drained.
    pub async fn recv(&mut self) -> Option<TelemetryEvent> {
        self.queue.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<TelemetryEvent> {
        self.queue.try_recv().ok()
    }

    /// Remove this subscriber from the broker.
    ///
    /// Resolves once the control loop has removed it; no event published
    /// afterwards reaches this handle. Calling it again is a no-op that
    /// returns `false`.
    pub async fn unsubscribe(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        request_unsubscribe(&self.commands, self.id).await
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.commands.send(Command::Unsubscribe {
                id: self.id,
                ack: None,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

struct Subscriber {
    queue: mpsc::Sender<TelemetryEvent>,
    missed: u32,
}

#[derive(Debug, Clone, Copy)]
enum RemovalReason {
    Unsubscribed,
    Disconnected,
    Stalled,
}

struct ControlLoop {
    registry: HashMap<SubscriberId, Subscriber>,
    commands: mpsc::UnboundedReceiver<Command>,
    config: BrokerConfig,
    stats: BrokerStats,
}

impl ControlLoop {
    fn new(config: BrokerConfig, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        let config = BrokerConfig {
            queue_capacity: config.queue_capacity.max(1),
            max_missed: config.max_missed.max(1),
        };
        Self {
            registry: HashMap::new(),
            commands,
            config,
            stats: BrokerStats::default(),
        }
    }

    async fn run(mut self) {
        tracing::info!(
            queue_capacity = self.config.queue_capacity,
            max_missed = self.config.max_missed,
            "Broker control loop started"
        );

        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Subscribe { reply } => self.add(reply),
                Command::Unsubscribe { id, ack } => {
                    let removed = self.remove(id, RemovalReason::Unsubscribed);
                    if let Some(ack) = ack {
                        let _ = ack.send(removed);
                    }
                }
                Command::Publish { event } => self.broadcast(event),
                Command::Stats { reply } => {
                    let _ = reply.send(self.snapshot_stats());
                }
                Command::Shutdown => {
                    self.close_all();
                    break;
                }
            }
        }

        tracing::info!(
            published = self.stats.published,
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            evicted = self.stats.evicted,
            "Broker control loop stopped"
        );
    }

    fn add(&mut self, reply: oneshot::Sender<(SubscriberId, mpsc::Receiver<TelemetryEvent>)>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        self.registry.insert(
            id,
            Subscriber {
                queue: tx,
                missed: 0,
            },
        );

        if reply.send((id, rx)).is_err() {
            // The caller gave up before we answered.
            self.registry.remove(&id);
            return;
        }
        tracing::info!(subscriber_id = %id, subscribers = self.registry.len(), "Added subscriber");
    }

    /// Drop the subscriber's sender, which closes its queue.
    fn remove(&mut self, id: SubscriberId, reason: RemovalReason) -> bool {
        if self.registry.remove(&id).is_none() {
            return false;
        }
        if let RemovalReason::Stalled = reason {
            self.stats.evicted += 1;
        }
        tracing::info!(
            subscriber_id = %id,
            ?reason,
            subscribers = self.registry.len(),
            "Removed subscriber"
        );
        true
    }

    fn broadcast(&mut self, event: TelemetryEvent) {
        self.stats.published += 1;
        let max_missed = self.config.max_missed;
        let mut removals = Vec::new();

        for (id, sub) in self.registry.iter_mut() {
            match sub.queue.try_send(event.clone()) {
                Ok(()) => {
                    sub.missed = 0;
                    self.stats.delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    sub.missed += 1;
                    self.stats.dropped += 1;
                    tracing::warn!(subscriber_id = %id, missed = sub.missed, "Subscriber queue full, dropping event");
                    if sub.missed >= max_missed {
                        removals.push((*id, RemovalReason::Stalled));
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    removals.push((*id, RemovalReason::Disconnected));
                }
            }
        }

        for (id, reason) in removals {
            self.remove(id, reason);
        }

        tracing::debug!(subscribers = self.registry.len(), "Broadcast event");
    }

    fn close_all(&mut self) {
        let count = self.registry.len();
        self.registry.clear();
        tracing::info!(count, "Closed all subscriber queues");
    }

    fn snapshot_stats(&self) -> BrokerStats {
        BrokerStats {
            subscribers: self.registry.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control_loop(config: BrokerConfig) -> ControlLoop {
        let (_tx, rx) = mpsc::unbounded_channel();
        ControlLoop::new(config, rx)
    }

    fn register(control: &mut ControlLoop) -> (SubscriberId, mpsc::Receiver<TelemetryEvent>) {
        let (reply, mut rx) = oneshot::channel();
        control.add(reply);
        rx.try_recv().expect("subscribe reply is sent synchronously")
    }

    #[test]
    fn reader_that_went_away_is_pruned_on_publish() {
        let mut control = control_loop(BrokerConfig::default());
        let (_kept_id, mut kept) = register(&mut control);
        let (gone_id, gone) = register(&mut control);
        drop(gone);

        control.broadcast(TelemetryEvent::new("t", "ping"));

        assert!(!control.registry.contains_key(&gone_id));
        assert_eq!(control.registry.len(), 1);
        assert_eq!(kept.try_recv().unwrap().payload(), "ping");
        assert_eq!(control.stats.evicted, 0, "disconnects are not evictions");
    }

    #[test]
    fn abandoned_subscribe_is_not_registered() {
        let mut control = control_loop(BrokerConfig::default());
        let (reply, rx) = oneshot::channel();
        drop(rx);

        control.add(reply);

        assert!(control.registry.is_empty());
    }

    #[test]
    fn zero_config_values_are_clamped() {
        let control = control_loop(BrokerConfig {
            queue_capacity: 0,
            max_missed: 0,
        });
        assert_eq!(control.config.queue_capacity, 1);
        assert_eq!(control.config.max_missed, 1);
    }

    #[test]
    fn removing_unknown_id_reports_false() {
        let mut control = control_loop(BrokerConfig::default());
        assert!(!control.remove(SubscriberId::new(), RemovalReason::Unsubscribed));
    }
}
