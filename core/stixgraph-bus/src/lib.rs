//! Process-wide pub/sub bus for stixgraph.
//!
//! One `tokio::sync::broadcast` channel per [`Topic`]. Publish order is
//! preserved per topic; nothing is promised across topics. Subscribers see
//! only messages published after they subscribed.
//!
//! A topic carries [`BusMessage::Edit`] events and the [`BusMessage::Disconnect`]
//! sentinel, which ends every stream opened on it. Edit streams are narrowed
//! with an [`EditFilter`], a plain value rather than a predicate closure.

mod error;
mod message;

pub use error::{BusError, BusResult};
pub use message::{BusMessage, EditEvent, EditFilter, EventActor};

use futures::future::ready;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use stixgraph_model::Entity;
use stixgraph_types::{Topic, UserId};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

/// Default per-topic buffer. Subscribers further behind than this lag.
pub const DEFAULT_CAPACITY: usize = 256;

/// Stream of updated instances accepted by an [`EditFilter`].
pub type EditStream = BoxStream<'static, Entity>;

/// The bus. Share it behind an `Arc`.
pub struct PubSub {
    channels: RwLock<HashMap<Topic, broadcast::Sender<BusMessage>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PubSub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    fn sender(&self, topic: Topic) -> BusResult<broadcast::Sender<BusMessage>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        {
            let channels = self.channels.read().map_err(|_| BusError::LockPoisoned)?;
            if let Some(sender) = channels.get(&topic) {
                return Ok(sender.clone());
            }
        }
        let mut channels = self.channels.write().map_err(|_| BusError::LockPoisoned)?;
        let sender = channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }

    /// Publishes a message. Returns how many subscribers received it; having
    /// none is not an error.
    pub fn publish(&self, topic: Topic, message: BusMessage) -> BusResult<usize> {
        let sender = self.sender(topic)?;
        let delivered = sender.send(message).unwrap_or(0);
        debug!(topic = %topic, delivered, "published");
        Ok(delivered)
    }

    /// Publishes `{ user: { id }, instance }` on `topic`.
    pub fn publish_edit(&self, topic: Topic, user: UserId, instance: Entity) -> BusResult<usize> {
        self.publish(topic, BusMessage::Edit(EditEvent::new(user, instance)))
    }

    /// Raw receiver for `topic`.
    pub fn subscribe(&self, topic: Topic) -> BusResult<broadcast::Receiver<BusMessage>> {
        Ok(self.sender(topic)?.subscribe())
    }

    /// Updated instances on `topic` accepted by `filter`. The stream ends on
    /// the disconnect sentinel or when the bus shuts down; lagged messages are
    /// skipped with a warning.
    pub fn edits(&self, topic: Topic, filter: EditFilter) -> BusResult<EditStream> {
        let receiver = self.subscribe(topic)?;
        let stream = BroadcastStream::new(receiver)
            .take_while(|message| ready(!matches!(message, Ok(BusMessage::Disconnect))))
            .filter_map(move |message| {
                ready(match message {
                    Ok(BusMessage::Edit(event)) if filter.accepts(&event) => Some(event.instance),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "subscriber lagged, messages dropped");
                        None
                    }
                })
            });
        Ok(stream.boxed())
    }

    /// Sends the disconnect sentinel on `topic`.
    pub fn disconnect(&self, topic: Topic) -> BusResult<usize> {
        self.publish(topic, BusMessage::Disconnect)
    }

    /// Sends the disconnect sentinel on every topic and refuses further use.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Ok(mut channels) = self.channels.write() else {
            return;
        };
        for (topic, sender) in channels.drain() {
            let _ = sender.send(BusMessage::Disconnect);
            debug!(topic = %topic, "topic closed");
        }
        info!("pub/sub bus shut down");
    }
}
