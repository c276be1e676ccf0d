//! Kernel contract consumed by the runtime
//!
//! A kernel accepts commands recorded in a shared [`CommandArena`] and reports
//! progress on a multicast event stream. Callers must hold an
//! [`EventSubscription`] before they are allowed to submit, so the first event
//! of a command can never be missed, and every subscription receives every
//! later event in order.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::core::{CommandArena, CommandId, KernelEvent, ReplError, Result};

/// Events a subscription buffers before publishers wait
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Execution kernel seen from the shell
#[async_trait]
pub trait KernelFacade: Send + Sync {
    /// Arena holding every command this kernel has seen
    fn commands(&self) -> CommandArena;

    /// Attach to the event stream from this point onward
    fn subscribe(&self) -> EventSubscription;

    /// Begin processing a command already inserted into [`commands`](Self::commands).
    ///
    /// Returns once the command is accepted; its outcome arrives on the event
    /// stream. `subscription` proves the caller is already listening.
    async fn submit(
        &self,
        command: CommandId,
        subscription: &EventSubscription,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Language used for commands without an explicit target
    fn default_language(&self) -> String;

    /// Install the resolver consulted for input requests
    fn set_input_resolver(&self, resolver: Arc<dyn InputResolver>);
}

/// Receiving end of a kernel's event stream
pub struct EventSubscription {
    receiver: mpsc::Receiver<KernelEvent>,
}

impl EventSubscription {
    pub fn new(receiver: mpsc::Receiver<KernelEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event.
    ///
    /// Events arrive in publication order and none are skipped. A closed
    /// stream is a host fault.
    pub async fn recv(&mut self) -> Result<KernelEvent> {
        match self.receiver.recv().await {
            Some(event) => {
                trace!(command = %event.command(), kind = event.kind_name(), "event received");
                Ok(event)
            }
            None => Err(ReplError::KernelClosed),
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("closed", &self.receiver.is_closed())
            .finish()
    }
}

/// Sending half shared by kernel implementations.
///
/// Every subscriber owns a queue of [`EVENT_CHANNEL_CAPACITY`] events.
/// Publishing waits for room in each queue, so a slow subscriber holds the
/// kernel back instead of missing events.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<KernelEvent>>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(sender);
        EventSubscription::new(receiver)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }

    /// Deliver an event to every current subscriber, waiting while a
    /// subscriber's queue is full.
    ///
    /// Publishing with nobody listening is not an error.
    pub async fn publish(&self, event: KernelEvent) {
        let subscribers = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|sender| !sender.is_closed());
            subscribers.clone()
        };
        if subscribers.is_empty() {
            trace!("event published with no subscribers");
            return;
        }

        for subscriber in subscribers {
            if subscriber.send(event.clone()).await.is_err() {
                trace!("subscriber went away during publish");
            }
        }
    }
}

/// Supplies values for named input requests
pub trait InputResolver: Send + Sync {
    fn resolve(&self, name: &str, type_hint: Option<&str>) -> Option<String>;
}

/// Resolver backed by a fixed parameter map, matched case-insensitively
#[derive(Debug, Clone, Default)]
pub struct ParameterInputs {
    values: HashMap<String, String>,
}

impl ParameterInputs {
    pub fn new(parameters: &HashMap<String, String>) -> Self {
        Self {
            values: parameters
                .iter()
                .map(|(key, value)| (key.to_lowercase(), value.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl InputResolver for ParameterInputs {
    fn resolve(&self, name: &str, _type_hint: Option<&str>) -> Option<String> {
        self.values.get(&name.to_lowercase()).cloned()
    }
}

/// Resolver that never supplies a value
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInputs;

impl InputResolver for NoInputs {
    fn resolve(&self, _name: &str, _type_hint: Option<&str>) -> Option<String> {
        None
    }
}
