//! In-memory message bus for agent-to-agent signaling.
//!
//! The `MessageBus` keeps a fixed-capacity history (oldest entries are
//! dropped first) and delivers each message to subscribers of its channel.
//! Targeted messages reach the channel named after the recipient agent.
//! Broadcasts go out on the wildcard channel, which every subscription
//! hears, whether it was registered under an agent name or under `*`.
//! The bus is independent of scheduling.

use crate::clog_trace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Default number of messages retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Channel for broadcasts. Subscribing here receives broadcasts only.
pub const WILDCARD: &str = "*";

/// Kind of message exchanged between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Data,
    Request,
    Response,
    Broadcast,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Data => write!(f, "data"),
            MessageKind::Request => write!(f, "request"),
            MessageKind::Response => write!(f, "response"),
            MessageKind::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Agent(String),
    All,
}

impl Recipient {
    /// Parse an address where `*` means everyone.
    pub fn parse(address: &str) -> Self {
        if address == WILDCARD {
            Recipient::All
        } else {
            Recipient::Agent(address.to_string())
        }
    }

    pub fn matches(&self, agent: &str) -> bool {
        matches!(self, Recipient::Agent(name) if name == agent)
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Agent(name) => write!(f, "{}", name),
            Recipient::All => write!(f, "{}", WILDCARD),
        }
    }
}

/// A message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub from: String,
    pub to: Recipient,
    pub kind: MessageKind,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(from: &str, to: Recipient, kind: MessageKind, content: impl Into<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.to_string(),
            to,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Channel the message is delivered on.
    pub fn channel(&self) -> &str {
        match (&self.kind, &self.to) {
            (MessageKind::Broadcast, _) | (_, Recipient::All) => WILDCARD,
            (_, Recipient::Agent(name)) => name,
        }
    }
}

/// Callback invoked for each delivered message.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

struct BusState {
    history: VecDeque<Message>,
    subscribers: HashMap<String, Vec<MessageHandler>>,
}

/// Capacity-bounded publish/subscribe channel.
pub struct MessageBus {
    capacity: usize,
    state: Mutex<BusState>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(BusState {
                history: VecDeque::with_capacity(capacity),
                subscribers: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // A panicking handler must not wedge the bus.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a message and deliver it to its channel's subscribers.
    ///
    /// A wildcard message is delivered to every subscription, each handler
    /// at most once. Handlers run after the internal lock is released, so a
    /// handler may itself send on the bus.
    pub fn send(&self, message: Message) {
        let handlers: Vec<MessageHandler> = {
            let mut state = self.lock();
            if state.history.len() >= self.capacity {
                state.history.pop_front();
            }
            state.history.push_back(message.clone());

            match message.channel() {
                WILDCARD => {
                    let mut all: Vec<MessageHandler> = Vec::new();
                    for handler in state.subscribers.values().flatten() {
                        if !all.iter().any(|seen| Arc::ptr_eq(seen, handler)) {
                            all.push(handler.clone());
                        }
                    }
                    all
                }
                channel => state.subscribers.get(channel).cloned().unwrap_or_default(),
            }
        };

        clog_trace!(
            "[bus] {} -> {} ({}) delivered to {} handler(s)",
            message.from,
            message.to,
            message.kind,
            handlers.len()
        );
        for handler in handlers {
            handler(&message);
        }
    }

    /// Register a handler for messages addressed to `agent`, plus every
    /// broadcast.
    ///
    /// Pass [`WILDCARD`] to receive broadcasts only.
    pub fn subscribe<F>(&self, agent: &str, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe_handler(agent, Arc::new(handler));
    }

    /// Register an existing handler. The same handler may be registered
    /// under several channels; a broadcast still reaches it once.
    pub fn subscribe_handler(&self, agent: &str, handler: MessageHandler) {
        self.lock()
            .subscribers
            .entry(agent.to_string())
            .or_default()
            .push(handler);
    }

    /// Stored messages, oldest first, optionally filtered to those sent by
    /// or addressed to `agent`.
    pub fn history(&self, agent: Option<&str>) -> Vec<Message> {
        let state = self.lock();
        state
            .history
            .iter()
            .filter(|m| match agent {
                Some(name) => m.from == name || m.to.matches(name),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.values().map(Vec::len).sum()
    }

    /// Drop all messages and all subscriptions.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.history.clear();
        state.subscribers.clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("capacity", &self.capacity)
            .field("messages", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
