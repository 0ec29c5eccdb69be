// Copyright (c) 2026 Skpr
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Provisioning Events
//
// In-memory fan-out over a tokio broadcast channel. The CLI prints events
// while a provision is running and tests assert on them. Events are not
// persisted; a slow subscriber loses the oldest ones.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::ProvisioningEvent;
use crate::domain::request::CreationToken;

/// Event bus for publishing and subscribing to provisioning events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ProvisioningEvent>>,
}

impl EventBus {
    /// Create a new event bus that buffers up to `capacity` events per
    /// subscriber before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ProvisioningEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all provisioning events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            token: None,
        }
    }

    /// Subscribe to the events of one creation token
    ///
    /// Events that carry no token (mount targets, reaped processes) are
    /// filtered out as well.
    pub fn subscribe_token(&self, token: CreationToken) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            token: Some(token),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for provisioning events, optionally filtered by token
pub struct EventReceiver {
    receiver: broadcast::Receiver<ProvisioningEvent>,
    token: Option<CreationToken>,
}

impl EventReceiver {
    /// Receive the next matching event (waits until one is available)
    pub async fn recv(&mut self) -> Result<ProvisioningEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without waiting
    pub fn try_recv(&mut self) -> Result<ProvisioningEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<ProvisioningEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }

    fn matches(&self, event: &ProvisioningEvent) -> bool {
        match &self.token {
            None => true,
            Some(token) => event.token() == Some(token),
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
