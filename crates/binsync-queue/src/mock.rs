use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use binsync_core::ChangeEvent;

use crate::client::Broker;
use crate::error::{QueueError, QueueResult};

/// A mock broker for testing.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Recorded events by routing key, in send order.
    sent: HashMap<String, Vec<ChangeEvent>>,
    /// Interleaved send order across all routing keys.
    order: Vec<ChangeEvent>,
    /// If set, all sends fail with this error.
    fail_with: Option<String>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock broker whose sends all fail.
    pub fn failing(error_message: impl Into<String>) -> Self {
        let broker = Self::new();
        broker.state.lock().unwrap().fail_with = Some(error_message.into());
        broker
    }

    /// Events sent under a routing key.
    pub fn sent_for(&self, routing_key: &str) -> Vec<ChangeEvent> {
        let state = self.state.lock().unwrap();
        state.sent.get(routing_key).cloned().unwrap_or_default()
    }

    /// All sent events in send order, regardless of routing key.
    pub fn sent(&self) -> Vec<ChangeEvent> {
        self.state.lock().unwrap().order.clone()
    }

    /// Total number of events sent.
    pub fn total_sent(&self) -> usize {
        self.state.lock().unwrap().order.len()
    }

    /// Clear all recorded sends.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.sent.clear();
        state.order.clear();
    }
}

impl Broker for MockBroker {
    fn send(
        &self,
        event: &ChangeEvent,
        routing_key: &str,
    ) -> impl Future<Output = QueueResult<()>> + Send {
        let state = self.state.clone();
        let event = event.clone();
        let routing_key = routing_key.to_string();

        async move {
            let mut state = state.lock().unwrap();

            if let Some(ref error) = state.fail_with {
                return Err(QueueError::Send(error.clone()));
            }

            state
                .sent
                .entry(routing_key)
                .or_default()
                .push(event.clone());
            state.order.push(event);
            Ok(())
        }
    }
}
