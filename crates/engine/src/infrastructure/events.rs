//! Domain event fan-out.
//!
//! Events feed the audit trail only; business writes never depend on
//! delivery. The bus is a tokio broadcast channel so publishing can't block
//! on a slow consumer, and a lagging subscriber just drops old events.

use async_trait::async_trait;
use quoteforge_domain::DomainEvent;
use tokio::sync::broadcast;

use crate::infrastructure::ports::{EventBusError, EventBusPort};

const EVENT_BUFFER: usize = 256;

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Spawn a subscriber that writes every event to the audit log.
    pub fn spawn_audit_logger(&self) {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        tracing::info!(
                            event_type = event.event_type(),
                            payload = ?event,
                            "audit event"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "audit logger lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBusPort for BroadcastEventBus {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventBusError> {
        // send only fails when no receiver exists; that's fine for a bus
        // whose consumers are optional.
        let _ = self.sender.send(event);
        Ok(())
    }
}
