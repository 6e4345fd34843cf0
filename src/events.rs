use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Events emitted by the workflow services after a confirmed backend
/// success. Consumers (notification plumbing, audit sinks) subscribe via
/// the channel receiver; emission failures never fail the operation that
/// produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Transfer events
    TransferApproved(Uuid),
    TransferSplit {
        transfer_id: Uuid,
        follow_up_ids: Vec<Uuid>,
    },
    TransferShipped(Uuid),
    TransferReceived(Uuid),
    TransferCancelled {
        transfer_id: Uuid,
        reason: String,
    },

    // Slip events
    SlipCreated(Uuid),
    SlipCompleted(Uuid),
    SlipCancelled {
        slip_id: Uuid,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Builds a bounded event channel pair sized for bursty UI-driven usage.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Embedders that need richer
/// handling consume the receiver themselves instead of spawning this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::TransferCancelled {
                transfer_id,
                reason,
            } => {
                info!(%transfer_id, %reason, "Transfer cancelled");
            }
            Event::TransferSplit {
                transfer_id,
                follow_up_ids,
            } => {
                info!(
                    %transfer_id,
                    follow_ups = follow_up_ids.len(),
                    "Transfer split into follow-up requests"
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (sender, mut rx) = event_channel(8);
        let id = Uuid::new_v4();
        sender.send(Event::TransferApproved(id)).await.unwrap();

        match rx.recv().await {
            Some(Event::TransferApproved(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_once_receiver_dropped() {
        let (sender, rx) = event_channel(1);
        drop(rx);
        assert!(sender.send(Event::SlipCreated(Uuid::new_v4())).await.is_err());
    }
}
