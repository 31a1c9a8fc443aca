//! Async message bus — the seam between the transport relay and the
//! orchestrator.
//!
//! Transport publishes [`CoreCommand`]s inbound; the orchestrator consumes
//! them, does its work, and publishes [`CoreEvent`]s outbound for the
//! transport to fan out to devices. Bounded `tokio::sync::mpsc` channels on
//! both sides.

use crate::events::{CoreCommand, CoreEvent};
use tokio::sync::mpsc;

/// The command/event bus connecting transport ↔ orchestrator.
pub struct CoreBus {
    command_tx: mpsc::Sender<CoreCommand>,
    command_rx: tokio::sync::Mutex<mpsc::Receiver<CoreCommand>>,
    event_tx: mpsc::Sender<CoreEvent>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<CoreEvent>>,
}

impl CoreBus {
    /// Create a new bus with the given buffer capacity per direction.
    pub fn new(buffer_size: usize) -> Self {
        let (command_tx, command_rx) = mpsc::channel(buffer_size);
        let (event_tx, event_rx) = mpsc::channel(buffer_size);

        CoreBus {
            command_tx,
            command_rx: tokio::sync::Mutex::new(command_rx),
            event_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
        }
    }

    /// Publish a command from the transport to the orchestrator.
    pub async fn publish_command(
        &self,
        cmd: CoreCommand,
    ) -> Result<(), mpsc::error::SendError<CoreCommand>> {
        self.command_tx.send(cmd).await
    }

    /// Consume the next command (blocks until available).
    /// Returns None once all senders are dropped.
    pub async fn next_command(&self) -> Option<CoreCommand> {
        let mut rx = self.command_rx.lock().await;
        rx.recv().await
    }

    /// Publish an event from the orchestrator to the transport.
    pub async fn publish_event(
        &self,
        event: CoreEvent,
    ) -> Result<(), mpsc::error::SendError<CoreEvent>> {
        self.event_tx.send(event).await
    }

    /// Consume the next event (blocks until available).
    /// Returns None once all senders are dropped.
    pub async fn next_event(&self) -> Option<CoreEvent> {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await
    }

    /// Get a clone of the command sender (for the transport to hold).
    pub fn command_sender(&self) -> mpsc::Sender<CoreCommand> {
        self.command_tx.clone()
    }

    /// Get a clone of the event sender (for the orchestrator to hold).
    pub fn event_sender(&self) -> mpsc::Sender<CoreEvent> {
        self.event_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_flow() {
        let bus = CoreBus::new(10);

        let cmd = CoreCommand::Utterance {
            session_id: "s-1".into(),
            text: "what time is it".into(),
            confidence: 0.97,
        };
        bus.publish_command(cmd).await.unwrap();

        match bus.next_command().await.unwrap() {
            CoreCommand::Utterance { session_id, text, .. } => {
                assert_eq!(session_id, "s-1");
                assert_eq!(text, "what time is it");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_flow() {
        let bus = CoreBus::new(10);

        bus.publish_event(CoreEvent::SpeakingDone { session_id: "s-2".into() })
            .await
            .unwrap();

        let ev = bus.next_event().await.unwrap();
        assert_eq!(ev.session_id(), "s-2");
    }

    #[tokio::test]
    async fn test_command_ordering() {
        let bus = CoreBus::new(10);

        for i in 1..=3 {
            bus.publish_command(CoreCommand::SessionEnd {
                session_id: format!("s-{i}"),
            })
            .await
            .unwrap();
        }

        for i in 1..=3 {
            match bus.next_command().await.unwrap() {
                CoreCommand::SessionEnd { session_id } => {
                    assert_eq!(session_id, format!("s-{i}"));
                }
                other => panic!("unexpected command: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_sender_clones_feed_the_bus() {
        let bus = std::sync::Arc::new(CoreBus::new(10));
        let cmd_tx = bus.command_sender();
        let ev_tx = bus.event_sender();

        cmd_tx
            .send(CoreCommand::BargeIn {
                session_id: "s-1".into(),
                keyword: "stop".into(),
            })
            .await
            .unwrap();
        ev_tx
            .send(CoreEvent::BargeIn {
                session_id: "s-1".into(),
                keyword: "stop".into(),
            })
            .await
            .unwrap();

        assert!(matches!(
            bus.next_command().await.unwrap(),
            CoreCommand::BargeIn { .. }
        ));
        assert!(matches!(
            bus.next_event().await.unwrap(),
            CoreEvent::BargeIn { .. }
        ));
    }
}
