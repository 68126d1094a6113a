//! Face events for the on-screen UI
//!
//! Outbound only and fire-and-forget: a UI layer subscribes and renders,
//! the pipeline never waits for an acknowledgement.

use tokio::sync::broadcast;

/// Buffered face events per subscriber before the oldest are skipped
const FACE_CHANNEL_CAPACITY: usize = 32;

/// Expression requested from the face UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceEvent {
    /// Wakeword heard, listening
    Ask,
    /// Utterance captured, waiting on the services
    Think,
    /// Idle gaze
    Look,
    /// Reply audio playing
    Speak,
    /// Executing a command
    Running,
}

impl std::fmt::Display for FaceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ask => write!(f, "ask"),
            Self::Think => write!(f, "think"),
            Self::Look => write!(f, "look"),
            Self::Speak => write!(f, "speak"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Broadcast sender for face events
#[derive(Debug, Clone)]
pub struct FaceEvents {
    tx: broadcast::Sender<FaceEvent>,
}

impl Default for FaceEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FACE_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Send an event; having no UI attached is not an error
    pub fn send(&self, event: FaceEvent) {
        tracing::debug!(face = %event, "face event");
        let _ = self.tx.send(event);
    }

    /// Attach a new UI listener
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FaceEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers() {
        FaceEvents::new().send(FaceEvent::Look);
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let faces = FaceEvents::new();
        let mut rx = faces.subscribe();

        faces.send(FaceEvent::Ask);
        faces.send(FaceEvent::Think);

        assert_eq!(rx.try_recv().unwrap(), FaceEvent::Ask);
        assert_eq!(rx.try_recv().unwrap(), FaceEvent::Think);
        assert!(rx.try_recv().is_err());
    }
}
