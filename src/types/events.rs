use tokio::sync::broadcast;

pub use peercore::types::events::*;

// The size of the broadcast channel buffer.
pub const CHANNEL_CAPACITY: usize = 100;

/// Broadcast channel carrying [`CallEvent`]s to the UI.
///
/// Publishing never blocks; subscribers that fall behind by more than the
/// capacity see `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    calls: broadcast::Sender<CallEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            calls: broadcast::channel(capacity.max(1)).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.calls.subscribe()
    }

    pub fn publish(&self, event: CallEvent) {
        // No subscribers is fine.
        let _ = self.calls.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(CallEvent::IncomingCall {
            from: UserId::new("alice"),
        });

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.recv().await.unwrap(),
                CallEvent::IncomingCall {
                    from: UserId::new("alice")
                }
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        EventBus::default().publish(CallEvent::Alert {
            message: "nobody listens".to_string(),
        });
    }
}
