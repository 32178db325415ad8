use tokio::sync::broadcast;

/// Process-wide notification channel. Emitting never fails: events sent while
/// nobody is subscribed are dropped.
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E> EventBus<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: E) {
        // Err only means there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(256)
    }
}

/// Drains every event currently buffered in `receiver`.
pub fn drain<E: Clone>(receiver: &mut broadcast::Receiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus: EventBus<u8> = EventBus::new(4);
        bus.emit(1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribers_see_later_events() {
        let bus = EventBus::new(4);
        bus.emit("early");
        let mut rx = bus.subscribe();
        bus.emit("a");
        bus.emit("b");
        assert_eq!(drain(&mut rx), vec!["a", "b"]);
        assert!(drain(&mut rx).is_empty());
    }
}
