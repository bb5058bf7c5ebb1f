//! Multicast event channels.
//!
//! Subscribers receive a `crossbeam_channel::Receiver`; dropping it ends the
//! subscription, so nobody has to unregister listeners by hand.

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Fan-out of cloned events to every live subscriber.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Vec<Sender<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new subscription.
    ///
    /// # Returns
    /// A receiver that sees every event emitted after this call.
    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every subscriber, pruning the ones that went away.
    pub fn emit(&mut self, event: E) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Disconnect all subscribers.
    pub fn close(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use crossbeam_channel::TryRecvError;

    #[test]
    fn dropped_receivers_are_pruned_on_emit() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);
        bus.emit(7u32);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv(), Ok(7));
    }

    #[test]
    fn close_disconnects_subscribers() {
        let mut bus: EventBus<u32> = EventBus::new();
        let rx = bus.subscribe();
        bus.close();
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }
}
