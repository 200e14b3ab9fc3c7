// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Mutex, PoisonError};

/// Manages a generic, thread-safe broadcast event channel.
///
/// Every call to [`subscribe`](EventBus::subscribe) creates a dedicated unbounded
/// flume channel. Publishing clones the event into each live subscriber; channels
/// whose receiver has been dropped are pruned on the next publish.
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + Sync + 'static> {
    subscribers: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Creates a new EventBus without any subscriber.
    ///
    /// ## Returns
    /// A new instance of the EventBus struct.
    pub fn new() -> Self {
        log::trace!("Generic EventBus initialized.");
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    ///
    /// ## Returns
    /// A receiver that observes every event published from now on.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Sends a copy of `event` to every live subscriber.
    ///
    /// Publishing never blocks; a bus without subscribers drops the event.
    ///
    /// ## Arguments
    /// * `event` - The event to be broadcast.
    pub fn publish(&self, event: T) {
        log::trace!("Publishing an event.");

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        subscribers.retain(|sender| {
            if sender.send(event.clone()).is_err() {
                log::trace!("Dropping disconnected event subscriber.");
                return false;
            }
            true
        });
    }

    /// Returns the number of subscribers that were alive at the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flume::TryRecvError;
    use std::{sync::Arc, thread, time::Duration};

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Loaded { id: String },
        Unloading { id: String },
        ShutdownRequested,
    }

    fn loaded(id: &str) -> TestEvent {
        TestEvent::Loaded { id: id.to_string() }
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::<TestEvent>::new();
        bus.publish(TestEvent::ShutdownRequested);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn every_subscriber_receives_every_event() {
        let bus = EventBus::<TestEvent>::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish(loaded("a"));
        bus.publish(TestEvent::Unloading { id: "a".into() });

        for receiver in [&first, &second] {
            assert_eq!(receiver.try_recv(), Ok(loaded("a")));
            assert_eq!(
                receiver.try_recv(),
                Ok(TestEvent::Unloading { id: "a".into() })
            );
            assert_eq!(receiver.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::<TestEvent>::new();
        bus.publish(loaded("early"));

        let late = bus.subscribe();
        bus.publish(loaded("late"));

        assert_eq!(late.try_recv(), Ok(loaded("late")));
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::<TestEvent>::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.publish(TestEvent::ShutdownRequested);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(TestEvent::ShutdownRequested));
    }

    #[test]
    fn publish_from_thread() {
        let bus = Arc::new(EventBus::<TestEvent>::new());
        let receiver = bus.subscribe();

        let publisher = Arc::clone(&bus);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish(loaded("threaded"));
        });

        match receiver.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => assert_eq!(event, loaded("threaded")),
            Err(e) => panic!("Failed to receive event from thread: {e:?}"),
        }

        handle.join().expect("Thread join failed");
    }
}
