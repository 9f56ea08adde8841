//! A run-keyed pub/sub channel with a bounded replay cache.
//!
//! Spec §4.5: publish/subscribe must preserve FIFO ordering per channel, and
//! a late subscriber must be able to resume from a given offset rather than
//! missing everything published before it subscribed. Grounded on the
//! teacher's `tracing`-instrumented `async-stream`-based streaming
//! (`agent/streaming.rs`) for the subscriber-side `Stream` shape, and on
//! `everruns-durable`'s `WorkflowEventStore` for the idea of a durable,
//! replayable event log keyed by run id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::workflow::events::{PublishedEvent, StreamEvent};

/// Default number of recent events retained per channel for late subscribers
/// to replay before switching to live delivery.
pub const DEFAULT_REPLAY_CAPACITY: usize = 256;

struct Channel {
    sender: broadcast::Sender<PublishedEvent>,
    replay: VecDeque<PublishedEvent>,
    replay_capacity: usize,
    next_offset: u64,
}

impl Channel {
    fn new(replay_capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(replay_capacity.max(1));
        Self {
            sender,
            replay: VecDeque::with_capacity(replay_capacity),
            replay_capacity,
            next_offset: 0,
        }
    }

    fn publish(&mut self, run_id: Uuid, event: StreamEvent) -> PublishedEvent {
        let published = PublishedEvent {
            run_id,
            offset: self.next_offset,
            event,
        };
        self.next_offset += 1;

        if self.replay.len() == self.replay_capacity {
            self.replay.pop_front();
        }
        self.replay.push_back(published.clone());

        // A send error only means there are no live subscribers right now;
        // the event is still retained in the replay cache for later ones.
        let _ = self.sender.send(published.clone());
        published
    }

    fn replay_from(&self, run_id: Uuid, offset: u64) -> Vec<PublishedEvent> {
        let mut events: Vec<PublishedEvent> = self
            .replay
            .iter()
            .filter(|event| event.offset >= offset)
            .cloned()
            .collect();

        // If the requested offset predates the oldest retained event (and
        // some events were actually requested, i.e. offset < next_offset),
        // the gap was silently dropped by eviction; surface it rather than
        // let the subscriber believe it saw a contiguous prefix.
        if let Some(oldest) = self.replay.front() {
            if offset < oldest.offset {
                events.insert(
                    0,
                    PublishedEvent {
                        run_id,
                        offset,
                        event: StreamEvent::CacheTruncated {
                            resumed_at_offset: oldest.offset,
                        },
                    },
                );
            }
        } else if offset < self.next_offset {
            events.push(PublishedEvent {
                run_id,
                offset,
                event: StreamEvent::CacheTruncated {
                    resumed_at_offset: self.next_offset,
                },
            });
        }

        events
    }
}

/// A registry of per-run channels. One `Bus` is shared across a whole
/// process; `facade::DurableAgent` holds an `Arc<Bus>`.
#[derive(Clone)]
pub struct Bus {
    channels: Arc<Mutex<HashMap<Uuid, Channel>>>,
    replay_capacity: usize,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Create an empty bus with the default per-channel replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_replay_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Create an empty bus whose channels retain at most `replay_capacity`
    /// events before evicting the oldest (and emitting `CacheTruncated` to
    /// subscribers who asked for an offset older than what remains).
    #[must_use]
    pub fn with_replay_capacity(replay_capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            replay_capacity,
        }
    }

    /// Publish an event to a run's channel, creating the channel on first
    /// use. Returns the event with its assigned offset.
    pub async fn publish(&self, run_id: Uuid, event: StreamEvent) -> PublishedEvent {
        let mut channels = self.channels.lock().await;
        let capacity = self.replay_capacity;
        let channel = channels.entry(run_id).or_insert_with(|| Channel::new(capacity));
        channel.publish(run_id, event)
    }

    /// Subscribe to a run's channel from a given offset: events already in
    /// the replay cache at or after `from_offset` are returned immediately,
    /// and a live `broadcast::Receiver` is returned for anything published
    /// afterward. If `from_offset` predates the retained window, a
    /// `StreamEvent::CacheTruncated` marker is prepended so the caller can
    /// detect the gap instead of believing it saw a contiguous prefix.
    pub async fn subscribe(
        &self,
        run_id: Uuid,
        from_offset: u64,
    ) -> (Vec<PublishedEvent>, broadcast::Receiver<PublishedEvent>) {
        let mut channels = self.channels.lock().await;
        let capacity = self.replay_capacity;
        let channel = channels.entry(run_id).or_insert_with(|| Channel::new(capacity));
        (channel.replay_from(run_id, from_offset), channel.sender.subscribe())
    }

    /// Drop a run's channel once it is known to be finished and fully
    /// drained by every subscriber, freeing its replay cache.
    pub async fn close(&self, run_id: Uuid) {
        self.channels.lock().await.remove(&run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_assigns_monotonic_offsets() {
        let bus = Bus::new();
        let run_id = Uuid::new_v4();
        let first = bus.publish(run_id, StreamEvent::Resumed).await;
        let second = bus.publish(run_id, StreamEvent::Resumed).await;
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
    }

    #[tokio::test]
    async fn late_subscriber_replays_from_offset() {
        let bus = Bus::new();
        let run_id = Uuid::new_v4();
        bus.publish(run_id, StreamEvent::TextDelta { delta: "a".into() }).await;
        bus.publish(run_id, StreamEvent::TextDelta { delta: "b".into() }).await;
        bus.publish(run_id, StreamEvent::TextDelta { delta: "c".into() }).await;

        let (replayed, _rx) = bus.subscribe(run_id, 1).await;
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].offset, 1);
        assert_eq!(replayed[1].offset, 2);
    }

    #[tokio::test]
    async fn overflowing_the_replay_cache_surfaces_a_truncation_marker() {
        let bus = Bus::with_replay_capacity(2);
        let run_id = Uuid::new_v4();
        for i in 0..5 {
            bus.publish(run_id, StreamEvent::TextDelta { delta: i.to_string() }).await;
        }

        // Only offsets 3 and 4 are still retained; asking from 0 must not
        // silently pretend offsets 0..=2 never happened.
        let (replayed, _rx) = bus.subscribe(run_id, 0).await;
        assert!(matches!(
            replayed[0].event,
            StreamEvent::CacheTruncated { resumed_at_offset: 3 }
        ));
        assert_eq!(replayed[1].offset, 3);
        assert_eq!(replayed[2].offset, 4);
    }

    #[tokio::test]
    async fn events_preserve_fifo_order_per_channel() {
        let bus = Bus::new();
        let run_id = Uuid::new_v4();
        for i in 0..5 {
            bus.publish(run_id, StreamEvent::TextDelta { delta: i.to_string() }).await;
        }
        let (replayed, _rx) = bus.subscribe(run_id, 0).await;
        let deltas: Vec<_> = replayed
            .iter()
            .map(|e| match &e.event {
                StreamEvent::TextDelta { delta } => delta.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(deltas, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn close_drops_the_replay_cache() {
        let bus = Bus::new();
        let run_id = Uuid::new_v4();
        bus.publish(run_id, StreamEvent::Resumed).await;
        bus.close(run_id).await;
        let (replayed, _rx) = bus.subscribe(run_id, 0).await;
        assert!(replayed.is_empty());
    }
}
