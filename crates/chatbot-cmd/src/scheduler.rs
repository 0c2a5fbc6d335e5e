//! Delayed replies and events
//!
//! Replies and custom events may be deferred. Deferred entries sit in a
//! [`ScheduledQueue`] until the host's tick reaches their due time. Each
//! tick fires at most a fixed number of entries, earliest first; the rest
//! wait for the next tick.
//!
//! Draining takes a snapshot of the due entries, picks the ones to fire and
//! removes exactly those, so entries scheduled while firing are never lost
//! or skipped.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;

use crate::host::{highlight, ReplySink};
use crate::invocation::Channel;

/// Something waiting to happen
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduled {
    /// Chat text to deliver
    Reply {
        channel: Channel,
        text: String,
        highlight: bool,
    },
    /// A custom event to emit
    Event {
        name: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    due: Duration,
    seq: u64,
    item: Scheduled,
}

/// Pending entries ordered by due time, then insertion order
#[derive(Debug, Clone, Default)]
pub struct ScheduledQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `item` to fire at `due`
    pub fn push(&mut self, due: Duration, item: Scheduled) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { due, seq, item });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest due time, if anything is pending
    pub fn next_due(&self) -> Option<Duration> {
        self.entries.iter().map(|e| e.due).min()
    }

    /// Remove and return up to `cap` entries due at `now`, earliest first
    pub fn drain_due(&mut self, now: Duration, cap: usize) -> Vec<Scheduled> {
        let mut due: Vec<(Duration, u64)> = self
            .entries
            .iter()
            .filter(|e| e.due <= now)
            .map(|e| (e.due, e.seq))
            .collect();
        if due.is_empty() || cap == 0 {
            return Vec::new();
        }
        due.sort_unstable();
        due.truncate(cap);

        let chosen: AHashSet<u64> = due.iter().map(|(_, seq)| *seq).collect();
        let (mut fire, keep): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| chosen.contains(&e.seq));
        self.entries = keep;

        fire.sort_unstable_by_key(|e| (e.due, e.seq));
        fire.into_iter().map(|e| e.item).collect()
    }

    /// Drop everything pending
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// How a reply was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the reply sink
    Sent,
    /// Queued until the given time
    Scheduled { due: Duration },
}

/// Outgoing chat text, immediate or deferred
pub struct Outbox {
    sink: Arc<dyn ReplySink>,
    queue: ScheduledQueue,
    threshold: Duration,
}

impl Outbox {
    pub fn new(sink: Arc<dyn ReplySink>, threshold: Duration) -> Self {
        Self {
            sink,
            queue: ScheduledQueue::new(),
            threshold,
        }
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ReplySink>) {
        self.sink = sink;
    }

    /// Delays shorter than this are sent immediately
    pub fn set_threshold(&mut self, threshold: Duration) {
        self.threshold = threshold;
    }

    pub fn queue(&self) -> &ScheduledQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ScheduledQueue {
        &mut self.queue
    }

    /// Send now, or queue for `now + delay` when the delay is long enough
    pub fn send(
        &mut self,
        channel: Channel,
        text: &str,
        highlight: bool,
        delay: Duration,
        now: Duration,
    ) -> Delivery {
        if delay < self.threshold {
            self.deliver(channel, text, highlight);
            Delivery::Sent
        } else {
            // saturates so an absurd delay just never fires
            let due = now.saturating_add(delay);
            log::debug!("reply scheduled for {:.2}s", due.as_secs_f64());
            self.queue.push(
                due,
                Scheduled::Reply {
                    channel,
                    text: text.to_string(),
                    highlight,
                },
            );
            Delivery::Scheduled { due }
        }
    }

    /// Hand text to the sink, applying highlight
    pub fn deliver(&self, channel: Channel, text: &str, highlight_reply: bool) {
        if highlight_reply {
            self.sink.send(channel, &highlight(channel.platform, text));
        } else {
            self.sink.send(channel, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Platform;
    use parking_lot::Mutex;

    fn event(name: &str) -> Scheduled {
        Scheduled::Event {
            name: name.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    fn names(items: Vec<Scheduled>) -> Vec<String> {
        items
            .into_iter()
            .map(|s| match s {
                Scheduled::Event { name, .. } => name,
                Scheduled::Reply { text, .. } => text,
            })
            .collect()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_drain_in_due_order_with_cap() {
        let mut queue = ScheduledQueue::new();
        for (i, due) in [5u64, 1, 3, 2, 4, 9].into_iter().enumerate() {
            queue.push(secs(due), event(&format!("e{}@{}", i, due)));
        }
        let fired = names(queue.drain_due(secs(6), 4));
        assert_eq!(fired, ["e1@1", "e3@2", "e2@3", "e4@4"]);
        assert_eq!(queue.len(), 2);
        assert_eq!(names(queue.drain_due(secs(6), 4)), ["e0@5"]);
        assert_eq!(queue.next_due(), Some(secs(9)));
    }

    #[test]
    fn test_equal_due_keeps_insertion_order() {
        let mut queue = ScheduledQueue::new();
        queue.push(secs(1), event("a"));
        queue.push(secs(1), event("b"));
        queue.push(secs(1), event("c"));
        assert_eq!(names(queue.drain_due(secs(1), 10)), ["a", "b", "c"]);
    }

    #[test]
    fn test_nothing_due() {
        let mut queue = ScheduledQueue::new();
        queue.push(secs(10), event("late"));
        assert!(queue.drain_due(secs(9), 4).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ReplySink for Recorder {
        fn send(&self, _channel: Channel, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    #[test]
    fn test_outbox_threshold() {
        let sink = Arc::new(Recorder::default());
        let mut outbox = Outbox::new(sink.clone(), secs(1));
        let chan = Channel::public(Platform::Twitch);

        assert_eq!(outbox.send(chan, "now", false, Duration::from_millis(999), secs(0)), Delivery::Sent);
        assert_eq!(outbox.send(chan, "me", true, Duration::ZERO, secs(0)), Delivery::Sent);
        assert_eq!(
            outbox.send(chan, "later", false, secs(1), secs(10)),
            Delivery::Scheduled { due: secs(11) }
        );
        assert_eq!(*sink.0.lock(), ["now", "/me me"]);
        assert_eq!(outbox.queue().len(), 1);
    }

    #[test]
    fn test_outbox_huge_delay_saturates() {
        let sink = Arc::new(Recorder::default());
        let mut outbox = Outbox::new(sink.clone(), secs(1));
        let chan = Channel::public(Platform::Twitch);

        assert_eq!(
            outbox.send(chan, "never", false, Duration::MAX, secs(10)),
            Delivery::Scheduled { due: Duration::MAX }
        );
        assert!(outbox.queue_mut().drain_due(secs(1_000_000), 10).is_empty());
        assert_eq!(outbox.queue().len(), 1);
        assert!(sink.0.lock().is_empty());
    }
}
