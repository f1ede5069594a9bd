use crate::types::{EventListId, SimEvent, SimTime};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A time-ordered pending event. Ties are broken by scheduling order so
/// simultaneous events fire in the order they were scheduled.
#[derive(Debug, Clone)]
struct PendingEvent {
    time: SimTime,
    seq: u64,
    event: SimEvent,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time.to_bits() == other.time.to_bits() && self.seq == other.seq
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// The engine's future event list: a min-heap over (time, scheduling order).
pub struct EventList {
    id: EventListId,
    heap: BinaryHeap<Reverse<PendingEvent>>,
    seq: u64,
}

impl EventList {
    pub fn new(id: EventListId) -> Self {
        Self {
            id,
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn id(&self) -> EventListId {
        self.id
    }

    pub fn schedule(&mut self, time: SimTime, name: &str, source: &str) {
        let event = SimEvent {
            time,
            name: name.to_string(),
            source: source.to_string(),
        };
        self.heap.push(Reverse(PendingEvent {
            time,
            seq: self.seq,
            event,
        }));
        self.seq += 1;
    }

    /// Fire time of the next pending event without removing it.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|Reverse(p)| p.time)
    }

    pub fn pop(&mut self) -> Option<SimEvent> {
        self.heap.pop().map(|Reverse(p)| p.event)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
