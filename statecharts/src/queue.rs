//! Time-ordered queue of pending events.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use statecharts_core::Event;

/// One queued event with its scheduled time and insertion rank.
#[derive(Debug)]
struct Scheduled {
    at: f64,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at.total_cmp(&other.at) == Ordering::Equal && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so that the `BinaryHeap` pops the earliest entry; ties within
    // a timestamp resolve to insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .total_cmp(&other.at)
            .then_with(|| self.seq.cmp(&other.seq))
            .reverse()
    }
}

/// A min-priority queue keyed on `(scheduled_time, insertion_sequence)`.
///
/// A delayed event is scheduled at `push` time plus its delay; every other
/// event is scheduled at `push` time. Events sharing a timestamp come out in
/// FIFO order thanks to the monotone insertion counter.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// The earliest entry, without removing it.
    pub fn first(&self) -> Option<(f64, &Event)> {
        self.heap.peek().map(|entry| (entry.at, &entry.event))
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<(f64, Event)> {
        self.heap.pop().map(|entry| (entry.at, entry.event))
    }

    /// Schedule an event at `time`, shifted by the event's delay if it
    /// carries one.
    pub fn push(&mut self, time: f64, event: Event) {
        let at = time + event.delay().unwrap_or(0.0);
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Scheduled { at, seq, event });
    }
}
