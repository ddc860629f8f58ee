//! Cooperative scheduler: a binary min-heap of wake-time-ordered events,
//! driven by the host calling [`Scheduler::tick`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashSet;

use crate::hash::H32;
use crate::value::Cell;

/// Monotonically increasing handle returned by [`Scheduler::schedule`],
/// used to [`Scheduler::cancel`] the event later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId(u64);

#[derive(Debug, Clone)]
struct Event {
    wake_at_ms: u64,
    /// FIFO tie-break: events scheduled earlier at the same wake time run
    /// first.
    sequence: u64,
    id: ScheduleId,
    function: H32,
    object_id: Option<u32>,
    args: Vec<Cell>,
    repeat_every_ms: Option<u64>,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at_ms == other.wake_at_ms && self.sequence == other.sequence
    }
}
impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
        // wake time, with earlier `sequence` breaking ties.
        other
            .wake_at_ms
            .cmp(&self.wake_at_ms)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One event due to fire, returned by [`Scheduler::tick`] for the caller
/// (the [`crate::vm::ExecutionEngine`]) to dispatch.
pub struct DueEvent {
    pub function: H32,
    pub object_id: Option<u32>,
    pub args: Vec<Cell>,
}

/// A binary-heap delay/repeat scheduler. Cancellation is lazy-delete: a
/// cancelled id is recorded in a side set in O(1) and its event is skipped
/// when popped off the heap, rather than removed from the heap in place
/// (a `BinaryHeap` has no O(log n) remove-by-key).
pub struct Scheduler {
    heap: BinaryHeap<Event>,
    cancelled: HashSet<ScheduleId>,
    next_id: u64,
    next_sequence: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 1,
            next_sequence: 0,
        }
    }

    /// Schedules `function` (optionally a method on `object_id`) to fire
    /// once `delay_ms` from `now_ms`. Pass `repeat_every_ms` to re-enqueue
    /// automatically at `previous wake + repeat_every_ms`, avoiding drift.
    pub fn schedule(
        &mut self,
        now_ms: u64,
        delay_ms: u64,
        function: H32,
        object_id: Option<u32>,
        args: Vec<Cell>,
        repeat_every_ms: Option<u64>,
    ) -> ScheduleId {
        let id = ScheduleId(self.next_id);
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Event {
            wake_at_ms: now_ms + delay_ms,
            sequence,
            id,
            function,
            object_id,
            args,
            repeat_every_ms,
        });
        id
    }

    /// Marks `id` cancelled in O(1) (amortized `HashSet` insert). Returns
    /// `false` if `id` was already cancelled. The event itself is dropped
    /// when it is next popped off the heap in [`Scheduler::tick`].
    pub fn cancel(&mut self, id: ScheduleId) -> bool {
        self.cancelled.insert(id)
    }

    /// Pops and returns every event due at or before `now_ms`, re-enqueuing
    /// repeats at `previous_wake + repeat_every_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Vec<DueEvent> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.wake_at_ms > now_ms {
                break;
            }
            let event = self.heap.pop().unwrap();
            if self.cancelled.remove(&event.id) {
                log::trace!("scheduler: skipping cancelled event {:?}", event.id);
                continue;
            }
            log::debug!(
                "scheduler: dispatching {:?} (wake_at={} now={})",
                event.function,
                event.wake_at_ms,
                now_ms
            );
            if let Some(period) = event.repeat_every_ms {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                self.heap.push(Event {
                    wake_at_ms: event.wake_at_ms + period,
                    sequence,
                    id: event.id,
                    function: event.function,
                    object_id: event.object_id,
                    args: event.args.clone(),
                    repeat_every_ms: Some(period),
                });
            }
            due.push(DueEvent {
                function: event.function,
                object_id: event.object_id,
                args: event.args,
            });
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.heap.iter().all(|e| self.cancelled.contains(&e.id))
    }

    pub fn len(&self) -> usize {
        self.heap.iter().filter(|e| !self.cancelled.contains(&e.id)).count()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
