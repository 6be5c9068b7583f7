//! Control-path timer wheel for self-rearming automation.
//!
//! Tasks are kept in a min-heap keyed by their due context time. `poll(now)`
//! fires every due task; a task answers with the delay until its next firing
//! (or `None` to retire). Each entry carries its layer's [`CancelToken`]: a
//! cancelled entry never fires again and is dropped on the next poll.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rtrb::Producer;
use soundscapes_core::param::ParamEvent;

use crate::graph::{Command, ParamTarget};
use crate::layer::{CancelToken, LayerId};
use crate::nodes::BurstShape;

/// Shortest allowed re-arm delay, seconds.
pub const MIN_REARM: f64 = 0.001;

/// What a firing task may touch: the clock, the RNG and the command queue.
pub struct Control<'a> {
    now: f64,
    commands: &'a mut Producer<Command>,
    rng: &'a mut StdRng,
}

impl<'a> Control<'a> {
    pub fn new(now: f64, commands: &'a mut Producer<Command>, rng: &'a mut StdRng) -> Self {
        Self { now, commands, rng }
    }

    #[inline] pub fn now(&self) -> f64 { self.now }
    #[inline] pub fn rng(&mut self) -> &mut StdRng { self.rng }

    /// Push a command; `false` when the queue is full.
    pub fn send(&mut self, cmd: Command) -> bool {
        match self.commands.push(cmd) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(command = ?e, "command queue full, dropping automation");
                false
            }
        }
    }

    pub fn automate(&mut self, layer: LayerId, target: ParamTarget, event: ParamEvent) -> bool {
        self.send(Command::Automate { layer, target, event })
    }

    pub fn cancel(&mut self, layer: LayerId, target: ParamTarget, from: f64) -> bool {
        self.send(Command::Cancel { layer, target, from })
    }

    pub fn trigger(&mut self, layer: LayerId, shape: BurstShape) -> bool {
        self.send(Command::Trigger { layer, shape })
    }
}

/// A cancellable repeating task.
pub trait RepeatingTask: Send {
    /// Do one round of work; return the delay in seconds until the next one.
    fn fire(&mut self, cx: &mut Control<'_>) -> Option<f64>;
}

struct Entry {
    due: f64,
    seq: u64,
    token: CancelToken,
    task: Box<dyn RepeatingTask>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // reversed: BinaryHeap is a max-heap, the earliest entry must be on top
    fn cmp(&self, other: &Self) -> Ordering {
        other.due.total_cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
pub struct Scheduler {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.heap.len())
            .field("next_due", &self.next_due())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, token: CancelToken, task: Box<dyn RepeatingTask>) {
        let seq = self.next_seq();
        self.heap.push(Entry { due, seq, token, task });
    }

    #[inline]
    fn next_seq(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Fire everything due at or before `now`. Returns how many tasks fired.
    pub fn poll(&mut self, now: f64, commands: &mut Producer<Command>, rng: &mut StdRng) -> usize {
        let mut fired = 0;
        while self.heap.peek().map_or(false, |e| e.due <= now) {
            let Some(mut entry) = self.heap.pop() else { break };
            if entry.token.is_cancelled() {
                continue;
            }
            let mut cx = Control::new(now, commands, rng);
            let next = entry.task.fire(&mut cx);
            fired += 1;
            if let Some(delay) = next {
                entry.due = now + delay.max(MIN_REARM);
                entry.seq = self.next_seq();
                self.heap.push(entry);
            }
        }
        fired
    }

    /// Drop every cancelled entry.
    pub fn purge(&mut self) {
        self.heap.retain(|e| !e.token.is_cancelled());
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Entries still in the heap (cancelled ones included until purged).
    #[inline]
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn next_due(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.due)
    }
}
