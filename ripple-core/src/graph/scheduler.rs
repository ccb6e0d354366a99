//! Update Scheduler
//!
//! The scheduler owns the set of dirty leaf signals and drives flushes.
//!
//! # State Machine
//!
//! - **idle**: no flush is queued. The first [`mark_dirty`] moves to
//!   flush-pending and tells the caller to hand a flush to the host.
//! - **flush-pending**: a flush is queued. Further writes only join the
//!   dirty set.
//!
//! A flush returns to idle as its first step, so writes made while it runs
//! (by effects) queue a new flush instead of being absorbed silently.
//!
//! # Algorithm
//!
//! A flush repeats rounds until the dirty set stays empty:
//!
//! 1. Take the dirty set as this round's leaves and clear it.
//! 2. Commit every leaf. Leaves whose value changed seed propagation.
//! 3. Propagate along listener edges using the configured [`Propagation`]:
//!    - `Lifo`: push the listeners of changed leaves on a stack; pop and
//!      recompute; a memo whose value changed pushes its own listeners.
//!      A node reached along two paths may run twice.
//!    - `Deduplicated`: collect the reachable subgraph, order it with
//!      Kahn's algorithm, and recompute each node once, only if one of its
//!      sources changed earlier in the round.
//! 4. Effects that wrote leaf signals refilled the dirty set; loop.
//!
//! [`mark_dirty`]: Scheduler::mark_dirty

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use indexmap::IndexMap;

use super::node::NodeId;
use crate::config::Propagation;
use crate::reactive::{Commit, FlushStats, Listeners, Subscriber};

/// Dirty set and flush state for one runtime.
pub struct Scheduler {
    /// Leaf signals written since the last round, in first-write order.
    dirty: RefCell<IndexMap<NodeId, Rc<dyn Commit>>>,

    /// A flush has been handed to the host and has not started.
    flush_scheduled: Cell<bool>,

    /// A flush is running on this thread.
    flushing: Cell<bool>,

    propagation: Cell<Propagation>,

    stats: Cell<FlushStats>,
}

impl Scheduler {
    pub(crate) fn new(propagation: Propagation) -> Self {
        Self {
            dirty: RefCell::new(IndexMap::new()),
            flush_scheduled: Cell::new(false),
            flushing: Cell::new(false),
            propagation: Cell::new(propagation),
            stats: Cell::new(FlushStats::default()),
        }
    }

    /// Add a leaf to the dirty set.
    ///
    /// Returns `true` when this call moved the scheduler from idle to
    /// flush-pending; the caller must then defer a flush.
    pub(crate) fn mark_dirty(&self, leaf: Rc<dyn Commit>) -> bool {
        self.dirty.borrow_mut().entry(leaf.id()).or_insert(leaf);
        if self.flush_scheduled.get() {
            return false;
        }
        self.flush_scheduled.set(true);
        true
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled.get()
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Number of leaf signals waiting for the next round.
    pub fn dirty_count(&self) -> usize {
        self.dirty.borrow().len()
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation.get()
    }

    pub(crate) fn set_propagation(&self, propagation: Propagation) {
        self.propagation.set(propagation);
    }

    pub fn stats(&self) -> FlushStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut FlushStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Run one flush: commit and propagate until no leaf is dirty.
    ///
    /// Runs to completion. A panicking memo or effect body unwinds out of
    /// here; leaves of later rounds stay in the dirty set.
    pub(crate) fn flush(&self) {
        self.flush_scheduled.set(false);
        let _flushing = FlushingGuard::enter(&self.flushing);
        let _span = tracing::debug_span!("flush").entered();
        self.bump(|stats| stats.flushes += 1);

        let mut rounds = 0_u64;
        loop {
            let round = std::mem::take(&mut *self.dirty.borrow_mut());
            if round.is_empty() {
                break;
            }
            rounds += 1;
            self.bump(|stats| stats.rounds += 1);

            let mut changed: Vec<Rc<dyn Commit>> = Vec::with_capacity(round.len());
            for (id, leaf) in round {
                if leaf.commit() {
                    tracing::trace!(node = %id, kind = %leaf.kind(), "committed");
                    changed.push(leaf);
                } else {
                    tracing::trace!(node = %id, "commit was a no-op");
                }
            }
            self.bump(|stats| stats.commits += changed.len() as u64);

            match self.propagation.get() {
                Propagation::Lifo => self.propagate_lifo(&changed),
                Propagation::Deduplicated => self.propagate_deduplicated(&changed),
            }
        }

        tracing::debug!(rounds, "flush complete");
    }

    fn propagate_lifo(&self, changed: &[Rc<dyn Commit>]) {
        let mut stack: Vec<Rc<dyn Subscriber>> = changed
            .iter()
            .flat_map(|leaf| leaf.listeners())
            .collect();

        while let Some(node) = stack.pop() {
            if self.recompute(&node) {
                stack.extend(node.downstream());
            }
        }
    }

    fn propagate_deduplicated(&self, changed: &[Rc<dyn Commit>]) {
        let mut changed_ids: HashSet<NodeId> = changed.iter().map(|leaf| leaf.id()).collect();

        // Reachable subgraph, with each node's listeners as of now.
        let mut reachable: IndexMap<NodeId, Rc<dyn Subscriber>> = IndexMap::new();
        let mut edges: HashMap<NodeId, Listeners> = HashMap::new();
        let mut queue: VecDeque<Rc<dyn Subscriber>> = changed
            .iter()
            .flat_map(|leaf| leaf.listeners())
            .collect();

        while let Some(node) = queue.pop_front() {
            let id = node.subscriber_id();
            if reachable.contains_key(&id) {
                continue;
            }
            let downstream = node.downstream();
            queue.extend(downstream.iter().cloned());
            edges.insert(id, downstream);
            reachable.insert(id, node);
        }

        // Kahn's algorithm over the reachable subgraph.
        let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(reachable.len());
        let mut ready = VecDeque::new();
        for (&id, node) in &reachable {
            let degree = node
                .source_ids()
                .iter()
                .filter(|source| reachable.contains_key(*source))
                .count();
            in_degree.insert(id, degree);
            if degree == 0 {
                ready.push_back(id);
            }
        }

        while let Some(id) = ready.pop_front() {
            let Some(node) = reachable.get(&id) else {
                continue;
            };

            let stale = node
                .source_ids()
                .iter()
                .any(|source| changed_ids.contains(source));
            if stale && self.recompute(node) {
                changed_ids.insert(id);
            }

            for next in edges.get(&id).into_iter().flatten() {
                let next_id = next.subscriber_id();
                if let Some(degree) = in_degree.get_mut(&next_id) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push_back(next_id);
                    }
                }
            }
        }
    }

    fn recompute(&self, node: &Rc<dyn Subscriber>) -> bool {
        tracing::trace!(node = %node.subscriber_id(), kind = %node.subscriber_kind(), "recompute");
        self.bump(|stats| stats.recomputes += 1);
        Rc::clone(node).recompute()
    }
}

/// Sets the `flushing` flag for one flush and restores its previous value
/// when the flush ends, including by unwinding. A flush started by a body
/// draining the host from inside another flush leaves the flag set.
struct FlushingGuard<'a> {
    flag: &'a Cell<bool>,
    saved: bool,
}

impl<'a> FlushingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let saved = flag.replace(true);
        Self { flag, saved }
    }
}

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::{configure, run_until_idle, with_runtime, Effect, Memo, Signal};
    use std::cell::RefCell;

    #[test]
    fn mark_dirty_requests_one_flush_per_idle_period() {
        let scheduler = Scheduler::new(Propagation::Lifo);
        let a = Signal::new(1).unwrap();
        let b = Signal::new(2).unwrap();

        assert!(scheduler.mark_dirty(a.commit_handle()));
        assert!(!scheduler.mark_dirty(b.commit_handle()));
        assert!(!scheduler.mark_dirty(a.commit_handle()));
        assert_eq!(scheduler.dirty_count(), 2);
        assert!(scheduler.is_flush_scheduled());

        scheduler.flush();
        assert!(!scheduler.is_flush_scheduled());
        assert!(!scheduler.is_flushing());
        assert_eq!(scheduler.dirty_count(), 0);
        assert!(scheduler.mark_dirty(a.commit_handle()));
    }

    #[test]
    fn write_during_flush_schedules_a_new_flush() {
        let source = Signal::new(0).unwrap();
        let echo = Signal::new(0).unwrap();
        let seen_pending = Rc::new(RefCell::new(Vec::new()));

        let (s, e, seen) = (source.clone(), echo.clone(), Rc::clone(&seen_pending));
        let _effect = Effect::new(move || {
            let value = s.get();
            e.set(value * 10);
            seen.borrow_mut()
                .push(with_runtime(|rt| rt.scheduler.is_flush_scheduled()));
        })
        .unwrap();
        run_until_idle();
        seen_pending.borrow_mut().clear();

        source.set(1);
        run_until_idle();

        assert_eq!(echo.get(), 10);
        // The effect's write happened mid-flush and queued a fresh flush.
        assert_eq!(*seen_pending.borrow(), vec![true]);
    }

    #[test]
    fn effect_writes_are_committed_in_a_later_round() {
        let count = Signal::new(1).unwrap();
        let doubled = Signal::new(2).unwrap();
        let observed = Rc::new(RefCell::new(Vec::new()));

        let (c, d) = (count.clone(), doubled.clone());
        Effect::new(move || d.set(c.get() * 2)).unwrap();

        let (d, log) = (doubled.clone(), Rc::clone(&observed));
        Effect::new(move || log.borrow_mut().push(d.get())).unwrap();

        let before = with_runtime(|rt| rt.scheduler.stats());
        count.set(4);
        run_until_idle();
        let after = with_runtime(|rt| rt.scheduler.stats());

        assert_eq!(*observed.borrow(), vec![2, 8]);
        assert!(after.rounds - before.rounds >= 2);
    }

    #[test]
    fn unchanged_memo_stops_propagation() {
        let input = Signal::new(3).unwrap();
        let runs = Rc::new(RefCell::new(0));

        let i = input.clone();
        let parity = Memo::new(move || i.get() % 2).unwrap();

        let (p, r) = (parity.clone(), Rc::clone(&runs));
        Effect::new(move || {
            p.get();
            *r.borrow_mut() += 1;
        })
        .unwrap();

        input.set(5);
        run_until_idle();

        assert_eq!(*runs.borrow(), 1);
        assert_eq!(parity.dependencies(), vec![input.id()]);
    }

    #[test]
    fn nested_flush_keeps_outer_flush_busy() {
        let source = Signal::new(0).unwrap();
        let echo = Signal::new(0).unwrap();
        let observed = Rc::new(RefCell::new(Vec::new()));

        let (s, e, log) = (source.clone(), echo.clone(), Rc::clone(&observed));
        Effect::new(move || {
            let value = s.get();
            if value > 0 {
                e.set(value);
                run_until_idle();
                let flushing = with_runtime(|rt| rt.scheduler.is_flushing());
                let busy = configure(RuntimeConfig::default()).is_err();
                log.borrow_mut().push((flushing, busy));
            }
        })
        .unwrap();

        source.set(3);
        run_until_idle();

        assert_eq!(echo.get(), 3);
        assert_eq!(*observed.borrow(), vec![(true, true)]);
        assert!(!with_runtime(|rt| rt.scheduler.is_flushing()));
    }
}
