//! Self-tuning calendar queue.
//!
//! [`CalendarQueue`] wraps a [`CalendarCore`] and rebuilds it with fresh
//! geometry when pop-time statistics drift. The densest region of a
//! simulation's event set sits at the current time for any generator without
//! an explicit time dependence, so the tuner aims the ring at that region:
//!
//! - the **probe sum** (buckets advanced per pop) steers the bin width
//!   toward ~2 advances per pop, i.e. about two buckets per live event near
//!   the cursor;
//! - the **future-event sum** (later-year heads sighted per pop) steers the
//!   year length toward ~1/2 sighting per pop, keeping revolutions cheap.
//!
//! A check runs every `num_bins` pops. Both adjustments are found by a
//! shift-and-compare search for the power of two that lands the sum's
//! quotient in `1..=3` relative to the bucket count; the bucket count then
//! absorbs the difference between the two. Rebuilds migrate every event into
//! the new ring and preserve the current time, so a resize is invisible in
//! the popped event stream.

use std::ptr::NonNull;

use crate::core::{CalendarCore, PopStats, MAX_YEAR_LOG};
use crate::event::EventNode;

/// Quotient of `sum` by `2^shift`, where a negative `shift` multiplies
/// instead of dividing. Saturates instead of overflowing, which is enough
/// for the `1..=3` window comparisons of the tuner.
fn scaled(sum: u64, shift: i32) -> u64 {
    if shift >= 0 {
        if shift >= 64 {
            0
        } else {
            sum >> shift
        }
    } else {
        let up = (-shift) as u32;
        if up >= 64 || sum.leading_zeros() < up {
            u64::MAX
        } else {
            sum << up
        }
    }
}

/// Dynamic calendar priority queue.
///
/// See the [module docs](self) for the tuning scheme and the crate docs for
/// the event contract.
pub struct CalendarQueue<E: EventNode> {
    core: CalendarCore<E>,
    stats: PopStats,
    pop_counter: u64,
}

impl<E: EventNode> CalendarQueue<E> {
    /// Create a queue whose cursor starts at `start_time`.
    ///
    /// `init_log_num_events` is a capacity hint: the initial ring has
    /// `2^(init_log_num_events + 1)` buckets of one time unit each, two
    /// buckets per expected event. The tuner corrects a poor hint after the
    /// first `num_bins` pops.
    pub fn new(start_time: u64, init_log_num_events: u32) -> Self {
        Self {
            core: CalendarCore::new(0, init_log_num_events + 1, start_time),
            stats: PopStats::default(),
            pop_counter: 0,
        }
    }

    /// Schedule an event; returns the new total event count.
    ///
    /// # Panics
    ///
    /// On a causality violation (`event.time()` precedes [`current_time`])
    /// or when the event is already linked into a queue.
    ///
    /// [`current_time`]: Self::current_time
    pub fn push(&mut self, event: Box<E>) -> u64 {
        self.core.push(event);
        self.core.num_events()
    }

    /// Extract the earliest event, or `None` when the queue is empty.
    ///
    /// Every call counts toward the resize check, which runs once per
    /// `num_bins` pops and then clears the accumulated statistics whether or
    /// not the geometry changed.
    pub fn pop(&mut self) -> Option<Box<E>> {
        let event = self.core.pop(&mut self.stats);

        self.pop_counter += 1;
        if self.pop_counter == self.core.num_bins() as u64 {
            self.maybe_resize();
            self.stats = PopStats::default();
            self.pop_counter = 0;
        }

        event
    }

    /// Unlink the event identified by address, returning it when found.
    ///
    /// # Safety
    ///
    /// `target` must point to a live event: either queued here or still
    /// owned by the caller. Events keep their address for their whole queued
    /// lifetime (resizes move pointers, not allocations), so a pointer
    /// captured before `push` stays valid until the event is popped, removed,
    /// or the queue is dropped.
    pub unsafe fn remove(&mut self, target: NonNull<E>) -> Option<Box<E>> {
        // SAFETY: forwarded caller contract.
        unsafe { self.core.remove(target) }
    }

    /// The time of the most recently popped event.
    #[inline]
    pub fn current_time(&self) -> u64 {
        self.core.current_time()
    }

    #[inline]
    pub fn num_events(&self) -> u64 {
        self.core.num_events()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.core.is_empty()
    }

    /// Current bucket count; changes when the tuner resizes the ring.
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.core.num_bins()
    }

    #[inline]
    pub fn year_length(&self) -> u64 {
        self.core.year_length()
    }

    #[inline]
    pub fn log_bin_size(&self) -> u32 {
        self.core.log_bin_size()
    }

    #[inline]
    pub fn log_num_bins(&self) -> u32 {
        self.core.log_num_bins()
    }

    fn maybe_resize(&mut self) {
        let log_bin_size = self.core.log_bin_size() as i32;
        let log_num_bins = self.core.log_num_bins() as i32;

        tracing::trace!(
            probes = self.stats.probes,
            future_events = self.stats.future_events,
            num_bins = self.core.num_bins(),
            "resize check"
        );

        // Bin width: land the probe sum's quotient by the bucket count in
        // 1..=3, i.e. ~2 cursor advances per pop. A zero sum would walk the
        // search down forever; the floor is a bin size of one time unit.
        let mut bin_change: i32 = 0;
        while scaled(self.stats.probes, log_num_bins + bin_change) == 0
            && log_bin_size + bin_change > 0
        {
            bin_change -= 1;
        }
        while scaled(self.stats.probes, log_num_bins + bin_change) > 3 {
            bin_change += 1;
        }

        // Year length: the same search on future-year sightings, targeting a
        // quarter of the bucket count (~1/2 sighting per pop). The floor
        // keeps the resulting ring at two buckets or more.
        let mut year_change: i32 = 0;
        while scaled(self.stats.future_events, log_num_bins - 2 + year_change) == 0
            && log_num_bins + year_change - bin_change > 1
        {
            year_change -= 1;
        }
        while scaled(self.stats.future_events, log_num_bins - 2 + year_change) > 3 {
            year_change += 1;
        }

        // Bin width and year length were tuned independently; the bucket
        // count absorbs the difference.
        let bins_change = year_change - bin_change;

        let new_log_bin_size = (log_bin_size + bin_change).clamp(0, MAX_YEAR_LOG as i32 - 1);
        let new_log_num_bins =
            (log_num_bins + bins_change).clamp(1, MAX_YEAR_LOG as i32 - new_log_bin_size);

        if new_log_bin_size == log_bin_size && new_log_num_bins == log_num_bins {
            return;
        }

        tracing::debug!(
            probes = self.stats.probes,
            future_events = self.stats.future_events,
            bin_size = 1u64 << new_log_bin_size,
            num_bins = 1usize << new_log_num_bins,
            "calendar resize"
        );

        let mut next = CalendarCore::new(
            new_log_bin_size as u32,
            new_log_num_bins as u32,
            self.core.current_time(),
        );
        next.consume(&mut self.core);
        self.core = next;
    }
}

impl<E: EventNode> Default for CalendarQueue<E> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TimedEvent;

    type Queue = CalendarQueue<TimedEvent<u32>>;

    fn drain_times(q: &mut Queue) -> Vec<u64> {
        let mut times = Vec::new();
        while let Some(e) = q.pop() {
            times.push(e.time());
        }
        times
    }

    // ==================== Basic Contract ====================

    #[test]
    fn fresh_queue_pops_none() {
        let mut q = Queue::default();

        assert!(q.pop().is_none());
        assert_eq!(q.num_events(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn push_returns_running_count() {
        let mut q = Queue::default();

        assert_eq!(q.push(TimedEvent::new(1, 0)), 1);
        assert_eq!(q.push(TimedEvent::new(2, 1)), 2);
        assert_eq!(q.push(TimedEvent::new(2, 2)), 3);
        assert_eq!(q.num_events(), 3);
    }

    #[test]
    fn default_geometry_is_two_unit_buckets() {
        let q = Queue::default();

        assert_eq!(q.num_bins(), 2);
        assert_eq!(q.log_bin_size(), 0);
        assert_eq!(q.year_length(), 2);
    }

    #[test]
    fn causal_refill_advances_in_lockstep() {
        let mut q = Queue::default();
        for id in 0..3 {
            q.push(TimedEvent::new(10, id));
        }

        let mut popped = Vec::new();
        for _ in 0..10 {
            let e = q.pop().expect("refilled");
            popped.push(e.time());
            q.push(TimedEvent::new(e.time() + 1, e.payload));
        }

        assert_eq!(popped, vec![10, 10, 10, 11, 11, 11, 12, 12, 12, 13]);
        assert_eq!(q.num_events(), 3);
    }

    // ==================== Remove ====================

    #[test]
    fn remove_is_by_identity_not_time() {
        let mut q: CalendarQueue<TimedEvent<&str>> = CalendarQueue::default();

        q.push(TimedEvent::new(5, "a"));
        let mut b = TimedEvent::new(5, "b");
        let b_ptr = NonNull::from(&mut *b);
        q.push(b);
        q.push(TimedEvent::new(5, "c"));
        assert_eq!(q.num_events(), 3);

        let b = unsafe { q.remove(b_ptr) }.expect("queued");
        assert_eq!(b.payload, "b");
        assert_eq!(q.num_events(), 2);

        // The box is back with the caller; a second remove misses.
        let mut b = b;
        let b_ptr = NonNull::from(&mut *b);
        assert!(unsafe { q.remove(b_ptr) }.is_none());

        // Same-time events pop newest-first.
        assert_eq!(q.pop().expect("queued").payload, "c");
        assert_eq!(q.pop().expect("queued").payload, "a");
        assert!(q.pop().is_none());
    }

    #[test]
    fn handles_survive_resizes() {
        let mut q = Queue::default();

        let mut marked = TimedEvent::new(50_000, u32::MAX);
        let marked_ptr = NonNull::from(&mut *marked);
        q.push(marked);
        for i in 0..100u64 {
            q.push(TimedEvent::new(i * 1_000, i as u32));
        }

        // Enough pops to run several resize checks on this workload.
        let before = q.num_bins();
        let mut resized = false;
        for _ in 0..30 {
            q.pop().expect("queued");
            resized |= q.num_bins() != before;
        }
        assert!(resized, "workload was chosen to force a resize");

        let marked = unsafe { q.remove(marked_ptr) }.expect("still queued");
        assert_eq!(marked.payload, u32::MAX);
    }

    // ==================== Tuning ====================

    #[test]
    fn spread_workload_grows_the_ring() {
        let mut q = Queue::default();
        for i in 0..1_000u64 {
            q.push(TimedEvent::new((i * 999_983) % 1_000_000, i as u32));
        }

        let mut grew = false;
        let mut last = 0;
        let mut popped = 0u64;
        while let Some(e) = q.pop() {
            assert!(e.time() >= last, "pop order regressed");
            last = e.time();
            popped += 1;
            if q.num_bins() > 2 {
                grew = true;
            }
        }

        assert_eq!(popped, 1_000);
        assert!(grew, "ring never grew past the minimum geometry");
    }

    #[test]
    fn idle_queue_shrinks_to_minimum_geometry() {
        let mut q = Queue::new(0, 9);
        assert_eq!(q.num_bins(), 1 << 10);

        // Empty pops still feed the tuner; with zero probe statistics the
        // search walks down to its floor.
        for _ in 0..(1 << 10) {
            assert!(q.pop().is_none());
        }

        assert_eq!(q.num_bins(), 2);
        assert_eq!(q.log_bin_size(), 0);
    }

    #[test]
    fn resizes_do_not_change_the_stream() {
        // Same workload, once with a tiny initial ring (many resizes) and
        // once with a comfortable hint (few, if any).
        let times: Vec<u64> = (0..500).map(|i| (i * 7_919) % 60_000).collect();

        let mut small = Queue::new(0, 0);
        let mut roomy = Queue::new(0, 8);
        for (i, &t) in times.iter().enumerate() {
            small.push(TimedEvent::new(t, i as u32));
            roomy.push(TimedEvent::new(t, i as u32));
        }

        assert_eq!(drain_times(&mut small), drain_times(&mut roomy));
    }

    // ==================== scaled() ====================

    #[test]
    fn scaled_matches_shift_semantics() {
        assert_eq!(scaled(40, 3), 5);
        assert_eq!(scaled(40, 0), 40);
        assert_eq!(scaled(1, 64), 0);
        assert_eq!(scaled(5, -1), 10);
        assert_eq!(scaled(0, -70), 0);
        assert_eq!(scaled(u64::MAX, -1), u64::MAX);
    }
}

#[cfg(all(test, feature = "queue-proptest"))]
#[path = "queue_tests.rs"]
mod queue_tests;
