//! Fixed-geometry calendar ring.
//!
//! [`CalendarCore`] spreads events over `2^log_num_bins` buckets of
//! `2^log_bin_size` time units each; one revolution of the ring covers a
//! "year" of `bin_size * num_bins` time units. An event's bucket depends only
//! on its time modulo the year length, so a bucket interleaves events of the
//! current year with events of later years; the pop cursor skips heads that
//! belong to a later year, and those wait one full revolution per year of
//! distance.
//!
//! ```text
//!   slot(t) = (t & (year_length - 1)) >> log_bin_size
//!
//!   bins:  [ 0 ][ 1 ][ 2 ][ 3 ] ... [N-1]      year k covers
//!                 ^                             [k*Y, (k+1)*Y)
//!             curr_bin --> advances rightward; wrapping to 0 moves
//!                          next_year_start forward by one year length
//! ```
//!
//! # Invariants
//!
//! - `curr_bin < num_bins`; bin size and bin count are powers of two.
//! - `last_popped <= e.time()` for every queued event (causality).
//! - `next_year_start` is a multiple of the year length and exceeds
//!   `last_popped`.
//! - An event whose time equals `next_year_start` belongs to the next year;
//!   the boundary is strict.
//! - `num_events` equals the total events across all buckets.
//!
//! # Complexity
//!
//! `push` is O(events already in the target bucket); `pop` is O(buckets
//! advanced). With geometry tuned to ~2 events per bucket near the cursor
//! (see `queue`), both are amortized O(1).

use std::ptr::NonNull;

use crate::event::EventNode;
use crate::list::EventList;

/// Largest allowed `log_bin_size + log_num_bins`, so year arithmetic stays
/// comfortably inside `u64`.
pub(crate) const MAX_YEAR_LOG: u32 = 62;

/// Per-pop probe statistics, accumulated by [`CalendarCore::pop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopStats {
    /// Buckets the cursor advanced past (empty, or head in a later year).
    pub probes: u64,
    /// Later-year heads encountered while scanning.
    pub future_events: u64,
}

pub struct CalendarCore<E: EventNode> {
    bins: Box<[EventList<E>]>,

    log_bin_size: u32,
    log_num_bins: u32,
    /// `year_length - 1`: the mask that reduces a time into the ring.
    year_mask: u64,

    curr_bin: usize,
    next_year_start: u64,
    last_popped: u64,
    num_events: u64,
}

impl<E: EventNode> CalendarCore<E> {
    /// Build an empty ring with the cursor aligned on `start_time`.
    ///
    /// # Panics
    ///
    /// If `log_num_bins == 0` or the geometry would overflow the year
    /// arithmetic.
    pub fn new(log_bin_size: u32, log_num_bins: u32, start_time: u64) -> Self {
        assert!(log_num_bins >= 1, "a calendar needs at least two buckets");
        assert!(
            log_bin_size + log_num_bins <= MAX_YEAR_LOG,
            "year length would overflow: log_bin_size={log_bin_size} log_num_bins={log_num_bins}"
        );

        let year_log = log_bin_size + log_num_bins;
        let num_bins = 1usize << log_num_bins;
        let year_mask = (1u64 << year_log) - 1;

        let bins = (0..num_bins)
            .map(|_| EventList::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let next_year_start = ((start_time >> year_log) + 1) << year_log;
        tracing::debug!(
            num_bins,
            bin_size = 1u64 << log_bin_size,
            start_time,
            next_year_start,
            "new calendar core"
        );

        Self {
            bins,
            log_bin_size,
            log_num_bins,
            year_mask,
            curr_bin: ((start_time & year_mask) >> log_bin_size) as usize,
            next_year_start,
            last_popped: start_time,
            num_events: 0,
        }
    }

    #[inline]
    fn slot(&self, time: u64) -> usize {
        ((time & self.year_mask) >> self.log_bin_size) as usize
    }

    /// Schedule an event.
    ///
    /// # Panics
    ///
    /// On a causality violation: the event's time precedes the time of the
    /// most recently popped event.
    pub fn push(&mut self, event: Box<E>) {
        assert!(
            event.time() >= self.last_popped,
            "causality violation: pushing t={} behind current time {}",
            event.time(),
            self.last_popped
        );

        self.num_events += 1;
        let slot = self.slot(event.time());
        self.bins[slot].push(event);
    }

    /// Extract the earliest queueable event, metering the scan into `stats`.
    ///
    /// Returns `None` only when the ring holds no events at all.
    pub fn pop(&mut self, stats: &mut PopStats) -> Option<Box<E>> {
        if self.num_events == 0 {
            return None;
        }
        self.num_events -= 1;

        // Some queued event is reachable within a bounded number of
        // revolutions, so the scan terminates.
        loop {
            if let Some(min_time) = self.bins[self.curr_bin].min_time() {
                if min_time < self.next_year_start {
                    debug_assert!(self.last_popped <= min_time);
                    self.last_popped = min_time;
                    return self.bins[self.curr_bin].pop();
                }
                // Head belongs to a later year; it waits a revolution.
                stats.future_events += 1;
            }

            stats.probes += 1;
            self.curr_bin += 1;
            if self.curr_bin == self.bins.len() {
                self.curr_bin = 0;
                self.next_year_start += self.year_mask + 1;
            }
        }
    }

    /// Unlink the event identified by address, returning it when found.
    ///
    /// The event's time locates its bucket, so only one list is scanned.
    ///
    /// # Safety
    ///
    /// `target` must point to a live event: either queued in this ring or
    /// still owned by the caller. The time is read through the pointer to
    /// pick the bucket, so a stale pointer to a dropped event is undefined
    /// behavior.
    pub unsafe fn remove(&mut self, target: NonNull<E>) -> Option<Box<E>> {
        // SAFETY: live per the caller contract.
        let time = unsafe { target.as_ref() }.time();

        let slot = self.slot(time);
        let removed = self.bins[slot].remove(target);
        if removed.is_some() {
            self.num_events -= 1;
        }
        removed
    }

    /// Drain every bucket of `source` into `self`; `source` ends empty.
    ///
    /// Buckets are drained directly rather than through `source.pop`, which
    /// would advance the source cursor and corrupt its notion of "now".
    /// A bucket pops newest-first within a time and `push` inserts ahead of
    /// equal-time peers, so each bucket is re-pushed in reverse drain order
    /// to keep tie order identical across the migration.
    pub fn consume(&mut self, source: &mut CalendarCore<E>) {
        let mut drained = Vec::new();
        for bin in source.bins.iter_mut() {
            debug_assert!(drained.is_empty());
            while let Some(event) = bin.pop() {
                drained.push(event);
            }
            while let Some(event) = drained.pop() {
                self.push(event);
            }
        }
        source.num_events = 0;
    }

    /// The time of the most recently popped event (the ring's "now").
    ///
    /// There is deliberately no "peek at the minimum" accessor: answering it
    /// would advance the cursor past "now", and an event with the same stamp
    /// may still be pushed.
    #[inline]
    pub fn current_time(&self) -> u64 {
        self.last_popped
    }

    #[inline]
    pub fn year_length(&self) -> u64 {
        self.year_mask + 1
    }

    #[inline]
    pub fn log_bin_size(&self) -> u32 {
        self.log_bin_size
    }

    #[inline]
    pub fn log_num_bins(&self) -> u32 {
        self.log_num_bins
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    pub fn num_events(&self) -> u64 {
        self.num_events
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_events == 0
    }

    /// Panic if the ring violates its invariants. Debug and test builds only.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) {
        assert!(self.curr_bin < self.bins.len());
        assert!(self.next_year_start > self.last_popped);
        assert!(self.next_year_start & self.year_mask == 0);

        for (i, bin) in self.bins.iter().enumerate() {
            bin.check_invariants(self.num_events + 1);
            if let Some(t) = bin.min_time() {
                assert!(self.slot(t) == i, "event in wrong bucket");
                assert!(self.last_popped <= t, "queued event behind current time");
            }
        }
    }
}
