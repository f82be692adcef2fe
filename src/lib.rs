//! Dynamic calendar priority queue for discrete-event simulation.
//!
//! A simulation driver repeatedly pops the event with the smallest scheduled
//! time, processes it, and pushes follow-up events at or after the current
//! time. This crate implements that queue as a calendar: a power-of-two ring
//! of buckets, each holding a sorted intrusive list of events, with a cursor
//! that sweeps the ring year by year. A self-tuning wrapper watches pop-time
//! statistics and rebuilds the ring geometry so that roughly two buckets
//! cover each live event near the current time, which keeps push and pop
//! amortized O(1) even with millions of queued events.
//!
//! Layering, leaves first:
//! 1. [`EventList`]: one bucket, a sorted, sentinel-free, singly-linked
//!    intrusive list.
//! 2. [`CalendarCore`]: the fixed-geometry ring with slot masking, cursor
//!    advance, year wrap, and bulk migration.
//! 3. [`CalendarQueue`]: the tuner with probe statistics, periodic geometry
//!    checks, and rebuild-and-consume resizes.
//!
//! Events are intrusive: the caller's type embeds an [`EventLink`] and
//! implements [`EventNode`], so pushes never allocate. [`TimedEvent`] is a
//! ready-made implementation for payloads that cannot carry a link.
//!
//! ```
//! use calq_rs::{CalendarQueue, EventNode, TimedEvent};
//!
//! let mut queue: CalendarQueue<TimedEvent<&str>> = CalendarQueue::default();
//! queue.push(TimedEvent::new(3, "timeout"));
//! queue.push(TimedEvent::new(1, "arrival"));
//!
//! let first = queue.pop().expect("two events queued");
//! assert_eq!((first.time(), first.payload), (1, "arrival"));
//! ```
//!
//! Time is a plain `u64` tick count; what a tick means is the driver's
//! business. The queue is single-owner and single-threaded by design:
//! shard by event key and run independent queues to parallelize.

pub mod core;
pub mod event;
pub mod list;
pub mod queue;
// Only exercised by the feature-gated property suite.
#[allow(dead_code)]
#[cfg(test)]
pub mod test_utils;

pub use crate::core::{CalendarCore, PopStats};
pub use crate::event::{EventLink, EventNode, TimedEvent};
pub use crate::list::EventList;
pub use crate::queue::CalendarQueue;
