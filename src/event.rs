//! Event contract for the calendar queue.
//!
//! Queued events are linked intrusively: each event embeds an [`EventLink`]
//! and implements [`EventNode`] to expose it. The queue threads events onto
//! its per-bucket lists through the link they already carry, so a push never
//! allocates.
//!
//! # Ownership
//!
//! The queue takes `Box<E>` on push and hands the box back on pop or remove.
//! While an event is queued, the queue owns it; dropping the queue drops
//! every event still inside. Callers that want to remove an event later
//! capture its address (`NonNull::from(&mut *boxed)`) before pushing: the
//! allocation is stable for the event's whole queued lifetime, so the pointer
//! is its identity.

use std::ptr::NonNull;

/// Intrusive link embedded in queue events.
///
/// A tail node's `next` is `None`, which would be indistinguishable from an
/// unlinked node, so membership is tracked with a separate flag.
#[derive(Debug)]
pub struct EventLink<E> {
    next: Option<NonNull<E>>,
    linked: bool,
}

impl<E> EventLink<E> {
    pub const fn new() -> Self {
        Self {
            next: None,
            linked: false,
        }
    }

    /// Returns `true` if this event is not in any queue.
    #[inline]
    pub fn is_unlinked(&self) -> bool {
        !self.linked
    }

    #[inline]
    pub(crate) fn next(&self) -> Option<NonNull<E>> {
        self.next
    }

    /// Install a successor and mark the node linked.
    #[inline]
    pub(crate) fn set_next(&mut self, next: Option<NonNull<E>>) {
        self.next = next;
        self.linked = true;
    }

    /// Clear link state when the node leaves a list.
    #[inline]
    pub(crate) fn unlink(&mut self) {
        self.next = None;
        self.linked = false;

        assert!(self.is_unlinked());
    }
}

impl<E> Default for EventLink<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Contract for types schedulable on a calendar queue.
///
/// Implementors embed an [`EventLink`] field and expose it through the two
/// accessors. `time` must stay constant while the event is queued; to change
/// it, remove the event and push it again.
pub trait EventNode: Sized {
    /// Scheduled firing time.
    fn time(&self) -> u64;

    fn link(&self) -> &EventLink<Self>;

    fn link_mut(&mut self) -> &mut EventLink<Self>;

    /// Optional hardware prefetch hint for implementations whose events are
    /// large or cold; the default does nothing.
    #[inline]
    fn prefetch(&self) {}
}

/// Ready-made event carrying an arbitrary payload.
///
/// Callers with their own event type implement [`EventNode`] directly; this
/// covers the common case where the payload cannot embed a link itself.
#[derive(Debug)]
pub struct TimedEvent<T> {
    time: u64,
    link: EventLink<Self>,
    pub payload: T,
}

impl<T> TimedEvent<T> {
    pub fn new(time: u64, payload: T) -> Box<Self> {
        Box::new(Self {
            time,
            link: EventLink::new(),
            payload,
        })
    }
}

impl<T> EventNode for TimedEvent<T> {
    #[inline]
    fn time(&self) -> u64 {
        self.time
    }

    #[inline]
    fn link(&self) -> &EventLink<Self> {
        &self.link
    }

    #[inline]
    fn link_mut(&mut self) -> &mut EventLink<Self> {
        &mut self.link
    }
}
