//! Sorted intrusive event list: the contents of one calendar bucket.
//!
//! Singly linked through each event's embedded [`EventLink`], no sentinel,
//! ordered by non-decreasing time. The list is deliberately minimal: the
//! calendar core tracks counts and picks buckets; this type only keeps one
//! bucket sorted and hands events in and out.
//!
//! # Tie policy
//!
//! An event is inserted before the first entry whose time is greater than or
//! equal to its own. Events sharing a time therefore pop newest-first; the
//! policy is stable and callers that need FIFO ties must disambiguate in
//! their own time stamps.
//!
//! # Safety
//!
//! The list owns its events as `Box<E>`: `push` leaks the box into the link
//! chain and `pop`/`remove`/`Drop` reconstitute it. Every pointer reachable
//! from `head` refers to a live, exclusively owned allocation, and each node
//! appears in at most one list (enforced by the link's `linked` flag).
//!
//! [`EventLink`]: crate::event::EventLink

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::event::EventNode;

pub struct EventList<E: EventNode> {
    head: Option<NonNull<E>>,
    _own: PhantomData<Box<E>>,
}

impl<E: EventNode> EventList<E> {
    pub const fn new() -> Self {
        Self {
            head: None,
            _own: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Time of the earliest event, or `None` when the bucket is empty.
    #[inline]
    pub fn min_time(&self) -> Option<u64> {
        // SAFETY: head, when present, points at a live event owned by this
        // list.
        self.head.map(|head| unsafe { head.as_ref() }.time())
    }

    /// Insert in time order.
    ///
    /// # Panics
    ///
    /// If the event is already linked into a list.
    pub fn push(&mut self, event: Box<E>) {
        assert!(
            event.link().is_unlinked(),
            "pushing already-linked event (t={})",
            event.time()
        );

        let time = event.time();
        // SAFETY: Box::into_raw never returns null.
        let mut event = unsafe { NonNull::new_unchecked(Box::into_raw(event)) };

        // Walk to the first node that sorts at or after the new event;
        // `prev` is the node to splice behind (None = insert at head).
        let mut prev: Option<NonNull<E>> = None;
        let mut cur = self.head;
        while let Some(ptr) = cur {
            // SAFETY: every node reachable from head is live; we hold
            // `&mut self`, so nothing else is walking the list.
            let node = unsafe { ptr.as_ref() };
            if node.time() >= time {
                break;
            }
            prev = cur;
            cur = node.link().next();
        }

        debug_assert!(cur != Some(event), "event already present in bucket");

        // SAFETY: `event` came from Box::into_raw above and is not aliased;
        // `prev`, when present, is a live node of this list.
        unsafe {
            event.as_mut().link_mut().set_next(cur);
            match prev {
                None => self.head = Some(event),
                Some(mut p) => p.as_mut().link_mut().set_next(Some(event)),
            }
        }
    }

    /// Remove and return the earliest event.
    pub fn pop(&mut self) -> Option<Box<E>> {
        let mut head = self.head?;

        // SAFETY: head is live and owned by this list. After relinking, no
        // list pointer reaches it, so reconstituting the box moves ownership
        // out cleanly.
        unsafe {
            self.head = head.as_ref().link().next();
            head.as_mut().link_mut().unlink();
            Some(Box::from_raw(head.as_ptr()))
        }
    }

    /// Unlink the event identified by address, returning it when found.
    ///
    /// Linear scan by pointer identity; the time ordering is not consulted.
    /// A miss walks off the end and returns `None`.
    pub fn remove(&mut self, target: NonNull<E>) -> Option<Box<E>> {
        let mut prev: Option<NonNull<E>> = None;
        let mut cur = self.head;
        while let Some(mut ptr) = cur {
            // SAFETY: nodes reachable from head are live; we hold `&mut self`.
            let next = unsafe { ptr.as_ref().link().next() };
            if ptr == target {
                // SAFETY: `ptr` is owned by this list; unlinking it first
                // guarantees the reconstituted box is the only path to it.
                unsafe {
                    match prev {
                        None => self.head = next,
                        Some(mut p) => p.as_mut().link_mut().set_next(next),
                    }
                    ptr.as_mut().link_mut().unlink();
                    return Some(Box::from_raw(ptr.as_ptr()));
                }
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// Panic if the list violates its invariants. Debug and test builds only.
    ///
    /// `max_len` bounds the walk so a corrupted list with a cycle fails the
    /// assertion instead of hanging.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self, max_len: u64) {
        let mut visited: u64 = 0;
        let mut prev_time: Option<u64> = None;
        let mut cur = self.head;

        while let Some(ptr) = cur {
            visited += 1;
            assert!(visited <= max_len, "cycle detected in event list");

            // SAFETY: reachable nodes are live.
            let node = unsafe { ptr.as_ref() };
            assert!(!node.link().is_unlinked(), "reachable node marked unlinked");
            if let Some(t) = prev_time {
                assert!(t <= node.time(), "event list out of time order");
            }
            prev_time = Some(node.time());
            cur = node.link().next();
        }
    }
}

impl<E: EventNode> Default for EventList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventNode> Drop for EventList<E> {
    fn drop(&mut self) {
        // Teardown is iterative: dropping boxes through the links directly
        // would recurse once per node.
        while self.pop().is_some() {}
    }
}
