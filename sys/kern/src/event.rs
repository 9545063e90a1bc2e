// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event flags.
//!
//! The slice of an event system that messaging needs: threads register a
//! listener on an [`EventSource`]; broadcasting the source ORs each
//! listener's mask into its thread's pending flags and wakes threads
//! blocked in [`Kernel::evt_wait_any`]. This is what lets a server wait
//! for "a message or an event" with a single blocking point.

use abi::{EventMask, ThreadState, MSG_OK, NO_EVENTS};
use critical_section::CriticalSection;

use crate::cell::LockedCell;
use crate::thread::Thread;
use crate::trace;
use crate::Kernel;

/// A broadcastable event origin: a chain of registered listeners.
pub struct EventSource {
    first: LockedCell<Option<&'static EventListener>>,
}

/// One thread's subscription to an [`EventSource`].
pub struct EventListener {
    next: LockedCell<Option<&'static EventListener>>,
    thread: LockedCell<Option<&'static Thread>>,
    events: LockedCell<EventMask>,
}

impl EventSource {
    pub const fn new() -> Self {
        Self {
            first: LockedCell::new(None),
        }
    }
}

impl EventListener {
    pub const fn new() -> Self {
        Self {
            next: LockedCell::new(None),
            thread: LockedCell::new(None),
            events: LockedCell::new(NO_EVENTS),
        }
    }
}

impl Kernel {
    /// Subscribes the calling thread to `es`: broadcasts of the source
    /// will raise `events` in its pending flags.
    pub fn evt_register(
        &'static self,
        es: &'static EventSource,
        el: &'static EventListener,
        events: EventMask,
    ) {
        critical_section::with(|cs| {
            debug_assert!(
                el.thread.get(cs).is_none(),
                "event listener registered twice"
            );
            let current = self.port(cs).current();
            el.thread.set(cs, Some(current));
            el.events.set(cs, events);
            el.next.set(cs, es.first.replace(cs, Some(el)));
        });
    }

    /// Raises each listener's mask on its thread and wakes threads whose
    /// wait is satisfied.
    pub fn evt_broadcast(&'static self, es: &'static EventSource) {
        critical_section::with(|cs| self.broadcast_locked(cs, es));
    }

    pub(crate) fn broadcast_locked(
        &'static self,
        cs: CriticalSection<'_>,
        es: &'static EventSource,
    ) {
        let mut node = es.first.get(cs);
        while let Some(el) = node {
            if let Some(tp) = el.thread.get(cs) {
                let pending = tp.pending_events.get(cs) | el.events.get(cs);
                tp.pending_events.set(cs, pending);
                if tp.state.get(cs) == ThreadState::WaitingForEvent
                    && pending & tp.waited_events.get(cs) != NO_EVENTS
                {
                    self.wakeup_locked(cs, tp, MSG_OK);
                }
            }
            node = el.next.get(cs);
        }
    }

    /// Blocks until any event in `mask` is pending on the calling
    /// thread, then clears and returns the satisfied subset.
    pub fn evt_wait_any(&'static self, mask: EventMask) -> EventMask {
        loop {
            let (port, current, hit) = critical_section::with(|cs| {
                self.assert_thread_context(cs);
                let port = self.port(cs);
                let current = port.current();
                let pending = current.pending_events.get(cs);
                let hit = pending & mask;
                if hit != NO_EVENTS {
                    current.pending_events.set(cs, pending & !mask);
                    current.state.set(cs, ThreadState::Running);
                } else {
                    current.waited_events.set(cs, mask);
                    current.state.set(cs, ThreadState::WaitingForEvent);
                    trace::switch(
                        cs,
                        mask as usize,
                        self.system_time_locked(cs),
                        ThreadState::WaitingForEvent,
                        current.id(),
                    );
                }
                (port, current, hit)
            });
            if hit != NO_EVENTS {
                return hit;
            }
            port.block(current);
        }
    }
}
