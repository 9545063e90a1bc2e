// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The minimal thread model the kernel core needs.
//!
//! The scheduler proper -- ready queue, context switch, preemption -- lives
//! behind the port. What the core keeps per thread is exactly the state
//! messaging and timed sleeps require: the blocked/running state, the
//! message slots, the intrusive queue links, and a dedicated timer for
//! timed waits (a thread can be in at most one timed wait at a time, so
//! one timer per thread suffices).

use abi::{EventMask, Interval, Message, Priority, ThreadState, MSG_OK, NO_EVENTS};
use core::ptr;
use critical_section::CriticalSection;

use crate::cell::LockedCell;
use crate::trace;
use crate::vtimer::VTimer;
use crate::Kernel;

/// A thread control block, statically allocated by its owner.
///
/// On an embedded port each of these shadows a scheduler task; on the
/// hosted port each is bound to an OS thread with
/// [`crate::arch::hosted::bind_current`].
pub struct Thread {
    name: &'static str,
    prio: Priority,
    pub(crate) state: LockedCell<ThreadState>,
    pub(crate) q_next: LockedCell<Option<&'static Thread>>,
    pub(crate) q_prev: LockedCell<Option<&'static Thread>>,
    /// The in-flight message while this thread sits in a sender queue.
    pub(crate) msg: LockedCell<Message>,
    /// The reply written by whoever wakes this thread.
    pub(crate) rdy_msg: LockedCell<Message>,
    /// The receiver this thread is sending to, while queued.
    pub(crate) wt_thread: LockedCell<Option<&'static Thread>>,
    pub(crate) pending_events: LockedCell<EventMask>,
    pub(crate) waited_events: LockedCell<EventMask>,
    /// Selects priority-ordered insertion into this thread's sender
    /// queue instead of FIFO.
    pub(crate) msg_by_prio: LockedCell<bool>,
    /// Senders waiting on this thread, in release order.
    pub(crate) msg_queue: ThreadQueue,
    /// Timer backing sleeps and timed waits of this thread.
    pub(crate) wait_timer: VTimer,
}

impl Thread {
    pub const fn new(name: &'static str, prio: Priority) -> Self {
        Self {
            name,
            prio,
            state: LockedCell::new(ThreadState::Running),
            q_next: LockedCell::new(None),
            q_prev: LockedCell::new(None),
            msg: LockedCell::new(0),
            rdy_msg: LockedCell::new(0),
            wt_thread: LockedCell::new(None),
            pending_events: LockedCell::new(NO_EVENTS),
            waited_events: LockedCell::new(NO_EVENTS),
            msg_by_prio: LockedCell::new(false),
            msg_queue: ThreadQueue::new(),
            wait_timer: VTimer::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> Priority {
        self.prio
    }

    pub fn state(&self) -> ThreadState {
        critical_section::with(|cs| self.state.get(cs))
    }

    /// Switches this thread's sender queue between FIFO and
    /// priority-ordered insertion. Affects senders queued afterwards.
    pub fn set_msg_by_prio(&self, enabled: bool) {
        critical_section::with(|cs| self.msg_by_prio.set(cs, enabled));
    }

    /// True if at least one sender is queued on this thread.
    pub fn has_queued_senders(&self) -> bool {
        critical_section::with(|cs| self.msg_queue.front(cs).is_some())
    }

    /// Number of senders queued on this thread.
    pub fn queued_senders(&self) -> usize {
        critical_section::with(|cs| {
            let mut n = 0;
            let mut at = self.msg_queue.front(cs);
            while let Some(tp) = at {
                n += 1;
                at = tp.q_next.get(cs);
            }
            n
        })
    }

    /// Stable identifier: the control block's address.
    pub(crate) fn id(&self) -> usize {
        self as *const Self as usize
    }
}

/// An intrusive, doubly-linked thread queue. Insertion is FIFO or
/// priority-ordered; removal is from the front or targeted (for
/// cancellation).
pub(crate) struct ThreadQueue {
    first: LockedCell<Option<&'static Thread>>,
    last: LockedCell<Option<&'static Thread>>,
}

impl ThreadQueue {
    pub(crate) const fn new() -> Self {
        Self {
            first: LockedCell::new(None),
            last: LockedCell::new(None),
        }
    }

    pub(crate) fn front(&self, cs: CriticalSection<'_>) -> Option<&'static Thread> {
        self.first.get(cs)
    }

    pub(crate) fn insert_fifo(&self, cs: CriticalSection<'_>, tp: &'static Thread) {
        tp.q_next.set(cs, None);
        match self.last.replace(cs, Some(tp)) {
            Some(tail) => {
                tail.q_next.set(cs, Some(tp));
                tp.q_prev.set(cs, Some(tail));
            }
            None => {
                self.first.set(cs, Some(tp));
                tp.q_prev.set(cs, None);
            }
        }
    }

    /// Inserts so that higher priorities sit closer to the front, with
    /// arrival order among equals.
    pub(crate) fn insert_by_priority(&self, cs: CriticalSection<'_>, tp: &'static Thread) {
        let mut at = self.first.get(cs);
        while let Some(n) = at {
            if tp.prio > n.prio {
                self.insert_before(cs, n, tp);
                return;
            }
            at = n.q_next.get(cs);
        }
        self.insert_fifo(cs, tp);
    }

    fn insert_before(
        &self,
        cs: CriticalSection<'_>,
        at: &'static Thread,
        tp: &'static Thread,
    ) {
        tp.q_next.set(cs, Some(at));
        let prev = at.q_prev.replace(cs, Some(tp));
        tp.q_prev.set(cs, prev);
        match prev {
            Some(p) => p.q_next.set(cs, Some(tp)),
            None => self.first.set(cs, Some(tp)),
        }
    }

    pub(crate) fn pop_front(&self, cs: CriticalSection<'_>) -> Option<&'static Thread> {
        let head = self.first.get(cs)?;
        let next = head.q_next.get(cs);
        self.first.set(cs, next);
        match next {
            Some(n) => n.q_prev.set(cs, None),
            None => self.last.set(cs, None),
        }
        head.q_next.set(cs, None);
        head.q_prev.set(cs, None);
        Some(head)
    }

    /// Unlinks `tp` wherever it sits. Returns false if it was not queued
    /// here.
    pub(crate) fn remove(&self, cs: CriticalSection<'_>, tp: &'static Thread) -> bool {
        let mut at = self.first.get(cs);
        while let Some(n) = at {
            if ptr::eq(n, tp) {
                let prev = n.q_prev.get(cs);
                let next = n.q_next.get(cs);
                match prev {
                    Some(p) => p.q_next.set(cs, next),
                    None => self.first.set(cs, next),
                }
                match next {
                    Some(x) => x.q_prev.set(cs, prev),
                    None => self.last.set(cs, prev),
                }
                n.q_next.set(cs, None);
                n.q_prev.set(cs, None);
                return true;
            }
            at = n.q_next.get(cs);
        }
        false
    }
}

impl Kernel {
    /// Blocking primitives must not be reached from a timer callback;
    /// callbacks run in interrupt context.
    pub(crate) fn assert_thread_context(&self, cs: CriticalSection<'_>) {
        debug_assert!(
            self.callbacks_active.get(cs) == 0,
            "blocking primitive invoked from a timer callback"
        );
    }

    /// Stores the reply, marks `tp` runnable, and hands it to the port.
    pub(crate) fn wakeup_locked(
        &'static self,
        cs: CriticalSection<'_>,
        tp: &'static Thread,
        reply: Message,
    ) {
        tp.rdy_msg.set(cs, reply);
        tp.state.set(cs, ThreadState::Ready);
        trace::switch(
            cs,
            0,
            self.system_time_locked(cs),
            ThreadState::Ready,
            tp.id(),
        );
        self.port(cs).unblock(tp);
    }

    /// Puts the calling thread to sleep for `delay` ticks.
    pub fn sleep(&'static self, delay: Interval) {
        let (port, current) = critical_section::with(|cs| {
            self.assert_thread_context(cs);
            let port = self.port(cs);
            let current = port.current();
            self.do_set_locked(
                cs,
                &current.wait_timer,
                delay,
                wake_sleeper,
                current.id(),
                0,
            );
            current.state.set(cs, ThreadState::Sleeping);
            trace::switch(
                cs,
                &current.wait_timer as *const VTimer as usize,
                self.system_time_locked(cs),
                ThreadState::Sleeping,
                current.id(),
            );
            (port, current)
        });
        port.block(current);
        critical_section::with(|cs| current.state.set(cs, ThreadState::Running));
    }
}

fn wake_sleeper(k: &'static Kernel, _timer: &'static VTimer, arg: usize) {
    critical_section::with(|cs| {
        // Safety: the argument is the address of the sleeping thread's
        // static control block, stored by `sleep`.
        let tp = unsafe { &*(arg as *const Thread) };
        if tp.state.get(cs) == ThreadState::Sleeping {
            k.wakeup_locked(cs, tp, MSG_OK);
        }
    });
}
