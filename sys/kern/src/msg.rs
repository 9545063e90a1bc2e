// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synchronous thread-to-thread messages.
//!
//! A send is a rendez-vous: the sender queues itself on the receiver,
//! parks, and resumes only when the receiver *releases* it with a reply
//! word. Message data is never copied -- the message word typically points
//! into the sender's stack, which is guaranteed live because the sender
//! stays suspended until released.
//!
//! A receiver's sender queue is FIFO by default; flipping
//! [`Thread::set_msg_by_prio`] selects priority order, with arrival order
//! breaking ties.
//!
//! Invariants:
//! - a thread is in `SendingMessage` state iff it sits in some sender
//!   queue;
//! - a receiver is in `WaitingForMessage` only while its sender queue is
//!   empty.

use abi::{Interval, Message, ThreadState, MSG_OK, MSG_TIMEOUT, TIME_INFINITE};
use core::ptr;
use critical_section::CriticalSection;

use crate::event::EventSource;
use crate::thread::Thread;
use crate::trace;
use crate::vtimer::VTimer;
use crate::Kernel;

impl Kernel {
    /// Sends `msg` to `tp` and blocks until `tp` releases it. Returns the
    /// reply word.
    pub fn msg_send(&'static self, tp: &'static Thread, msg: Message) -> Message {
        let (port, current) = critical_section::with(|cs| {
            self.assert_thread_context(cs);
            let port = self.port(cs);
            let current = port.current();
            self.queue_sender_locked(cs, tp, current, msg);
            if tp.state.get(cs) == ThreadState::WaitingForMessage {
                self.wakeup_locked(cs, tp, MSG_OK);
            }
            self.sender_parks_locked(cs, current, tp);
            (port, current)
        });
        port.block(current);
        critical_section::with(|cs| {
            current.state.set(cs, ThreadState::Running);
            current.rdy_msg.get(cs)
        })
    }

    /// Like [`Kernel::msg_send`], but gives up after `timeout` ticks and
    /// returns [`MSG_TIMEOUT`] if the receiver has not released the
    /// message by then.
    pub fn msg_send_timeout(
        &'static self,
        tp: &'static Thread,
        msg: Message,
        timeout: Interval,
    ) -> Message {
        if timeout == TIME_INFINITE {
            return self.msg_send(tp, msg);
        }
        let (port, current) = critical_section::with(|cs| {
            self.assert_thread_context(cs);
            let port = self.port(cs);
            let current = port.current();
            self.do_set_locked(
                cs,
                &current.wait_timer,
                timeout,
                sender_timeout,
                current.id(),
                0,
            );
            self.queue_sender_locked(cs, tp, current, msg);
            if tp.state.get(cs) == ThreadState::WaitingForMessage {
                self.wakeup_locked(cs, tp, MSG_OK);
            }
            self.sender_parks_locked(cs, current, tp);
            (port, current)
        });
        port.block(current);
        critical_section::with(|cs| {
            if current.wait_timer.is_armed_locked(cs) {
                self.do_reset_locked(cs, &current.wait_timer);
            }
            current.state.set(cs, ThreadState::Running);
            current.rdy_msg.get(cs)
        })
    }

    /// Sends `msg` to `tp` and, in the same critical section, broadcasts
    /// the event source `es`. Used with receivers that wait on an
    /// event-OR-message condition: the event wakes them, after which they
    /// observe the pending message.
    ///
    /// The receiver must not be sitting in [`Kernel::msg_wait`].
    pub fn msg_send_with_event(
        &'static self,
        tp: &'static Thread,
        msg: Message,
        es: &'static EventSource,
    ) -> Message {
        let (port, current) = critical_section::with(|cs| {
            self.assert_thread_context(cs);
            debug_assert!(
                tp.state.get(cs) != ThreadState::WaitingForMessage,
                "receiver of a send-with-event must wait on events"
            );
            let port = self.port(cs);
            let current = port.current();
            self.queue_sender_locked(cs, tp, current, msg);
            self.broadcast_locked(cs, es);
            self.sender_parks_locked(cs, current, tp);
            (port, current)
        });
        port.block(current);
        critical_section::with(|cs| {
            current.state.set(cs, ThreadState::Running);
            current.rdy_msg.get(cs)
        })
    }

    /// Blocks until a sender is queued on the calling thread and returns
    /// it. The sender stays queued (and suspended) until
    /// [`Kernel::msg_release`].
    pub fn msg_wait(&'static self) -> &'static Thread {
        loop {
            let (port, current, head) = critical_section::with(|cs| {
                self.assert_thread_context(cs);
                let port = self.port(cs);
                let current = port.current();
                let head = current.msg_queue.front(cs);
                match head {
                    Some(_) => current.state.set(cs, ThreadState::Running),
                    None => {
                        current.state.set(cs, ThreadState::WaitingForMessage);
                        trace::switch(
                            cs,
                            current.id(),
                            self.system_time_locked(cs),
                            ThreadState::WaitingForMessage,
                            current.id(),
                        );
                    }
                }
                (port, current, head)
            });
            match head {
                Some(sender) => return sender,
                None => port.block(current),
            }
        }
    }

    /// Like [`Kernel::msg_wait`], but gives up after `timeout` ticks.
    pub fn msg_wait_timeout(&'static self, timeout: Interval) -> Option<&'static Thread> {
        if timeout == TIME_INFINITE {
            return Some(self.msg_wait());
        }

        enum Outcome {
            Got(&'static Thread),
            TimedOut,
            Park,
        }

        let (port, current) = critical_section::with(|cs| {
            self.assert_thread_context(cs);
            let port = self.port(cs);
            let current = port.current();
            self.do_set_locked(
                cs,
                &current.wait_timer,
                timeout,
                receiver_timeout,
                current.id(),
                0,
            );
            (port, current)
        });

        loop {
            let outcome = critical_section::with(|cs| {
                if let Some(sender) = current.msg_queue.front(cs) {
                    if current.wait_timer.is_armed_locked(cs) {
                        self.do_reset_locked(cs, &current.wait_timer);
                    }
                    current.state.set(cs, ThreadState::Running);
                    return Outcome::Got(sender);
                }
                // The engine disarms one-shot timers before firing them,
                // so a disarmed wait timer means the timeout has struck.
                if !current.wait_timer.is_armed_locked(cs) {
                    current.state.set(cs, ThreadState::Running);
                    return Outcome::TimedOut;
                }
                current.state.set(cs, ThreadState::WaitingForMessage);
                trace::switch(
                    cs,
                    current.id(),
                    self.system_time_locked(cs),
                    ThreadState::WaitingForMessage,
                    current.id(),
                );
                Outcome::Park
            });
            match outcome {
                Outcome::Got(sender) => return Some(sender),
                Outcome::TimedOut => return None,
                Outcome::Park => port.block(current),
            }
        }
    }

    /// Returns the queued head sender without blocking, or `None`.
    pub fn msg_poll(&'static self) -> Option<&'static Thread> {
        critical_section::with(|cs| {
            let current = self.port(cs).current();
            current.msg_queue.front(cs)
        })
    }

    /// Reads the message word a queued sender carries. Stable until the
    /// sender is released.
    pub fn msg_get(&'static self, sender: &Thread) -> Message {
        critical_section::with(|cs| sender.msg.get(cs))
    }

    /// Releases the head sender of the calling thread's queue, handing it
    /// `reply` as the return value of its send.
    pub fn msg_release(&'static self, sender: &'static Thread, reply: Message) {
        critical_section::with(|cs| {
            let current = self.port(cs).current();
            let head = match current.msg_queue.pop_front(cs) {
                Some(h) => h,
                None => self.halt_locked(cs, "message release without a queued sender"),
            };
            debug_assert!(
                ptr::eq(head, sender),
                "released sender is not at the head of the queue"
            );
            head.wt_thread.set(cs, None);
            self.wakeup_locked(cs, head, reply);
        });
    }

    fn queue_sender_locked(
        &'static self,
        cs: CriticalSection<'_>,
        tp: &'static Thread,
        current: &'static Thread,
        msg: Message,
    ) {
        debug_assert!(!ptr::eq(tp, current), "thread sending to itself");
        if tp.msg_by_prio.get(cs) {
            tp.msg_queue.insert_by_priority(cs, current);
        } else {
            tp.msg_queue.insert_fifo(cs, current);
        }
        current.msg.set(cs, msg);
        current.wt_thread.set(cs, Some(tp));
    }

    fn sender_parks_locked(
        &'static self,
        cs: CriticalSection<'_>,
        current: &'static Thread,
        tp: &'static Thread,
    ) {
        current.state.set(cs, ThreadState::SendingMessage);
        trace::switch(
            cs,
            tp.id(),
            self.system_time_locked(cs),
            ThreadState::SendingMessage,
            current.id(),
        );
    }
}

/// Timeout callback armed by [`Kernel::msg_send_timeout`]: if the sender
/// is still queued, pull it out and wake it empty-handed.
fn sender_timeout(k: &'static Kernel, _timer: &'static VTimer, arg: usize) {
    critical_section::with(|cs| {
        // Safety: the argument is the address of the sender's static
        // control block; the timer cannot outlive the send that armed it.
        let tp = unsafe { &*(arg as *const Thread) };
        if let Some(receiver) = tp.wt_thread.get(cs) {
            receiver.msg_queue.remove(cs, tp);
            tp.wt_thread.set(cs, None);
            k.wakeup_locked(cs, tp, MSG_TIMEOUT);
        }
    });
}

/// Timeout callback armed by [`Kernel::msg_wait_timeout`].
fn receiver_timeout(k: &'static Kernel, _timer: &'static VTimer, arg: usize) {
    critical_section::with(|cs| {
        // Safety: as for `sender_timeout`.
        let tp = unsafe { &*(arg as *const Thread) };
        if tp.state.get(cs) == ThreadState::WaitingForMessage {
            k.wakeup_locked(cs, tp, MSG_TIMEOUT);
        }
    });
}
