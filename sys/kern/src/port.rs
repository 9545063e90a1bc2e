// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The port facade.
//!
//! Everything architecture-specific the kernel core needs is collected
//! behind this one trait: the free-running tick counter, the one-shot
//! alarm comparator, the terminal halt, and the two scheduler hooks that
//! messaging requires (suspend the current thread, resume another).
//!
//! Entering and leaving the kernel critical section is *not* part of the
//! trait; that is supplied by the `critical-section` crate, whose
//! implementation an embedded port registers with `set_impl!` and hosted
//! builds get from the crate's `std` feature.

use abi::Tick;

use crate::thread::Thread;

pub trait Port: Sync {
    /// Reads the free-running hardware counter.
    fn tick(&self) -> Tick;

    /// Arms the one-shot alarm to fire at the given absolute tick. Called
    /// only when the alarm is currently stopped.
    fn start_alarm(&self, at: Tick);

    /// Reprograms the already-armed alarm.
    fn set_alarm(&self, at: Tick);

    /// Disables alarm interrupts.
    fn stop_alarm(&self);

    /// Emits `msg` on whatever console the port has and halts. Does not
    /// return.
    fn halt(&self, msg: &str) -> !;

    /// Returns the thread executing on this context.
    ///
    /// On an embedded port this is the scheduler's current-thread pointer;
    /// it is meaningless (and may halt) when called from an interrupt
    /// handler.
    fn current(&self) -> &'static Thread;

    /// Suspends the calling thread until [`Port::unblock`] is called for
    /// it.
    ///
    /// Called *outside* the kernel critical section, after the thread has
    /// published its blocked state. A wakeup that arrives between leaving
    /// the critical section and the suspension taking effect must not be
    /// lost; ports typically keep a per-thread wakeup token to close that
    /// window.
    fn block(&self, tp: &'static Thread);

    /// Makes a thread suspended in [`Port::block`] runnable again. Called
    /// with the kernel lock held.
    fn unblock(&self, tp: &'static Thread);
}
