// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Gall kernel core.
//!
//! Gall is a small real-time kernel for resource-constrained
//! microcontrollers. This crate holds the machine-independent heart of it:
//!
//! - **Virtual timers** ([`vtimer`]): a delta list of one-shot and
//!   continuous software timers multiplexed onto a single hardware alarm.
//!   All sleeps, timeouts, and periodic callbacks come from here.
//! - **Time-stamps**: a 64-bit monotonic counter derived from the
//!   wrapping tick.
//! - **Messaging**: synchronous rendez-vous between a sender and a
//!   receiver thread, with optional timeout and optional coincident event
//!   signalling.
//! - **Delegates**: a facility that turns a thread into a serialized
//!   function-call server reachable from arbitrary caller threads, built
//!   on messaging.
//! - **Debug support** ([`trace`]): the panic slot and a circular
//!   context-switch trace buffer.
//!
//! Everything architecture-specific lives behind the [`port::Port`] trait:
//! the tick counter, the alarm comparator, the halt, and the two scheduler
//! hooks messaging needs. Mutual exclusion against interrupt handlers is
//! expressed with the `critical-section` crate; kernel state can only be
//! touched while holding its token.
//!
//! All kernel objects -- the [`Kernel`] instance itself, threads, timers,
//! event sources -- are statically allocated by their owners and handed to
//! the kernel by `&'static` reference. The core never allocates.

#![no_std]

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod arch;
pub mod config;
pub mod port;
pub mod trace;

mod cell;
mod delegate;
mod event;
mod klog;
mod msg;
mod thread;
mod timestamp;
mod vtimer;

pub use abi::*;

pub use delegate::{
    veneer0, veneer1, veneer2, veneer3, veneer4, DelegateFn0, DelegateFn1,
    DelegateFn2, DelegateFn3, DelegateFn4, Veneer,
};
pub use event::{EventListener, EventSource};
pub use thread::Thread;
pub use vtimer::{VTimer, VTimerFn};

use cell::LockedCell;
use critical_section::CriticalSection;
use port::Port;
use vtimer::TimersList;

/// A kernel instance.
///
/// Normally a system has exactly one of these, in a `static`. The test
/// suite runs several in parallel, which is why all operations are methods
/// rather than free functions over a hidden global.
pub struct Kernel {
    vt: TimersList,
    port: LockedCell<Option<&'static dyn Port>>,
    /// Number of virtual-timer callbacks currently on the stack. Used to
    /// catch blocking primitives invoked from callback context.
    callbacks_active: LockedCell<u32>,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            vt: TimersList::new(),
            port: LockedCell::new(None),
            callbacks_active: LockedCell::new(0),
        }
    }

    /// Brings the kernel up: installs the port, closes the timer list's
    /// circular links, and seeds the time base. Must be called before any
    /// other operation.
    pub fn init(&'static self, port: &'static dyn Port) {
        critical_section::with(|cs| {
            self.port.set(cs, Some(port));
            self.vt_init_locked(cs);
        });
        klog::debug!("kernel initialized");
    }

    pub(crate) fn port(&self, cs: CriticalSection<'_>) -> &'static dyn Port {
        match self.port.get(cs) {
            Some(p) => p,
            None => panic!("kernel not initialized"),
        }
    }

    /// The current time in ticks: the hardware counter in tickless
    /// operation, the software tick counter otherwise.
    pub fn system_time(&'static self) -> Tick {
        critical_section::with(|cs| self.system_time_locked(cs))
    }

    pub(crate) fn system_time_locked(&self, cs: CriticalSection<'_>) -> Tick {
        if config::TIME_DELTA == 0 {
            self.vt.systime.get(cs)
        } else {
            self.port(cs).tick()
        }
    }
}
