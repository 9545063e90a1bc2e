// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debug support: the panic slot and the context-switch trace.
//!
//! Both are process-wide, not per-kernel-instance, so a debugger can find
//! them at fixed addresses regardless of how the system is assembled.
//!
//! The trace is a circular buffer recording every transition through the
//! kernel's blocking and wakeup paths: the object being waited on, the
//! time, the state entered, and the thread involved (its control-block
//! address shifted right by four bits). Reading it after a hang usually
//! tells you who was waiting on what.

use abi::{Tick, ThreadState};
use critical_section::CriticalSection;
use ringbuf::{ringbuf, ringbuf_entry, RingbufEntry, StaticCell};

use crate::klog;
use crate::Kernel;

/// One trace record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trace {
    None,
    Switch {
        /// Address of the object being waited on; zero when not
        /// applicable (wakeups).
        wtobj: u32,
        time: Tick,
        /// The state entered by the transition.
        state: ThreadState,
        /// Thread control-block address, shifted right by four.
        tid: u32,
    },
}

ringbuf!(TRACE, Trace, { crate::config::TRACE_DEPTH }, Trace::None);

/// Records a blocking or wakeup transition. Callers hold the kernel
/// lock, which is what serializes access to the buffer.
pub(crate) fn switch(
    cs: CriticalSection<'_>,
    wtobj: usize,
    time: Tick,
    state: ThreadState,
    tid: usize,
) {
    let _ = cs;
    ringbuf_entry!(
        TRACE,
        Trace::Switch {
            wtobj: wtobj as u32,
            time,
            state,
            tid: (tid >> 4) as u32,
        }
    );
}

/// Copies the recorded history, oldest first, into `out`; returns the
/// number of entries written. Takes the kernel lock so it cannot collide
/// with recording, but the result is only meaningful while the traced
/// threads are quiescent.
pub fn snapshot(out: &mut [Option<RingbufEntry<Trace>>]) -> usize {
    critical_section::with(|_cs| TRACE.borrow_mut().copy_into(out))
}

static PANIC_MESSAGE: StaticCell<Option<&'static str>> = StaticCell::new(None);

/// The message of the most recent kernel panic, if any.
pub fn panic_message() -> Option<&'static str> {
    critical_section::with(|_cs| *PANIC_MESSAGE.borrow_mut())
}

impl Kernel {
    /// Fatal error entry point: records `msg` in the panic slot, emits it
    /// through the port, and halts the system. No recovery.
    pub fn panic(&'static self, msg: &'static str) -> ! {
        let port = critical_section::with(|cs| {
            *PANIC_MESSAGE.borrow_mut() = Some(msg);
            self.port(cs)
        });
        klog::error!("kernel panic: {}", msg);
        port.halt(msg)
    }

    /// As [`Kernel::panic`], for callers already holding the kernel lock.
    pub(crate) fn halt_locked(&self, cs: CriticalSection<'_>, msg: &'static str) -> ! {
        *PANIC_MESSAGE.borrow_mut() = Some(msg);
        self.port(cs).halt(msg)
    }
}
