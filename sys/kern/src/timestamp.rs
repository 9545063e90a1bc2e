// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wide monotonic time-stamps.
//!
//! The hardware tick wraps; the time-stamp does not. Each call measures
//! how far the tick has moved since the previous stamp -- in the narrow
//! tick modulus -- and extends the 64-bit count by that much. Wraps are
//! only observed correctly if some thread samples at least once per half
//! tick range; that is the caller's contract.

use abi::{tick_diff, Tick, Timestamp};

use crate::Kernel;

impl Kernel {
    /// Returns the next monotonic time-stamp.
    pub fn get_time_stamp(&'static self) -> Timestamp {
        critical_section::with(|cs| {
            let now = self.system_time_locked(cs);
            let last = self.vt.laststamp.get(cs);
            let delta = tick_diff(last as Tick, now);
            let stamp = last.wrapping_add(delta as Timestamp);
            debug_assert!(stamp >= last, "time-stamp ran backwards");
            self.vt.laststamp.set(cs, stamp);
            stamp
        })
    }

    /// Re-anchors the time-stamp at the current tick. Subsequent stamps
    /// restart from there.
    pub fn reset_time_stamp(&'static self) {
        critical_section::with(|cs| {
            let now = self.system_time_locked(cs);
            self.vt.laststamp.set(cs, now as Timestamp);
        });
    }
}
