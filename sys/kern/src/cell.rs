// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel-locked cells.
//!
//! All kernel data shared between thread context and interrupt context is
//! mutated only inside the kernel critical section. `LockedCell` encodes
//! that rule in the type system: every accessor demands a
//! [`CriticalSection`] token, so code that forgets to take the lock does
//! not compile. On embedded ports the token is produced by disabling
//! interrupts; on hosted builds the `critical-section` crate's std
//! implementation provides an equivalent process-wide lock.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};

/// A `Cell` that can only be touched while the kernel lock is held.
pub struct LockedCell<T>(Mutex<Cell<T>>);

impl<T> LockedCell<T> {
    pub const fn new(value: T) -> Self {
        Self(Mutex::new(Cell::new(value)))
    }

    pub fn set(&self, cs: CriticalSection<'_>, value: T) {
        self.0.borrow(cs).set(value);
    }

    pub fn replace(&self, cs: CriticalSection<'_>, value: T) -> T {
        self.0.borrow(cs).replace(value)
    }
}

impl<T: Copy> LockedCell<T> {
    pub fn get(&self, cs: CriticalSection<'_>) -> T {
        self.0.borrow(cs).get()
    }

    /// Applies `f` to the current value and stores the result.
    pub fn update(&self, cs: CriticalSection<'_>, f: impl FnOnce(T) -> T) {
        let cell = self.0.borrow(cs);
        cell.set(f(cell.get()));
    }
}
