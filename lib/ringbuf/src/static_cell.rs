// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A checked static mutable cell.
//!
//! `StaticCell` wraps a value so that it can live in a `static` and still
//! be mutated, with a runtime borrow flag standing in for the compiler's
//! aliasing analysis. Borrowing while already borrowed is a bug in the
//! caller and panics.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct StaticCell<T> {
    contents: UnsafeCell<T>,
    borrowed: AtomicBool,
}

impl<T> StaticCell<T> {
    pub const fn new(contents: T) -> Self {
        Self {
            contents: UnsafeCell::new(contents),
            borrowed: AtomicBool::new(false),
        }
    }

    /// Takes the exclusive borrow, panicking if one is already
    /// outstanding. The borrow is returned when the guard drops.
    pub fn borrow_mut(&self) -> StaticRef<'_, T> {
        let already = self.borrowed.swap(true, Ordering::Acquire);
        if already {
            panic!("reentrant StaticCell borrow");
        }
        StaticRef { cell: self }
    }
}

// Safety: access to the contents is serialized by the borrow flag, so the
// cell can be shared between contexts as long as the contents can move
// between them.
unsafe impl<T: Send> Sync for StaticCell<T> {}

pub struct StaticRef<'a, T> {
    cell: &'a StaticCell<T>,
}

impl<T> Drop for StaticRef<'_, T> {
    fn drop(&mut self) {
        self.cell.borrowed.store(false, Ordering::Release);
    }
}

impl<T> Deref for StaticRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the borrow flag guarantees this is the only reference.
        unsafe { &*self.cell.contents.get() }
    }
}

impl<T> DerefMut for StaticRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the borrow flag guarantees this is the only reference.
        unsafe { &mut *self.cell.contents.get() }
    }
}
