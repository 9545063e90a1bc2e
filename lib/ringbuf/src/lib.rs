// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed circular buffers for kernel instrumentation.
//!
//! A ring buffer records a fixed number of typed entries and overwrites
//! the oldest when full. Consecutive identical entries are coalesced into
//! a single entry with a repeat count, so a tight loop logging the same
//! event does not wash out the interesting history around it.
//!
//! Buffers are declared with the [`ringbuf!`] macro and written with
//! [`ringbuf_entry!`]. Declaring them as statics keeps them at fixed
//! addresses where a debugger can find them by name.

#![no_std]

pub mod static_cell;

pub use static_cell::StaticCell;

/// Declares a ring buffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ring buffer named `NAME`, with
/// room for `N` entries of `Type`, all of which are initialized to `expr`.
///
/// The resulting buffer is static, so `NAME` should be uppercase.
///
/// The actual type of `NAME` will be `StaticCell<Ringbuf<Type, N>>`.
///
/// To support the common case of having one quickly-installed ring buffer
/// per module, if you omit the name, it will default to `RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        pub static $name: $crate::StaticCell<$crate::Ringbuf<$t, $n>> =
            $crate::StaticCell::new($crate::Ringbuf::new($init));
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Inserts data into a named ring buffer (which should have been declared
/// with the [`ringbuf!`] macro).
///
/// `ringbuf_entry!(NAME, expr)` will insert `expr` into the buffer called
/// `NAME`.
///
/// If you declared your buffer without a name, you can also use this
/// without a name, and it will default to `RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        $crate::StaticCell::borrow_mut(&$buf).entry($payload);
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$buf;
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// A single record in a ring buffer: the payload plus the number of times
/// it was logged consecutively.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RingbufEntry<T> {
    pub payload: T,
    pub count: u32,
}

///
/// A ring buffer of parametrized type and size. In practice, instantiating
/// this directly is strange -- see the [`ringbuf!`] macro.
///
#[derive(Debug)]
pub struct Ringbuf<T, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(initial: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                payload: initial,
                count: 0,
            }; N],
        }
    }

    pub fn entry(&mut self, payload: T) {
        // If this matches the most recent entry, bump its count instead of
        // burning a slot.
        if let Some(last) = self.last {
            let e = &mut self.buffer[last];
            if e.payload == payload {
                e.count = e.count.wrapping_add(1);
                return;
            }
        }

        let ndx = match self.last {
            None => 0,
            Some(last) => {
                if last + 1 >= self.buffer.len() {
                    0
                } else {
                    last + 1
                }
            }
        };

        self.buffer[ndx] = RingbufEntry { payload, count: 1 };

        self.last = Some(ndx);
    }

    /// Copies the recorded entries, oldest first, into `out`. Returns the
    /// number of entries written. Slots never written (count of zero) are
    /// skipped.
    pub fn copy_into(&self, out: &mut [Option<RingbufEntry<T>>]) -> usize {
        let last = match self.last {
            None => return 0,
            Some(last) => last,
        };

        let mut n = 0;
        for i in 0..self.buffer.len() {
            let ndx = (last + 1 + i) % self.buffer.len();
            let e = &self.buffer[ndx];
            if e.count == 0 {
                continue;
            }
            if n < out.len() {
                out[n] = Some(*e);
                n += 1;
            }
        }
        n
    }
}
