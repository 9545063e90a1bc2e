// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions for Gall.
//!
//! This crate holds the types shared between the kernel and anything that
//! talks to it: tick and interval arithmetic, message words, reply codes,
//! priorities, and thread states. It is deliberately dependency-light so
//! that userland crates can pull it in without dragging kernel internals
//! along.
//!
//! # Tick arithmetic
//!
//! The system tick is a free-running unsigned counter that wraps. All
//! comparisons between ticks must go through [`tick_diff`] or
//! [`tick_within`]; comparing two raw `Tick` values with `<` or `>` is
//! meaningless once the counter has wrapped and is forbidden by
//! convention.

#![no_std]

pub use num_derive::{FromPrimitive, ToPrimitive};
pub use num_traits::{FromPrimitive, ToPrimitive};

/// A point in time expressed in hardware ticks. Wraps modulo `2^32`.
pub type Tick = u32;

/// A duration expressed in ticks.
///
/// `TIME_IMMEDIATE` and `TIME_INFINITE` are reserved values and never
/// legal user delays.
pub type Interval = u32;

/// A wide monotonic count derived from the wrapping tick.
pub type Timestamp = u64;

/// Reserved interval meaning "no wait". Not a legal timer delay.
pub const TIME_IMMEDIATE: Interval = 0;

/// Reserved interval meaning "no timeout". Also serves as the delta-list
/// header sentinel: no real timer can carry this delta, so forward scans
/// terminate at the header without a special case.
pub const TIME_INFINITE: Interval = Interval::MAX;

/// Adds a duration to a tick, wrapping.
#[inline(always)]
pub const fn tick_add(t: Tick, d: Interval) -> Tick {
    t.wrapping_add(d)
}

/// Distance from `a` forward to `b`, modulo the tick width.
///
/// The result is only meaningful when `b` is known to be "later or equal"
/// to `a` within less than half the tick range.
#[inline(always)]
pub const fn tick_diff(a: Tick, b: Tick) -> Interval {
    b.wrapping_sub(a)
}

/// True if `t` lies in the half-open wrapping range `[start, end)`.
#[inline(always)]
pub const fn tick_within(t: Tick, start: Tick, end: Tick) -> bool {
    tick_diff(start, t) < tick_diff(start, end)
}

/// A message (or reply) word exchanged between threads. Word-sized so a
/// pointer to a larger structure can be passed through it.
pub type Message = isize;

/// Reply delivered to a sender released normally.
pub const MSG_OK: Message = 0;

/// Reply delivered to a sender whose wait timed out.
pub const MSG_TIMEOUT: Message = -1;

/// Reply delivered to a sender woken by cancellation.
pub const MSG_RESET: Message = -2;

/// Classification of the reserved reply values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum ReplyStatus {
    Ok = 0,
    Timeout = -1,
    Reset = -2,
}

impl ReplyStatus {
    /// Maps a reply word onto the reserved statuses, or `None` if it
    /// carries an application-defined value.
    pub fn classify(msg: Message) -> Option<Self> {
        num_traits::FromPrimitive::from_isize(msg)
    }
}

/// Thread priority. Higher values are more important.
pub type Priority = u8;

/// The life stages of a thread, as far as the kernel core is concerned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThreadState {
    /// Runnable, waiting for the scheduler to pick it.
    Ready,
    /// Currently executing.
    Running,
    /// In a timed sleep.
    Sleeping,
    /// Blocked waiting for a sender to queue a message.
    WaitingForMessage,
    /// Blocked in a synchronous send, waiting to be released.
    SendingMessage,
    /// Blocked waiting for event flags.
    WaitingForEvent,
}

/// A set of event flags.
pub type EventMask = u32;

pub const NO_EVENTS: EventMask = 0;
pub const ALL_EVENTS: EventMask = EventMask::MAX;
