// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time kernel configuration.

use abi::Interval;

/// Minimum distance, in ticks, between "now" and any programmed alarm.
///
/// Interrupt servicing latency means an alarm programmed too close to the
/// current tick can land in the past and never fire. Delays shorter than
/// this are silently raised to it.
///
/// A value of zero selects the periodic-tick engine: the alarm hardware is
/// expected to interrupt on every tick and the timer list is aged by one
/// tick per interrupt. Any positive value selects the tickless engine,
/// where the alarm is programmed only for the next pending deadline.
pub const TIME_DELTA: Interval = 2;

/// Widest interval the physical alarm comparator can be programmed with.
///
/// When the next deadline is further away than this, the alarm is set to
/// the boundary instead; the tick interrupt then re-enqueues the remaining
/// wait. Equal to the full interval range on ports whose compare register
/// is as wide as the tick counter.
pub const ALARM_SPAN_MAX: Interval = Interval::MAX - 1;

/// Number of records kept in the context-switch trace buffer.
pub const TRACE_DEPTH: usize = 64;
