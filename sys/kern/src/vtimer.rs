// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual timers.
//!
//! All software timers live on one circular, intrusive, doubly-linked
//! *delta list*: each armed timer stores the distance in ticks from its
//! predecessor's deadline rather than an absolute time, so advancing time
//! only ever touches the head. The list header participates as a node
//! whose delta is pinned to [`TIME_INFINITE`]; since no real timer can
//! carry that delta, forward scans terminate at the header without a
//! special case.
//!
//! The absolute deadline of an armed timer is `lasttime` plus the sum of
//! the deltas from the first element up to and including it, where
//! `lasttime` is the tick anchoring the list base. In tickless operation
//! the hardware alarm is programmed for the head's deadline only; the
//! alarm interrupt calls [`Kernel::tick_isr`], which pops and fires every
//! expired timer in deadline order.
//!
//! Timer callbacks execute in interrupt context with the kernel lock
//! *released*, so they may arm and disarm timers -- including their own
//! re-arm -- but must never block.

use abi::{tick_add, tick_diff, Interval, Tick, Timestamp, TIME_IMMEDIATE, TIME_INFINITE};
use core::ptr;
use critical_section::CriticalSection;

use crate::cell::LockedCell;
use crate::config;
use crate::Kernel;

/// Timer callback. Runs in interrupt context with the kernel lock
/// released; the kernel instance is passed in so the callback can operate
/// on timers and threads, but it must not invoke anything that blocks.
pub type VTimerFn = fn(&'static Kernel, &'static VTimer, usize);

/// A virtual timer, owned by the caller and armed with
/// [`Kernel::vt_set`] or [`Kernel::vt_set_continuous`].
///
/// A zero-initialized (freshly constructed) timer is disarmed. After a
/// one-shot timer fires, or after [`Kernel::vt_reset`], the structure can
/// be reused or dropped.
pub struct VTimer {
    next: LockedCell<Option<&'static VTimer>>,
    prev: LockedCell<Option<&'static VTimer>>,
    delta: LockedCell<Interval>,
    func: LockedCell<Option<VTimerFn>>,
    arg: LockedCell<usize>,
    reload: LockedCell<Interval>,
}

impl VTimer {
    pub const fn new() -> Self {
        Self {
            next: LockedCell::new(None),
            prev: LockedCell::new(None),
            delta: LockedCell::new(0),
            func: LockedCell::new(None),
            arg: LockedCell::new(0),
            reload: LockedCell::new(0),
        }
    }

    /// True while the timer sits in a delta list.
    pub fn is_armed(&self) -> bool {
        critical_section::with(|cs| self.is_armed_locked(cs))
    }

    pub(crate) fn is_armed_locked(&self, cs: CriticalSection<'_>) -> bool {
        self.next.get(cs).is_some()
    }
}

/// The per-kernel delta list and time base.
pub(crate) struct TimersList {
    pub(crate) header: VTimer,
    /// Absolute tick anchoring the list: the head's deadline is
    /// `lasttime + head.delta`.
    pub(crate) lasttime: LockedCell<Tick>,
    /// Last wide time-stamp handed out.
    pub(crate) laststamp: LockedCell<Timestamp>,
    /// Software tick counter, advanced by the periodic-tick engine only.
    pub(crate) systime: LockedCell<Tick>,
}

impl TimersList {
    pub(crate) const fn new() -> Self {
        Self {
            header: VTimer::new(),
            lasttime: LockedCell::new(0),
            laststamp: LockedCell::new(0),
            systime: LockedCell::new(0),
        }
    }
}

impl Kernel {
    pub(crate) fn vt_init_locked(&'static self, cs: CriticalSection<'_>) {
        self.vt.header.next.set(cs, Some(&self.vt.header));
        self.vt.header.prev.set(cs, Some(&self.vt.header));
        self.vt.header.delta.set(cs, TIME_INFINITE);
        let now = self.port(cs).tick();
        self.vt.lasttime.set(cs, now);
        self.vt.laststamp.set(cs, now as Timestamp);
    }

    /// First armed timer, or `None` if the list is empty.
    pub(crate) fn vt_first(
        &'static self,
        cs: CriticalSection<'_>,
    ) -> Option<&'static VTimer> {
        match self.vt.header.next.get(cs) {
            None => None,
            Some(n) if ptr::eq(n, &self.vt.header) => None,
            Some(n) => Some(n),
        }
    }

    /// Arms a one-shot timer to run `func(arg)` after `delay` ticks.
    ///
    /// The timer must not already be armed, and `delay` must not be
    /// [`TIME_IMMEDIATE`]. [`TIME_INFINITE`] is accepted and treated as an
    /// ordinary (very long) delay.
    pub fn vt_set(
        &'static self,
        timer: &'static VTimer,
        delay: Interval,
        func: VTimerFn,
        arg: usize,
    ) {
        critical_section::with(|cs| self.do_set_locked(cs, timer, delay, func, arg, 0));
    }

    /// Arms a continuous timer: `func(arg)` runs every `period` ticks
    /// until the timer is reset. The period is measured deadline to
    /// deadline, so callback latency does not accumulate as drift.
    pub fn vt_set_continuous(
        &'static self,
        timer: &'static VTimer,
        period: Interval,
        func: VTimerFn,
        arg: usize,
    ) {
        critical_section::with(|cs| {
            self.do_set_locked(cs, timer, period, func, arg, period)
        });
    }

    /// Disarms a timer. The timer must be armed.
    pub fn vt_reset(&'static self, timer: &'static VTimer) {
        critical_section::with(|cs| self.do_reset_locked(cs, timer));
    }

    /// Ticks left before `timer` fires; zero if its deadline has already
    /// passed. The timer must be armed.
    pub fn vt_remaining(&'static self, timer: &'static VTimer) -> Interval {
        critical_section::with(|cs| {
            let mut node = match self.vt.header.next.get(cs) {
                Some(n) => n,
                None => self.halt_locked(cs, "kernel not initialized"),
            };
            let mut sum: Interval = 0;
            loop {
                if ptr::eq(node, &self.vt.header) {
                    self.halt_locked(cs, "interval of a timer that is not armed");
                }
                sum = sum.wrapping_add(node.delta.get(cs));
                if ptr::eq(node, timer) {
                    break;
                }
                node = match node.next.get(cs) {
                    Some(n) => n,
                    None => self.halt_locked(cs, "corrupt timer list"),
                };
            }
            if config::TIME_DELTA > 0 {
                let now = self.port(cs).tick();
                sum.saturating_sub(tick_diff(self.vt.lasttime.get(cs), now))
            } else {
                sum
            }
        })
    }

    pub(crate) fn do_set_locked(
        &'static self,
        cs: CriticalSection<'_>,
        timer: &'static VTimer,
        delay: Interval,
        func: VTimerFn,
        arg: usize,
        reload: Interval,
    ) {
        debug_assert!(delay != TIME_IMMEDIATE, "immediate delay is reserved");
        debug_assert!(timer.next.get(cs).is_none(), "timer is already armed");

        timer.func.set(cs, Some(func));
        timer.arg.set(cs, arg);
        timer.reload.set(cs, reload);

        let mut delta = delay;
        let mut was_empty = true;

        if config::TIME_DELTA > 0 {
            let port = self.port(cs);
            let now = port.tick();

            // Delays below the minimum safe delta are raised to it;
            // anything closer could see the alarm programmed in the past.
            let delay = delay.max(config::TIME_DELTA);

            if self.vt_first(cs).is_none() {
                // The delta list is empty, the current time becomes the
                // new delta list base time.
                self.vt.lasttime.set(cs, now);
                port.start_alarm(tick_add(now, delay.min(config::ALARM_SPAN_MAX)));
                delta = delay;
            } else {
                was_empty = false;

                // The delta is measured from the list base, which may lag
                // the current time; fold the lag in.
                let deltanow = tick_diff(self.vt.lasttime.get(cs), now);
                delta = deltanow.wrapping_add(delay);
                if delta < deltanow {
                    // The sum does not fit the interval type. Age the
                    // list up to the current time so the leading deltas
                    // shrink, then retry from the fresh base.
                    self.compress_locked(cs, deltanow);
                    delta = delay;
                }
            }
        }

        // Scan for the insertion point. The walk continues past equal
        // deltas so equal deadlines fire in arming order; the header's
        // sentinel delta stops it.
        let mut scan = match self.vt.header.next.get(cs) {
            Some(n) => n,
            None => self.halt_locked(cs, "kernel not initialized"),
        };
        loop {
            let d = scan.delta.get(cs);
            if d > delta || (d == delta && ptr::eq(scan, &self.vt.header)) {
                break;
            }
            delta -= d;
            scan = match scan.next.get(cs) {
                Some(n) => n,
                None => self.halt_locked(cs, "corrupt timer list"),
            };
        }

        // Insert before the scan position.
        let prev = match scan.prev.get(cs) {
            Some(p) => p,
            None => self.halt_locked(cs, "corrupt timer list"),
        };
        timer.next.set(cs, Some(scan));
        timer.prev.set(cs, Some(prev));
        prev.next.set(cs, Some(timer));
        scan.prev.set(cs, Some(timer));
        timer.delta.set(cs, delta);

        // Keep the successor's distance to its own deadline unchanged.
        // When the successor is the header this momentarily clobbers the
        // sentinel, which is restored right below.
        scan.delta.update(cs, |d| d.wrapping_sub(delta));
        self.vt.header.delta.set(cs, TIME_INFINITE);

        if config::TIME_DELTA > 0 && !was_empty {
            if let Some(first) = self.vt_first(cs) {
                if ptr::eq(first, timer) {
                    // The new timer preempts the previously programmed
                    // alarm.
                    let now = self.port(cs).tick();
                    self.reprogram_alarm_locked(cs, now);
                }
            }
        }
    }

    pub(crate) fn do_reset_locked(
        &'static self,
        cs: CriticalSection<'_>,
        timer: &'static VTimer,
    ) {
        let (Some(next), Some(prev)) = (timer.next.get(cs), timer.prev.get(cs)) else {
            self.halt_locked(cs, "disarming a timer that is not armed")
        };

        let was_first = match self.vt.header.next.get(cs) {
            Some(f) => ptr::eq(f, timer),
            None => self.halt_locked(cs, "kernel not initialized"),
        };

        // Fold this timer's delta into its successor so the deadlines
        // behind it stay put. The header may absorb it; its sentinel is
        // restored below.
        next.delta.update(cs, |d| d.wrapping_add(timer.delta.get(cs)));
        prev.next.set(cs, Some(next));
        next.prev.set(cs, Some(prev));
        timer.next.set(cs, None);
        timer.prev.set(cs, None);
        self.vt.header.delta.set(cs, TIME_INFINITE);

        if config::TIME_DELTA > 0 {
            let port = self.port(cs);
            if self.vt_first(cs).is_none() {
                port.stop_alarm();
                return;
            }
            if !was_first {
                return;
            }
            let now = port.tick();
            self.reprogram_alarm_locked(cs, now);
        }
    }

    /// Ages every leading delta by `deltanow` ticks and advances the list
    /// base by the same amount, preserving each timer's absolute deadline.
    /// Timers whose deadlines are already in the past are clamped at a
    /// delta of zero; the pending alarm interrupt will fire them.
    fn compress_locked(&'static self, cs: CriticalSection<'_>, deltanow: Interval) {
        let mut remaining = deltanow;
        let mut node = self.vt.header.next.get(cs);
        while remaining > 0 {
            let Some(n) = node else { break };
            if ptr::eq(n, &self.vt.header) {
                break;
            }
            let d = n.delta.get(cs);
            if d > remaining {
                n.delta.set(cs, d - remaining);
                remaining = 0;
            } else {
                n.delta.set(cs, 0);
                remaining -= d;
                node = n.next.get(cs);
            }
        }
        self.vt.lasttime.update(cs, |t| tick_add(t, deltanow));
    }

    /// Reprograms the alarm for the head's deadline: at least
    /// `TIME_DELTA` ahead of `now`, at most `ALARM_SPAN_MAX` away. If the
    /// head is already due, the pending alarm interrupt will handle it
    /// and nothing is programmed.
    fn reprogram_alarm_locked(&'static self, cs: CriticalSection<'_>, now: Tick) {
        let Some(first) = self.vt_first(cs) else { return };
        let nowdelta = tick_diff(self.vt.lasttime.get(cs), now);
        let head_delta = first.delta.get(cs);
        if nowdelta >= head_delta {
            return;
        }
        let delta = (head_delta - nowdelta)
            .max(config::TIME_DELTA)
            .min(config::ALARM_SPAN_MAX);
        self.port(cs).set_alarm(tick_add(now, delta));
    }

    /// The system-tick interrupt handler. In tickless operation the port
    /// calls this from the alarm interrupt; in periodic operation, on
    /// every tick.
    pub fn tick_isr(&'static self) {
        if config::TIME_DELTA == 0 {
            self.periodic_tick();
        } else {
            self.tickless_tick();
        }
    }

    fn tickless_tick(&'static self) {
        loop {
            let fired = critical_section::with(|cs| {
                let port = self.port(cs);
                let first = self.vt_first(cs)?;
                let now = port.tick();
                let nowdelta = tick_diff(self.vt.lasttime.get(cs), now);
                let head_delta = first.delta.get(cs);
                if head_delta > nowdelta {
                    return None;
                }

                // The head has expired: advance the base past its
                // deadline and unlink it.
                let fire_base = tick_add(self.vt.lasttime.get(cs), head_delta);
                self.vt.lasttime.set(cs, fire_base);
                self.dequeue_locked(cs, first);
                if self.vt_first(cs).is_none() {
                    // Speculative; the callback may arm a timer, in which
                    // case the alarm is restarted below.
                    port.stop_alarm();
                }

                let func = match first.func.get(cs) {
                    Some(f) => f,
                    None => self.halt_locked(cs, "armed timer without callback"),
                };
                self.callbacks_active.update(cs, |n| n + 1);
                Some((first, func, first.arg.get(cs), first.reload.get(cs), fire_base))
            });
            let Some((timer, func, arg, reload, fire_base)) = fired else {
                break;
            };

            // The callback runs with the kernel lock released. It may arm
            // and disarm timers and wake threads; the next loop iteration
            // re-reads the clock to account for whatever it did.
            func(self, timer, arg);

            critical_section::with(|cs| {
                self.callbacks_active.update(cs, |n| n.wrapping_sub(1));
                if reload > 0 && timer.next.get(cs).is_none() {
                    let now = self.port(cs).tick();
                    let skipped = tick_diff(fire_base, now);
                    if skipped > reload {
                        self.halt_locked(cs, "continuous timer deadline miss");
                    }
                    let mut delay = reload - skipped;
                    if delay == TIME_IMMEDIATE {
                        delay = config::TIME_DELTA;
                    }
                    self.do_set_locked(cs, timer, delay, func, arg, reload);
                }
            });
        }

        critical_section::with(|cs| {
            let now = self.port(cs).tick();
            self.reprogram_alarm_locked(cs, now);
        });
    }

    fn periodic_tick(&'static self) {
        critical_section::with(|cs| {
            self.vt.systime.update(cs, |t| t.wrapping_add(1));
            if let Some(first) = self.vt_first(cs) {
                first.delta.update(cs, |d| d - 1);
            }
        });

        loop {
            let fired = critical_section::with(|cs| {
                let first = self.vt_first(cs)?;
                if first.delta.get(cs) != 0 {
                    return None;
                }
                self.dequeue_locked(cs, first);
                let func = match first.func.get(cs) {
                    Some(f) => f,
                    None => self.halt_locked(cs, "armed timer without callback"),
                };
                self.callbacks_active.update(cs, |n| n + 1);
                Some((first, func, first.arg.get(cs), first.reload.get(cs)))
            });
            let Some((timer, func, arg, reload)) = fired else {
                break;
            };

            func(self, timer, arg);

            critical_section::with(|cs| {
                self.callbacks_active.update(cs, |n| n.wrapping_sub(1));
                if reload > 0 && timer.next.get(cs).is_none() {
                    self.do_set_locked(cs, timer, reload, func, arg, reload);
                }
            });
        }
    }

    fn dequeue_locked(&'static self, cs: CriticalSection<'_>, timer: &'static VTimer) {
        let (Some(next), Some(prev)) = (timer.next.get(cs), timer.prev.get(cs)) else {
            self.halt_locked(cs, "corrupt timer list")
        };
        prev.next.set(cs, Some(next));
        next.prev.set(cs, Some(prev));
        timer.next.set(cs, None);
        timer.prev.set(cs, None);
    }
}
