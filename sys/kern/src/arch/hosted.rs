// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hosted port: kernel semantics on a desktop OS.
//!
//! Kernel threads are backed by OS threads, the tick counter is a plain
//! atomic that tests advance by hand, and the alarm is recorded rather
//! than wired to an interrupt -- a test advances the clock and calls
//! [`crate::Kernel::tick_isr`] itself, standing in for the alarm
//! interrupt. Blocking uses a per-thread wakeup token under a mutex and
//! condvar, so a wakeup that lands between publishing a blocked state and
//! actually parking is never lost.

use core::sync::atomic::{AtomicU32, Ordering};
use std::cell::Cell;
use std::string::String;
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::vec::Vec;

use abi::Tick;

use crate::port::Port;
use crate::thread::Thread;

/// What the simulated alarm comparator is doing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmState {
    Stopped,
    Armed(Tick),
}

pub struct HostedPort {
    now: AtomicU32,
    alarm: Mutex<AlarmState>,
    /// Wakeup tokens keyed by thread control-block address.
    wake: Mutex<Vec<(usize, bool)>>,
    wake_cond: Condvar,
}

std::thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(0) };
}

/// Binds `tp` to the calling OS thread. Kernel operations performed on
/// this OS thread afterwards act on behalf of `tp`.
pub fn bind_current(tp: &'static Thread) {
    CURRENT.with(|c| c.set(tp as *const Thread as usize));
}

/// Spawns an OS thread bound to `tp` running `body`.
pub fn spawn(
    tp: &'static Thread,
    body: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(String::from(tp.name()))
        .spawn(move || {
            bind_current(tp);
            body()
        })
        .expect("spawning kernel thread")
}

impl HostedPort {
    pub const fn new() -> Self {
        Self {
            now: AtomicU32::new(0),
            alarm: Mutex::new(AlarmState::Stopped),
            wake: Mutex::new(Vec::new()),
            wake_cond: Condvar::new(),
        }
    }

    /// Sets the simulated tick counter.
    pub fn set_now(&self, t: Tick) {
        self.now.store(t, Ordering::SeqCst);
    }

    /// Advances the simulated tick counter, wrapping.
    pub fn advance(&self, d: u32) {
        self.now.fetch_add(d, Ordering::SeqCst);
    }

    /// What the alarm is currently programmed to.
    pub fn alarm(&self) -> AlarmState {
        *self.alarm.lock().unwrap()
    }

    fn token<'a>(wake: &'a mut Vec<(usize, bool)>, key: usize) -> &'a mut bool {
        if let Some(i) = wake.iter().position(|e| e.0 == key) {
            return &mut wake[i].1;
        }
        wake.push((key, false));
        let i = wake.len() - 1;
        &mut wake[i].1
    }
}

impl Port for HostedPort {
    fn tick(&self) -> Tick {
        self.now.load(Ordering::SeqCst)
    }

    fn start_alarm(&self, at: Tick) {
        *self.alarm.lock().unwrap() = AlarmState::Armed(at);
    }

    fn set_alarm(&self, at: Tick) {
        *self.alarm.lock().unwrap() = AlarmState::Armed(at);
    }

    fn stop_alarm(&self) {
        *self.alarm.lock().unwrap() = AlarmState::Stopped;
    }

    fn halt(&self, msg: &str) -> ! {
        panic!("kernel halt: {}", msg);
    }

    fn current(&self) -> &'static Thread {
        let p = CURRENT.with(|c| c.get());
        if p == 0 {
            panic!("no kernel thread is bound to this host thread");
        }
        // Safety: only `bind_current` stores here, and it only accepts
        // `&'static Thread`.
        unsafe { &*(p as *const Thread) }
    }

    fn block(&self, tp: &'static Thread) {
        let key = tp as *const Thread as usize;
        let mut wake = self.wake.lock().unwrap();
        loop {
            let token = Self::token(&mut wake, key);
            if *token {
                *token = false;
                return;
            }
            wake = self.wake_cond.wait(wake).unwrap();
        }
    }

    fn unblock(&self, tp: &'static Thread) {
        let key = tp as *const Thread as usize;
        let mut wake = self.wake.lock().unwrap();
        *Self::token(&mut wake, key) = true;
        self.wake_cond.notify_all();
    }
}
