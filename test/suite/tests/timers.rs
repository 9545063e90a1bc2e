// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual-timer integration tests: expiry, ordering, compression, and
//! periodic fidelity, driven through the hosted port's simulated clock.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use kern::arch::hosted::{self, AlarmState, HostedPort};
use kern::{Kernel, Thread, VTimer};
use test_suite::{init_logging, wait_until, XorShift};

fn nop(_k: &'static Kernel, _t: &'static VTimer, _arg: usize) {}

#[test]
fn simple_expiry_fires_in_order_and_stops_the_alarm() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static A: VTimer = VTimer::new();
    static B: VTimer = VTimer::new();
    static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    fn record(_k: &'static Kernel, _t: &'static VTimer, arg: usize) {
        ORDER.lock().unwrap().push(arg);
    }

    init_logging();
    PORT.set_now(100);
    K.init(&PORT);
    K.vt_set(&A, 10, record, 0);
    K.vt_set(&B, 5, record, 1);

    PORT.set_now(105);
    K.tick_isr();
    assert_eq!(*ORDER.lock().unwrap(), [1]);

    PORT.set_now(110);
    K.tick_isr();
    assert_eq!(*ORDER.lock().unwrap(), [1, 0]);

    assert!(!A.is_armed() && !B.is_armed());
    assert_eq!(PORT.alarm(), AlarmState::Stopped);
}

#[test]
fn reset_mid_flight_suppresses_the_callback() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static A: VTimer = VTimer::new();
    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn count(_k: &'static Kernel, _t: &'static VTimer, _arg: usize) {
        FIRED.fetch_add(1, Ordering::Relaxed);
    }

    K.init(&PORT);
    K.vt_set(&A, 20, count, 0);
    PORT.set_now(5);
    K.vt_reset(&A);
    assert_eq!(PORT.alarm(), AlarmState::Stopped);

    PORT.set_now(30);
    K.tick_isr();
    assert_eq!(FIRED.load(Ordering::Relaxed), 0);
}

#[test]
fn continuous_timer_fires_on_the_period_grid() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static P: VTimer = VTimer::new();
    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn count(_k: &'static Kernel, _t: &'static VTimer, _arg: usize) {
        FIRED.fetch_add(1, Ordering::Relaxed);
    }

    K.init(&PORT);
    K.vt_set_continuous(&P, 100, count, 0);

    for t in [100, 200, 300, 400] {
        PORT.set_now(t);
        K.tick_isr();
    }
    assert_eq!(FIRED.load(Ordering::Relaxed), 4);

    K.vt_reset(&P);
    PORT.set_now(500);
    K.tick_isr();
    assert_eq!(FIRED.load(Ordering::Relaxed), 4);
}

#[test]
fn overflowing_delta_compresses_without_moving_deadlines() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static T0: VTimer = VTimer::new();
    static T1: VTimer = VTimer::new();
    static T2: VTimer = VTimer::new();

    PORT.set_now(0);
    K.init(&PORT);
    K.vt_set(&T0, 3_000_000_000, nop, 0);
    K.vt_set(&T1, 1_000_000_000, nop, 1);

    // This arming makes the base-relative delta overflow the interval
    // type, forcing the list to re-anchor at the current time.
    PORT.set_now(900_000_000);
    K.vt_set(&T2, 3_500_000_000, nop, 2);

    assert_eq!(K.vt_remaining(&T1), 100_000_000);
    assert_eq!(K.vt_remaining(&T0), 2_100_000_000);
    assert_eq!(K.vt_remaining(&T2), 3_500_000_000);
}

#[test]
fn random_arm_disarm_preserves_the_delta_invariant() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    const NEW: VTimer = VTimer::new();
    static TIMERS: [VTimer; 8] = [NEW; 8];

    K.init(&PORT);
    let mut rng = XorShift::new(0x1dea);
    let mut expected: [Option<u64>; 8] = [None; 8];
    let mut now: u64 = 0;

    for _ in 0..2_000 {
        match rng.range(0, 3) {
            0 => {
                let i = rng.range(0, 8) as usize;
                if expected[i].is_none() {
                    let delay = rng.range(2, 10_000) as u32;
                    K.vt_set(&TIMERS[i], delay, nop, i);
                    expected[i] = Some(now + delay as u64);
                }
            }
            1 => {
                let i = rng.range(0, 8) as usize;
                if expected[i].is_some() {
                    K.vt_reset(&TIMERS[i]);
                    expected[i] = None;
                }
            }
            _ => {
                now += rng.range(0, 5_000);
                PORT.set_now(now as u32);
                K.tick_isr();
                for e in expected.iter_mut() {
                    if matches!(*e, Some(d) if d <= now) {
                        *e = None;
                    }
                }
            }
        }

        // Every armed timer's base plus delta prefix sum must equal its
        // arming deadline, observable as an exact remaining interval.
        for (i, e) in expected.iter().enumerate() {
            match *e {
                Some(d) => {
                    assert!(TIMERS[i].is_armed());
                    assert_eq!(u64::from(K.vt_remaining(&TIMERS[i])), d - now);
                }
                None => assert!(!TIMERS[i].is_armed()),
            }
        }
    }
}

#[test]
fn random_deadlines_fire_sorted_with_stable_ties() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    const NEW: VTimer = VTimer::new();
    static TIMERS: [VTimer; 10] = [NEW; 10];
    static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    fn record(_k: &'static Kernel, _t: &'static VTimer, arg: usize) {
        ORDER.lock().unwrap().push(arg);
    }

    K.init(&PORT);
    let mut rng = XorShift::new(0xf1fe);
    // A narrow delay range forces ties, which must fire in arming order.
    let delays: Vec<u32> = (0..10).map(|_| rng.range(2, 8) as u32).collect();
    for (i, &d) in delays.iter().enumerate() {
        K.vt_set(&TIMERS[i], d, record, i);
    }

    let mut want: Vec<usize> = (0..10).collect();
    want.sort_by_key(|&i| delays[i]);

    PORT.set_now(10);
    K.tick_isr();
    assert_eq!(*ORDER.lock().unwrap(), want);
}

#[test]
fn sleep_wakes_at_the_deadline() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static SLEEPER: Thread = Thread::new("sleeper", 5);
    static DONE: AtomicBool = AtomicBool::new(false);

    K.init(&PORT);
    let h = hosted::spawn(&SLEEPER, || {
        K.sleep(100);
        DONE.store(true, Ordering::SeqCst);
    });

    wait_until("sleep to arm the alarm", || {
        PORT.alarm() == AlarmState::Armed(100)
    });
    assert!(!DONE.load(Ordering::SeqCst));

    PORT.set_now(100);
    K.tick_isr();
    h.join().expect("sleeper");
    assert!(DONE.load(Ordering::SeqCst));
}
