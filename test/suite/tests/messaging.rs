// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messaging integration tests: rendez-vous send/release, queueing
//! disciplines, timeouts, and the coincident-event variant, with every
//! kernel thread backed by a host thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use kern::arch::hosted::{self, AlarmState, HostedPort};
use kern::trace::{self, Trace};
use kern::{
    EventListener, EventSource, Kernel, Thread, MSG_TIMEOUT,
};
use test_suite::{init_logging, wait_until};

#[test]
fn send_wait_release_round_trip() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static T1: Thread = Thread::new("t1", 5);
    static T2: Thread = Thread::new("t2", 5);

    init_logging();
    K.init(&PORT);
    let receiver = hosted::spawn(&T2, || {
        let sender = K.msg_wait();
        assert_eq!(sender.name(), "t1");
        assert_eq!(K.msg_get(sender), 0xAA);
        K.msg_release(sender, 0x55);
    });
    let sender = hosted::spawn(&T1, || {
        assert_eq!(K.msg_send(&T2, 0xAA), 0x55);
    });

    sender.join().expect("sender");
    receiver.join().expect("receiver");
    assert!(!T2.has_queued_senders());
}

#[test]
fn fifo_senders_are_released_in_arrival_order() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static RECV: Thread = Thread::new("recv", 5);
    static S1: Thread = Thread::new("s1", 5);
    static S2: Thread = Thread::new("s2", 9);
    static S3: Thread = Thread::new("s3", 7);
    static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    K.init(&PORT);

    // Queue the three senders in a known arrival order. Without
    // priority messaging, higher priority must not jump the queue.
    let h1 = hosted::spawn(&S1, || {
        assert_eq!(K.msg_send(&RECV, 1), 101);
    });
    wait_until("first sender queued", || RECV.queued_senders() == 1);
    let h2 = hosted::spawn(&S2, || {
        assert_eq!(K.msg_send(&RECV, 2), 102);
    });
    wait_until("second sender queued", || RECV.queued_senders() == 2);
    let h3 = hosted::spawn(&S3, || {
        assert_eq!(K.msg_send(&RECV, 3), 103);
    });
    wait_until("third sender queued", || RECV.queued_senders() == 3);

    let recv = hosted::spawn(&RECV, || {
        for _ in 0..3 {
            let sender = K.msg_wait();
            ORDER.lock().unwrap().push(sender.name());
            let msg = K.msg_get(sender);
            K.msg_release(sender, msg + 100);
        }
    });

    for h in [h1, h2, h3, recv] {
        h.join().expect("messaging thread");
    }
    assert_eq!(*ORDER.lock().unwrap(), ["s1", "s2", "s3"]);
}

#[test]
fn priority_messaging_releases_the_highest_sender_first() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static RECV: Thread = Thread::new("recv", 5);
    static T1: Thread = Thread::new("t1", 5);
    static T3: Thread = Thread::new("t3", 7);
    static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    K.init(&PORT);
    RECV.set_msg_by_prio(true);

    let h1 = hosted::spawn(&T1, || {
        K.msg_send(&RECV, 0xA1);
    });
    wait_until("low-priority sender queued", || RECV.queued_senders() == 1);
    let h3 = hosted::spawn(&T3, || {
        K.msg_send(&RECV, 0xA3);
    });
    wait_until("high-priority sender queued", || RECV.queued_senders() == 2);

    let recv = hosted::spawn(&RECV, || {
        for _ in 0..2 {
            let sender = K.msg_wait();
            ORDER.lock().unwrap().push(sender.name());
            K.msg_release(sender, 0);
        }
    });

    for h in [h1, h3, recv] {
        h.join().expect("messaging thread");
    }
    assert_eq!(*ORDER.lock().unwrap(), ["t3", "t1"]);
}

#[test]
fn send_timeout_expires_when_nobody_receives() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static RECV: Thread = Thread::new("recv", 5);
    static S: Thread = Thread::new("s", 5);

    K.init(&PORT);
    let h = hosted::spawn(&S, || {
        assert_eq!(K.msg_send_timeout(&RECV, 7, 50), MSG_TIMEOUT);
    });

    wait_until("sender queued", || RECV.queued_senders() == 1);
    assert_eq!(PORT.alarm(), AlarmState::Armed(50));

    PORT.set_now(50);
    K.tick_isr();
    h.join().expect("sender");

    // The cancelled sender was pulled back out of the queue.
    assert_eq!(RECV.queued_senders(), 0);
    assert_eq!(PORT.alarm(), AlarmState::Stopped);
}

#[test]
fn send_timeout_released_in_time_disarms_the_timer() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static RECV: Thread = Thread::new("recv", 5);
    static S: Thread = Thread::new("s", 5);

    K.init(&PORT);
    let sender = hosted::spawn(&S, || {
        assert_eq!(K.msg_send_timeout(&RECV, 7, 5_000), 0x99);
    });
    let receiver = hosted::spawn(&RECV, || {
        let s = K.msg_wait();
        assert_eq!(K.msg_get(s), 7);
        K.msg_release(s, 0x99);
    });

    sender.join().expect("sender");
    receiver.join().expect("receiver");
    // With the send released, the timeout timer is gone and the alarm is
    // idle again.
    assert_eq!(PORT.alarm(), AlarmState::Stopped);
}

#[test]
fn send_with_event_wakes_an_event_waiting_server() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static SRV: Thread = Thread::new("srv", 5);
    static CLI: Thread = Thread::new("cli", 5);
    static ES: EventSource = EventSource::new();
    static EL: EventListener = EventListener::new();
    static REGISTERED: AtomicBool = AtomicBool::new(false);

    const MSG_EVENT: u32 = 1 << 0;

    K.init(&PORT);
    let server = hosted::spawn(&SRV, || {
        K.evt_register(&ES, &EL, MSG_EVENT);
        REGISTERED.store(true, Ordering::SeqCst);
        let got = K.evt_wait_any(MSG_EVENT);
        assert_eq!(got, MSG_EVENT);
        let sender = K.msg_poll().expect("event implies a pending message");
        let msg = K.msg_get(sender);
        K.msg_release(sender, msg + 1);
    });

    wait_until("server registration", || REGISTERED.load(Ordering::SeqCst));
    let client = hosted::spawn(&CLI, || {
        assert_eq!(K.msg_send_with_event(&SRV, 41, &ES), 42);
    });

    client.join().expect("client");
    server.join().expect("server");
}

#[test]
fn release_without_a_sender_halts_the_kernel() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static T: Thread = Thread::new("t", 5);

    K.init(&PORT);
    let h = hosted::spawn(&T, || {
        K.msg_release(&T, 0);
    });
    assert!(h.join().is_err());
    assert_eq!(
        trace::panic_message(),
        Some("message release without a queued sender")
    );
}

#[test]
fn exchanges_leave_a_context_switch_trace() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();
    static T1: Thread = Thread::new("t1", 5);
    static T2: Thread = Thread::new("t2", 5);

    K.init(&PORT);
    let receiver = hosted::spawn(&T2, || {
        let sender = K.msg_wait();
        K.msg_release(sender, 0);
    });
    let sender = hosted::spawn(&T1, || {
        K.msg_send(&T2, 1);
    });
    sender.join().expect("sender");
    receiver.join().expect("receiver");

    let wanted = (&T1 as *const Thread as usize >> 4) as u32;
    let mut entries = [None; 64];
    let n = trace::snapshot(&mut entries);
    let seen = entries[..n].iter().flatten().any(|e| {
        matches!(e.payload, Trace::Switch { tid, .. } if tid == wanted)
    });
    assert!(seen, "no trace entry for the sending thread");
}
