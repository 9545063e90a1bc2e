// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-stamp integration tests: monotonicity across tick wrap and
//! agreement with the underlying counter.

use kern::arch::hosted::HostedPort;
use kern::Kernel;
use test_suite::XorShift;

#[test]
fn stamps_never_decrease_and_track_the_tick() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();

    // Start close to the wrap so the sequence crosses it several times.
    let mut now = u32::MAX - 10_000;
    PORT.set_now(now);
    K.init(&PORT);

    let mut rng = XorShift::new(0x7153);
    let mut prev = K.get_time_stamp();
    for _ in 0..1_000 {
        // Steps stay far below half the tick range, as the sampling
        // contract requires.
        let step = rng.range(0, 100_000_000) as u32;
        PORT.advance(step);
        now = now.wrapping_add(step);

        let stamp = K.get_time_stamp();
        assert!(stamp >= prev);
        // The wide count agrees with the narrow counter modulo the tick
        // width.
        assert_eq!(stamp as u32, now);
        prev = stamp;
    }
}

#[test]
fn reset_restarts_from_the_current_tick() {
    static K: Kernel = Kernel::new();
    static PORT: HostedPort = HostedPort::new();

    PORT.set_now(500);
    K.init(&PORT);
    PORT.advance(100);
    assert_eq!(K.get_time_stamp(), 600);

    PORT.advance(100);
    K.reset_time_stamp();
    assert_eq!(K.get_time_stamp(), 700);
}
