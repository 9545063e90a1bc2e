// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared scaffolding for the kernel integration tests.

use std::time::{Duration, Instant};

/// Routes kernel logging (the `log` feature of `kern`) into the test
/// harness output. Idempotent; call at the top of any test that wants
/// `RUST_LOG` to work.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Polls `pred` until it holds, failing the test if it does not within
/// five seconds. Used to sequence test threads against kernel state
/// transitions without sleeping blindly.
pub fn wait_until(what: &str, mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !pred() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::yield_now();
    }
}

/// A small deterministic generator for the randomized property tests
/// (xorshift64). Seeded per test so failures reproduce.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `[lo, hi)`.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.next() % (hi - lo)
    }
}
