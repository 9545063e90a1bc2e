// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture and port support.
//!
//! Embedded ports implement [`crate::port::Port`] over their hardware
//! timer and scheduler and register a `critical-section` implementation.
//! Hosted builds (tests, simulation) get [`hosted::HostedPort`], which
//! runs the kernel semantics over OS threads and a manually driven clock.

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "none"))] {
        pub mod hosted;
    }
}
