// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Backend-agnostic kernel logging.
//!
//! With the `log` feature enabled these forward to the `log` crate's
//! facade; without it they compile to nothing. Must not be invoked while
//! the kernel lock is held -- loggers may take their own locks.

#[cfg(feature = "log")]
pub(crate) use log::{debug, error};

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)*) => {{}};
}

#[cfg(not(feature = "log"))]
pub(crate) use debug;

#[cfg(not(feature = "log"))]
pub(crate) use error;
