// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delegate threads.
//!
//! A delegate thread performs function calls on behalf of other threads.
//! This is the usual way to wrap a library that is not thread-safe: the
//! library lives in the delegate thread, and clients call into it through
//! [`Kernel::delegate_call1`] and friends without worrying about mutual
//! exclusion -- the dispatcher serializes everything.
//!
//! Calls travel over synchronous messaging. The caller packs the target
//! function pointer and its arguments into a stack-allocated pack, sends
//! a pointer to it, and blocks; the dispatcher runs the matching *veneer*,
//! which unpacks the arguments and invokes the target in the delegate
//! thread's context, then releases the caller with the return value.
//! Because the send is synchronous, the caller's stack frame -- and with
//! it the argument pack -- stays live for the whole call.
//!
//! One veneer exists per supported arity (zero to four word-sized
//! arguments, one word-sized result).

use abi::{Interval, Message, MSG_OK, MSG_TIMEOUT};

use crate::thread::Thread;
use crate::Kernel;

/// Uniform signature of the per-arity argument unpackers.
pub type Veneer = fn(*const ()) -> Message;

pub type DelegateFn0 = fn() -> Message;
pub type DelegateFn1 = fn(Message) -> Message;
pub type DelegateFn2 = fn(Message, Message) -> Message;
pub type DelegateFn3 = fn(Message, Message, Message) -> Message;
pub type DelegateFn4 = fn(Message, Message, Message, Message) -> Message;

/// The word sent to a dispatcher: which veneer to run and where the
/// caller's argument pack lives.
struct CallMessage {
    veneer: Veneer,
    argsp: *const (),
}

struct Args0 {
    func: DelegateFn0,
}

struct Args1 {
    func: DelegateFn1,
    p1: Message,
}

struct Args2 {
    func: DelegateFn2,
    p1: Message,
    p2: Message,
}

struct Args3 {
    func: DelegateFn3,
    p1: Message,
    p2: Message,
    p3: Message,
}

struct Args4 {
    func: DelegateFn4,
    p1: Message,
    p2: Message,
    p3: Message,
    p4: Message,
}

/// Veneer for functions with no parameters.
pub fn veneer0(argsp: *const ()) -> Message {
    // Safety: dispatched only with a pack built by the matching
    // `delegate_call`; the synchronous send keeps the caller's frame
    // alive until release.
    let args = unsafe { &*(argsp as *const Args0) };
    (args.func)()
}

/// Veneer for functions with one parameter.
pub fn veneer1(argsp: *const ()) -> Message {
    // Safety: as for `veneer0`.
    let args = unsafe { &*(argsp as *const Args1) };
    (args.func)(args.p1)
}

/// Veneer for functions with two parameters.
pub fn veneer2(argsp: *const ()) -> Message {
    // Safety: as for `veneer0`.
    let args = unsafe { &*(argsp as *const Args2) };
    (args.func)(args.p1, args.p2)
}

/// Veneer for functions with three parameters.
pub fn veneer3(argsp: *const ()) -> Message {
    // Safety: as for `veneer0`.
    let args = unsafe { &*(argsp as *const Args3) };
    (args.func)(args.p1, args.p2, args.p3)
}

/// Veneer for functions with four parameters.
pub fn veneer4(argsp: *const ()) -> Message {
    // Safety: as for `veneer0`.
    let args = unsafe { &*(argsp as *const Args4) };
    (args.func)(args.p1, args.p2, args.p3, args.p4)
}

impl Kernel {
    /// Triggers a call of `func` on the delegate thread `tp` and returns
    /// its result. The delegate must be executing
    /// [`Kernel::delegate_dispatch`] (or the timeout variant) for the
    /// call to be served.
    pub fn delegate_call0(&'static self, tp: &'static Thread, func: DelegateFn0) -> Message {
        let args = Args0 { func };
        self.delegate_send(tp, veneer0, &args as *const Args0 as *const ())
    }

    pub fn delegate_call1(
        &'static self,
        tp: &'static Thread,
        func: DelegateFn1,
        p1: Message,
    ) -> Message {
        let args = Args1 { func, p1 };
        self.delegate_send(tp, veneer1, &args as *const Args1 as *const ())
    }

    pub fn delegate_call2(
        &'static self,
        tp: &'static Thread,
        func: DelegateFn2,
        p1: Message,
        p2: Message,
    ) -> Message {
        let args = Args2 { func, p1, p2 };
        self.delegate_send(tp, veneer2, &args as *const Args2 as *const ())
    }

    pub fn delegate_call3(
        &'static self,
        tp: &'static Thread,
        func: DelegateFn3,
        p1: Message,
        p2: Message,
        p3: Message,
    ) -> Message {
        let args = Args3 { func, p1, p2, p3 };
        self.delegate_send(tp, veneer3, &args as *const Args3 as *const ())
    }

    pub fn delegate_call4(
        &'static self,
        tp: &'static Thread,
        func: DelegateFn4,
        p1: Message,
        p2: Message,
        p3: Message,
        p4: Message,
    ) -> Message {
        let args = Args4 {
            func,
            p1,
            p2,
            p3,
            p4,
        };
        self.delegate_send(tp, veneer4, &args as *const Args4 as *const ())
    }

    /// Serves one delegate call in the calling thread's context and
    /// returns [`MSG_OK`]. Blocks until a call arrives.
    pub fn delegate_dispatch(&'static self) -> Message {
        let sender = self.msg_wait();
        self.dispatch_one(sender);
        MSG_OK
    }

    /// Like [`Kernel::delegate_dispatch`], but gives up after `timeout`
    /// ticks and returns [`MSG_TIMEOUT`] without running anything.
    pub fn delegate_dispatch_timeout(&'static self, timeout: Interval) -> Message {
        let Some(sender) = self.msg_wait_timeout(timeout) else {
            return MSG_TIMEOUT;
        };
        self.dispatch_one(sender);
        MSG_OK
    }

    fn delegate_send(
        &'static self,
        tp: &'static Thread,
        veneer: Veneer,
        argsp: *const (),
    ) -> Message {
        let cm = CallMessage { veneer, argsp };
        self.msg_send(tp, &cm as *const CallMessage as usize as Message)
    }

    fn dispatch_one(&'static self, sender: &'static Thread) {
        let msg = self.msg_get(sender);
        // Safety: threads dispatched as delegates only ever receive
        // messages from `delegate_send`, which sends a pointer to a live
        // `CallMessage`; the sender stays suspended (frame intact) until
        // the release below.
        let cm = unsafe { &*(msg as usize as *const CallMessage) };
        let ret = (cm.veneer)(cm.argsp);
        self.msg_release(sender, ret);
    }
}
