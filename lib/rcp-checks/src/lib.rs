// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Redundancy checks for fault-sensitive code paths.
//!
//! Code under attack (the protected decryption routine, and the harness's own
//! trial sequence) calls these checks at the points where a skipped
//! instruction or a flipped bit would matter: booleans are validated, paired
//! integers are compared, a step counter tracks progress through a sequence,
//! and canaries guard values that must survive a call.
//!
//! What a check *does* is decided by the strategy the call site is handed:
//!
//! - [`Disabled`] makes every check a no-op. This is the configuration used
//!   when the point of the exercise is to let an injected fault succeed and
//!   observe its effect.
//! - [`Enforcing`] evaluates every check and, on the first failure, records
//!   the [`Violation`] and hands control to a [`FailSafe`], which never
//!   returns.
//!
//! Booleans use the redundancy coprocessor encoding, where [`TRUE`] and
//! [`FALSE`] are far apart in Hamming distance and every other word is
//! invalid.

#![cfg_attr(not(test), no_std)]

/// Encoded boolean `true`.
pub const TRUE: u32 = 0xa500_a500;

/// Encoded boolean `false`.
pub const FALSE: u32 = 0x00c3_00c3;

/// Mask relating an integer to its parity word; see [`FaultChecks::ivalid`].
pub const PARITY_MASK: u32 = 0xa5a5_a5a5;

/// Encodes a native `bool` for use with the boolean checks.
pub const fn encode_bool(b: bool) -> u32 {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Computes the parity word that [`FaultChecks::ivalid`] expects for `x`.
pub const fn parity(x: u32) -> u32 {
    x ^ PARITY_MASK
}

/// Reasons an enforcing check can fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A word that should have been an encoded boolean was neither
    /// [`TRUE`] nor [`FALSE`].
    InvalidBool(u32),
    /// A boolean asserted true was something else.
    ExpectedTrue(u32),
    /// A boolean asserted false was something else.
    ExpectedFalse(u32),
    /// Neither operand of a two-way "or" was true.
    NeitherTrue(u32, u32),
    /// An integer and its parity word disagree.
    Parity { value: u32, parity: u32 },
    /// Two words that must match did not.
    Unequal(u32, u32),
    /// The step counter was checked before it was ever set.
    CounterUnset,
    /// The step counter was not at the expected step.
    CounterMismatch { expected: u8, actual: u8 },
    /// A canary did not match the value issued for its tag.
    Canary { tag: u8 },
    /// The code under protection gave up explicitly.
    Panic,
}

/// What happens once an enforcing check fails.
pub trait FailSafe {
    fn halt(&mut self, violation: Violation) -> !;
}

/// Parks the core in a tight loop, leaving state intact for a debugger.
#[derive(Copy, Clone, Debug, Default)]
pub struct Spin;

impl FailSafe for Spin {
    fn halt(&mut self, _violation: Violation) -> ! {
        park()
    }
}

fn park() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// The check set a protected code path calls into.
///
/// Every method takes `&mut self` so that a strategy can keep state (the step
/// counter, the canary salt, the last violation) without interior mutability.
pub trait FaultChecks {
    /// `b` is an encoded boolean.
    fn bvalid(&mut self, b: u32);
    /// `b` is encoded `true`.
    fn btrue(&mut self, b: u32);
    /// `b` is encoded `false`.
    fn bfalse(&mut self, b: u32);
    /// [`btrue`](FaultChecks::btrue) on the encoding of `cond()`. A strategy
    /// that checks nothing never calls `cond`.
    fn btrue_with(&mut self, cond: impl FnOnce() -> bool) {
        self.btrue(encode_bool(cond()));
    }
    /// Both words are encoded booleans.
    fn b2valid(&mut self, b0: u32, b1: u32);
    /// Both words are encoded `true`.
    fn b2and(&mut self, b0: u32, b1: u32);
    /// Both words are encoded booleans and at least one is `true`.
    fn b2or(&mut self, b0: u32, b1: u32);
    /// `b ^ mask` is an encoded boolean.
    fn bxorvalid(&mut self, b: u32, mask: u32);
    /// `b ^ mask` is encoded `true`.
    fn bxortrue(&mut self, b: u32, mask: u32);
    /// `b ^ mask` is encoded `false`.
    fn bxorfalse(&mut self, b: u32, mask: u32);
    /// `parity` is the parity word of `x`, see [`parity`].
    fn ivalid(&mut self, x: u32, parity: u32);
    /// `x == y`.
    fn iequal(&mut self, x: u32, y: u32);
    /// Sets the step counter to `cnt`.
    fn count_set(&mut self, cnt: u8);
    /// The step counter is at `cnt`; advances it by one.
    fn count_check(&mut self, cnt: u8);
    /// Issues the canary value for `tag`.
    fn canary_get(&mut self, tag: u8) -> u32;
    /// `x` is the canary value previously issued for `tag`.
    fn canary_check(&mut self, x: u32, tag: u8);
    /// Unconditional failure.
    fn panic(&mut self) -> !;
}

/// Hardening switched off: every check is a no-op.
///
/// The explicit [`FaultChecks::panic`] still does not return; it parks the
/// core the way the unhardened firmware always has.
#[derive(Copy, Clone, Debug, Default)]
pub struct Disabled;

impl FaultChecks for Disabled {
    #[inline(always)]
    fn bvalid(&mut self, _b: u32) {}
    #[inline(always)]
    fn btrue(&mut self, _b: u32) {}
    #[inline(always)]
    fn bfalse(&mut self, _b: u32) {}
    #[inline(always)]
    fn btrue_with(&mut self, _cond: impl FnOnce() -> bool) {}
    #[inline(always)]
    fn b2valid(&mut self, _b0: u32, _b1: u32) {}
    #[inline(always)]
    fn b2and(&mut self, _b0: u32, _b1: u32) {}
    #[inline(always)]
    fn b2or(&mut self, _b0: u32, _b1: u32) {}
    #[inline(always)]
    fn bxorvalid(&mut self, _b: u32, _mask: u32) {}
    #[inline(always)]
    fn bxortrue(&mut self, _b: u32, _mask: u32) {}
    #[inline(always)]
    fn bxorfalse(&mut self, _b: u32, _mask: u32) {}
    #[inline(always)]
    fn ivalid(&mut self, _x: u32, _parity: u32) {}
    #[inline(always)]
    fn iequal(&mut self, _x: u32, _y: u32) {}
    #[inline(always)]
    fn count_set(&mut self, _cnt: u8) {}
    #[inline(always)]
    fn count_check(&mut self, _cnt: u8) {}
    #[inline(always)]
    fn canary_get(&mut self, _tag: u8) -> u32 {
        0
    }
    #[inline(always)]
    fn canary_check(&mut self, _x: u32, _tag: u8) {}

    fn panic(&mut self) -> ! {
        park()
    }
}

/// Hardening switched on.
#[derive(Debug)]
pub struct Enforcing<F> {
    salt: u32,
    counter: Option<u8>,
    last_violation: Option<Violation>,
    fail_safe: F,
}

impl<F: FailSafe> Enforcing<F> {
    /// Creates an enforcing strategy. `salt` should be fresh per boot; it
    /// keys the canary values.
    pub fn new(salt: u32, fail_safe: F) -> Self {
        Self {
            salt,
            counter: None,
            last_violation: None,
            fail_safe,
        }
    }

    /// The violation that tripped the fail-safe, if any. Only observable
    /// through a debugger on a fail-safe that really does halt.
    pub fn last_violation(&self) -> Option<Violation> {
        self.last_violation
    }

    fn fail(&mut self, violation: Violation) -> ! {
        self.last_violation = Some(violation);
        self.fail_safe.halt(violation)
    }

    fn canary(&self, tag: u8) -> u32 {
        let tag = u32::from(tag);
        self.salt.rotate_left(tag & 31) ^ tag.wrapping_mul(0x0101_0101)
    }

    fn expect_valid(&mut self, b: u32) {
        if b != TRUE && b != FALSE {
            self.fail(Violation::InvalidBool(b));
        }
    }

    fn expect_true(&mut self, b: u32) {
        if b != TRUE {
            self.fail(Violation::ExpectedTrue(b));
        }
    }

    fn expect_false(&mut self, b: u32) {
        if b != FALSE {
            self.fail(Violation::ExpectedFalse(b));
        }
    }
}

impl<F: FailSafe> FaultChecks for Enforcing<F> {
    fn bvalid(&mut self, b: u32) {
        self.expect_valid(b);
    }

    fn btrue(&mut self, b: u32) {
        self.expect_true(b);
    }

    fn bfalse(&mut self, b: u32) {
        self.expect_false(b);
    }

    fn b2valid(&mut self, b0: u32, b1: u32) {
        self.expect_valid(b0);
        self.expect_valid(b1);
    }

    fn b2and(&mut self, b0: u32, b1: u32) {
        self.expect_true(b0);
        self.expect_true(b1);
    }

    fn b2or(&mut self, b0: u32, b1: u32) {
        self.expect_valid(b0);
        self.expect_valid(b1);
        if b0 != TRUE && b1 != TRUE {
            self.fail(Violation::NeitherTrue(b0, b1));
        }
    }

    fn bxorvalid(&mut self, b: u32, mask: u32) {
        self.expect_valid(b ^ mask);
    }

    fn bxortrue(&mut self, b: u32, mask: u32) {
        self.expect_true(b ^ mask);
    }

    fn bxorfalse(&mut self, b: u32, mask: u32) {
        self.expect_false(b ^ mask);
    }

    fn ivalid(&mut self, x: u32, parity: u32) {
        if parity != crate::parity(x) {
            self.fail(Violation::Parity { value: x, parity });
        }
    }

    fn iequal(&mut self, x: u32, y: u32) {
        if x != y {
            self.fail(Violation::Unequal(x, y));
        }
    }

    fn count_set(&mut self, cnt: u8) {
        self.counter = Some(cnt);
    }

    fn count_check(&mut self, cnt: u8) {
        match self.counter {
            Some(actual) if actual == cnt => {
                self.counter = Some(actual.wrapping_add(1));
            }
            Some(actual) => self.fail(Violation::CounterMismatch {
                expected: cnt,
                actual,
            }),
            None => self.fail(Violation::CounterUnset),
        }
    }

    fn canary_get(&mut self, tag: u8) -> u32 {
        self.canary(tag)
    }

    fn canary_check(&mut self, x: u32, tag: u8) {
        if x != self.canary(tag) {
            self.fail(Violation::Canary { tag });
        }
    }

    fn panic(&mut self) -> ! {
        self.fail(Violation::Panic)
    }
}
