// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command loop and trial sequencing for a fault-injection target.
//!
//! A controller on the other end of a serial line loads key shares with `K`
//! and runs trials with `E`. Each trial restores a scratch window to the
//! contents captured at boot, zeroes the IV, IV salt and working block,
//! pulses a trigger line for instrumentation to synchronize on, and only then
//! hands control to the protected decryption routine. The first half of the
//! working block goes back to the controller as upper-case hex.
//!
//! Everything the loop touches lives in one [`Harness`] value: the serial
//! port, the [`HarnessState`] buffers, the [`ScratchManager`], the
//! [`TriggerSequencer`], the [`ProtectedOp`] and the [`FaultChecks`] strategy
//! it passes through. Board crates assemble one; tests assemble another
//! from mocks.
//!
//! ## Wire protocol
//!
//! | byte | payload            | response             |
//! |------|--------------------|----------------------|
//! | `K`  | 128 raw key bytes  | `OK`                 |
//! | `E`  | none               | 32 upper-case hex    |
//! | else | none               | nothing              |
//!
//! [`FaultChecks`]: rcp_checks::FaultChecks

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod key;
pub mod protected;
pub mod scratch;
pub mod state;
pub mod trace;
pub mod trigger;

pub use config::{Hardening, HarnessConfig};
pub use dispatch::{Cancel, Command, Harness, Never};
pub use error::HarnessError;
pub use key::KeyShares;
pub use protected::{Block, BlockCount, OpStatus, ProtectedOp};
pub use scratch::{ScratchManager, ScratchMemory};
pub use state::HarnessState;
pub use trace::{Trace, TraceCounts, TraceLog};
pub use trigger::{PulseDelay, TriggerSequencer};

/// Size of the key-share buffer loaded by `K`.
pub const KEY_LEN: usize = 128;

/// Size of the IV and of the IV salt.
pub const IV_LEN: usize = 32;

/// Size of one working block.
pub const BLOCK_LEN: usize = 32;

/// Number of blocks handed to the protected operation per trial.
pub const BLOCK_COUNT: usize = 1;

/// Size of the scratch window that is captured at boot and restored before
/// every trial.
pub const SCRATCH_LEN: usize = 2048;

/// Number of working-block bytes reported after a trial.
pub const RESULT_LEN: usize = 16;

/// Acknowledgement sent once a full key has been received.
pub const ACK: &[u8] = b"OK";

static_assertions::const_assert!(RESULT_LEN <= BLOCK_LEN);
static_assertions::const_assert_eq!(SCRATCH_LEN % 4, 0);
