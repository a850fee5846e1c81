// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted stand-in for the target.
//!
//! Serves the harness protocol on stdin/stdout so controller scripts can be
//! checked without a board. The protected routine is replaced by XORing the
//! recombined key into the working block, which is enough to see key loads
//! take effect. End of input stops the loop.

use std::convert::Infallible;
use std::io::{self, Read as _, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::serial::{Read, Write};
use glitch_harness::{
    Block, Hardening, Harness, HarnessState, KeyShares, OpStatus, ProtectedOp,
    PulseDelay, TraceCounts, TriggerSequencer, IV_LEN, SCRATCH_LEN,
};
use rcp_checks::{Disabled, Enforcing, FaultChecks};

use crate::config;

pub fn run() -> Result<()> {
    let (input, output) = (io::stdin().lock(), io::stdout().lock());
    let counts = match config::HARNESS.hardening {
        Hardening::Disabled => serve(input, output, Disabled)?,
        Hardening::Enforcing => {
            let salt = getrandom::u32()
                .map_err(|e| anyhow!("no entropy for canary salt: {e}"))?;
            serve(input, output, Enforcing::new(salt, config::FAIL_SAFE))?
        }
    };
    eprintln!("{counts:?}");
    Ok(())
}

/// Runs the harness over `input` and `output` until `input` runs dry.
fn serve<R: io::Read, W: io::Write, C: FaultChecks>(
    input: R,
    output: W,
    checks: C,
) -> Result<TraceCounts> {
    let eof = AtomicBool::new(false);
    let trigger =
        TriggerSequencer::new(NoPin, Spin, config::HARNESS.pulse_cycles);
    let mut harness = Harness::new(
        Stream {
            input,
            output,
            eof: &eof,
        },
        HarnessState::default(),
        [0u8; SCRATCH_LEN],
        trigger,
        XorKey,
        checks,
    );

    harness
        .run(&eof)
        .map_err(|e| anyhow!("serial transport failed: {e:?}"))?;
    Ok(*harness.trace().counts())
}

/// A byte stream pair as a serial port. Raises `eof` when `input` closes.
struct Stream<'a, R, W> {
    input: R,
    output: W,
    eof: &'a AtomicBool,
}

impl<R: io::Read, W> Read<u8> for Stream<'_, R, W> {
    type Error = io::ErrorKind;

    fn read(&mut self) -> nb::Result<u8, io::ErrorKind> {
        let mut byte = [0];
        match self.input.read(&mut byte) {
            Ok(0) => {
                self.eof.store(true, Ordering::Relaxed);
                Err(nb::Error::WouldBlock)
            }
            Ok(_) => Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                Err(nb::Error::WouldBlock)
            }
            Err(e) => Err(nb::Error::Other(e.kind())),
        }
    }
}

impl<R, W: io::Write> Write<u8> for Stream<'_, R, W> {
    type Error = io::ErrorKind;

    fn write(&mut self, byte: u8) -> nb::Result<(), io::ErrorKind> {
        self.output
            .write_all(&[byte])
            .map_err(|e| nb::Error::Other(e.kind()))
    }

    fn flush(&mut self) -> nb::Result<(), io::ErrorKind> {
        self.output.flush().map_err(|e| nb::Error::Other(e.kind()))
    }
}

struct NoPin;

impl OutputPin for NoPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

struct Spin;

impl PulseDelay for Spin {
    fn delay_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            std::hint::spin_loop();
        }
    }
}

struct XorKey;

impl ProtectedOp for XorKey {
    fn decrypt<C: FaultChecks>(
        &mut self,
        key: &KeyShares,
        _iv_salt: &[u8; IV_LEN],
        _iv: &[u8; IV_LEN],
        blocks: &mut [Block],
        _checks: &mut C,
    ) -> OpStatus {
        let key = key.combine();
        for block in blocks {
            for (b, k) in block.iter_mut().zip(&key) {
                *b ^= k;
            }
        }
        OpStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch_harness::KEY_LEN;

    fn session(input: &[u8]) -> (Vec<u8>, TraceCounts) {
        let mut output = Vec::new();
        let counts = serve(input, &mut output, Disabled).unwrap();
        (output, counts)
    }

    #[test]
    fn serves_until_input_ends() {
        let mut input = vec![b'K'];
        input.extend([0u8; KEY_LEN]);
        input.extend(b"zE");

        let (output, counts) = session(&input);

        assert_eq!(output, [&b"OK"[..], &[b'0'; 32][..]].concat());
        assert_eq!(counts.keys_loaded, 1);
        assert_eq!(counts.ignored, 1);
        assert_eq!(counts.trials, 1);
    }

    #[test]
    fn empty_input_stops_at_once() {
        let (output, counts) = session(&[]);
        assert!(output.is_empty());
        assert_eq!(counts, TraceCounts::default());
    }

    #[test]
    fn key_cut_short_by_end_of_input_is_not_acknowledged() {
        let mut input = vec![b'K'];
        input.extend([0x5a; KEY_LEN / 2]);

        let (output, counts) = session(&input);

        assert!(output.is_empty());
        assert_eq!(counts.keys_loaded, 0);
        assert_eq!(counts.keys_abandoned, 1);
    }

    #[test]
    fn reported_block_is_the_key_xor() {
        // One all-0x11 share and three zero shares recombine to 0x11s.
        let mut key = [0u8; KEY_LEN];
        for word in key.chunks_exact_mut(16) {
            word[..4].fill(0x11);
        }
        let mut input = vec![b'K'];
        input.extend(key);
        input.push(b'E');

        let (output, _) = session(&input);

        assert_eq!(&output[2..], "11".repeat(16).as_bytes());
    }
}
