// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The serial command loop.

use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::v2::OutputPin;
use embedded_hal::serial::{Read, Write};
use rcp_checks::FaultChecks;
use zeroize::Zeroizing;

use crate::trace::{Trace, TraceLog, TRACE_DEPTH};
use crate::trace_entry;
use crate::{
    HarnessError, HarnessState, KeyShares, ProtectedOp, PulseDelay,
    ScratchManager, ScratchMemory, TriggerSequencer, ACK, KEY_LEN, RESULT_LEN,
};

/// Length of the `E` response.
pub const REPORT_LEN: usize = 2 * RESULT_LEN;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    SetKey = b'K',
    Execute = b'E',
}

impl Command {
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'K' => Some(Self::SetKey),
            b'E' => Some(Self::Execute),
            _ => None,
        }
    }

    pub const fn byte(self) -> u8 {
        self as u8
    }
}

/// Tells [`Harness::run`] when to stop.
///
/// Polled whenever the serial port has nothing to read, so a loop that is
/// busy receiving a key payload still notices.
pub trait Cancel {
    fn is_cancelled(&self) -> bool;
}

/// Never cancels; the device loop.
#[derive(Copy, Clone, Debug, Default)]
pub struct Never;

impl Cancel for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Cancel for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Everything the command loop owns.
pub struct Harness<S, M, P, D, O, C> {
    serial: S,
    state: HarnessState,
    scratch: ScratchManager<M>,
    trigger: TriggerSequencer<P, D>,
    op: O,
    checks: C,
    trace: TraceLog<TRACE_DEPTH>,
}

impl<S, E, M, P, D, O, C> Harness<S, M, P, D, O, C>
where
    S: Read<u8, Error = E> + Write<u8, Error = E>,
    M: ScratchMemory,
    P: OutputPin<Error = Infallible>,
    D: PulseDelay,
    O: ProtectedOp,
    C: FaultChecks,
{
    /// Assembles a harness, snapshotting `window` as the state every trial
    /// starts from.
    pub fn new(
        serial: S,
        state: HarnessState,
        window: M,
        trigger: TriggerSequencer<P, D>,
        op: O,
        checks: C,
    ) -> Self {
        let mut trace = TraceLog::new();
        let scratch = ScratchManager::capture(window);
        trace_entry!(trace, Trace::Captured);
        Self {
            serial,
            state,
            scratch,
            trigger,
            op,
            checks,
            trace,
        }
    }

    /// Serves commands until `cancel` fires or the transport fails.
    ///
    /// A `K` whose payload is cut short, by either, leaves the loaded key
    /// untouched and sends no acknowledgement. Until then a short payload
    /// simply waits for the rest.
    pub fn run(&mut self, cancel: &impl Cancel) -> Result<(), HarnessError<E>> {
        while !cancel.is_cancelled() {
            let Some(byte) = self.receive(cancel)? else {
                break;
            };
            self.dispatch(byte, cancel)?;
        }
        trace_entry!(self.trace, Trace::Cancelled);
        Ok(())
    }

    /// Handles one command byte, reading any payload it carries.
    pub fn dispatch(
        &mut self,
        byte: u8,
        cancel: &impl Cancel,
    ) -> Result<(), HarnessError<E>> {
        match Command::from_byte(byte) {
            Some(Command::SetKey) => self.set_key(cancel),
            Some(Command::Execute) => self.execute(),
            None => {
                trace_entry!(self.trace, Trace::Ignored(byte));
                Ok(())
            }
        }
    }

    fn set_key(&mut self, cancel: &impl Cancel) -> Result<(), HarnessError<E>> {
        let mut staged = Zeroizing::new([0u8; KEY_LEN]);
        for (n, slot) in staged.iter_mut().enumerate() {
            let received = n as u8;
            match self.receive(cancel) {
                Ok(Some(byte)) => *slot = byte,
                Ok(None) => {
                    trace_entry!(self.trace, Trace::KeyAbandoned { received });
                    return Ok(());
                }
                Err(e) => {
                    trace_entry!(self.trace, Trace::KeyAbandoned { received });
                    return Err(e);
                }
            }
        }

        self.state.key = KeyShares::from_wire(*staged);
        trace_entry!(self.trace, Trace::KeyLoaded);
        self.transmit(ACK)
    }

    fn execute(&mut self) -> Result<(), HarnessError<E>> {
        self.trigger.run_trial(
            &mut self.state,
            &mut self.scratch,
            &mut self.op,
            &mut self.checks,
            &mut self.trace,
        );
        let report = encode_upper_hex(&self.state.result());
        self.transmit(&report)?;
        trace_entry!(self.trace, Trace::Reported);
        Ok(())
    }

    /// Blocks for one byte. `None` means `cancel` fired while waiting.
    fn receive(
        &mut self,
        cancel: &impl Cancel,
    ) -> Result<Option<u8>, HarnessError<E>> {
        loop {
            match self.serial.read() {
                Ok(byte) => return Ok(Some(byte)),
                Err(nb::Error::WouldBlock) => {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                }
                Err(nb::Error::Other(e)) => {
                    trace_entry!(self.trace, Trace::ReceiveFailed);
                    return Err(HarnessError::Receive(e));
                }
            }
        }
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), HarnessError<E>> {
        let serial = &mut self.serial;
        let sent = bytes
            .iter()
            .try_for_each(|&b| nb::block!(serial.write(b)))
            .and_then(|()| nb::block!(serial.flush()));
        if let Err(e) = sent {
            trace_entry!(self.trace, Trace::TransmitFailed);
            return Err(HarnessError::Transmit(e));
        }
        Ok(())
    }

    pub fn state(&self) -> &HarnessState {
        &self.state
    }

    pub fn scratch(&self) -> &ScratchManager<M> {
        &self.scratch
    }

    pub fn trigger(&self) -> &TriggerSequencer<P, D> {
        &self.trigger
    }

    pub fn trace(&self) -> &TraceLog<TRACE_DEPTH> {
        &self.trace
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn op(&self) -> &O {
        &self.op
    }

    pub fn checks(&self) -> &C {
        &self.checks
    }
}

/// Formats `bytes` as upper-case hex, two digits per byte, no separators.
pub fn encode_upper_hex(bytes: &[u8; RESULT_LEN]) -> [u8; REPORT_LEN] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = [0; REPORT_LEN];
    for (pair, &b) in out.chunks_exact_mut(2).zip(bytes) {
        pair[0] = DIGITS[usize::from(b >> 4)];
        pair[1] = DIGITS[usize::from(b & 0xf)];
    }
    out
}
