// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trigger pulse and the per-trial sequence around it.
//!
//! A trial always runs in this order:
//!
//! 1. restore the scratch window
//! 2. zero the IV, IV salt and working blocks
//! 3. raise the trigger
//! 4. wait `pulse_cycles`
//! 5. drop the trigger
//! 6. call the protected operation
//!
//! The pulse finishes before the operation starts, so instrumentation gets
//! an edge whose latency doesn't depend on what the operation does.
//! Reporting the result (step 7) is left to the dispatcher.
//!
//! With hardening enabled the sequence is walked with the step counter from
//! [`FaultChecks`], so a glitch that skips the restore, the clear or the
//! pulse halts the target instead of running the operation from the wrong
//! state.

use core::convert::Infallible;
use core::sync::atomic::{compiler_fence, Ordering};

use embedded_hal::digital::v2::OutputPin;
use rcp_checks::FaultChecks;

use crate::trace::{Trace, TraceLog};
use crate::trace_entry;
use crate::{HarnessState, OpStatus, ProtectedOp, ScratchManager, ScratchMemory};

/// Busy-wait of a fixed number of CPU cycles.
///
/// Implementations must not depend on data or on interrupts; the pulse is
/// only useful as a reference if its width is the same every trial.
pub trait PulseDelay {
    fn delay_cycles(&mut self, cycles: u32);
}

// Step counter values. The counter is checked (and advanced) after each step
// completes.
const STEP_RESTORED: u8 = 0;
const STEP_CLEARED: u8 = 1;
const STEP_PULSED: u8 = 2;

/// Owns the trigger line and the pulse width.
pub struct TriggerSequencer<P, D> {
    pin: P,
    delay: D,
    pulse_cycles: u32,
}

impl<P, D> TriggerSequencer<P, D>
where
    P: OutputPin<Error = Infallible>,
    D: PulseDelay,
{
    /// Takes ownership of the trigger pin and drives it low.
    pub fn new(mut pin: P, delay: D, pulse_cycles: u32) -> Self {
        pin.set_low().unwrap_or_else(|e| match e {});
        Self {
            pin,
            delay,
            pulse_cycles,
        }
    }

    pub fn pulse_cycles(&self) -> u32 {
        self.pulse_cycles
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    /// Raises the trigger, waits, and drops it again.
    ///
    /// The fences keep the compiler from moving buffer stores or the
    /// protected call across either edge.
    pub fn pulse(&mut self) {
        compiler_fence(Ordering::SeqCst);
        self.pin.set_high().unwrap_or_else(|e| match e {});
        self.delay.delay_cycles(self.pulse_cycles);
        self.pin.set_low().unwrap_or_else(|e| match e {});
        compiler_fence(Ordering::SeqCst);
    }

    /// Runs steps 1 through 6 of a trial.
    ///
    /// Nothing checks the counter after the operation returns, since the
    /// operation is handed the same `checks` and may use the counter itself.
    pub fn run_trial<M, O, C, const N: usize>(
        &mut self,
        state: &mut HarnessState,
        scratch: &mut ScratchManager<M>,
        op: &mut O,
        checks: &mut C,
        trace: &mut TraceLog<N>,
    ) -> OpStatus
    where
        M: ScratchMemory,
        O: ProtectedOp,
        C: FaultChecks,
    {
        checks.count_set(STEP_RESTORED);

        scratch.restore();
        checks.btrue_with(|| scratch.is_pristine());
        trace_entry!(*trace, Trace::Restored);
        checks.count_check(STEP_RESTORED);

        state.clear_working();
        checks.btrue_with(|| state.is_working_clear());
        trace_entry!(*trace, Trace::Cleared);
        checks.count_check(STEP_CLEARED);

        self.pulse();
        trace_entry!(
            *trace,
            Trace::Pulse {
                cycles: self.pulse_cycles
            }
        );
        checks.count_check(STEP_PULSED);

        let HarnessState {
            key,
            iv_salt,
            iv,
            blocks,
        } = state;
        let status = op.decrypt(key, iv_salt, iv, blocks, checks);
        trace_entry!(*trace, Trace::OpReturned(status));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, KeyShares, IV_LEN, SCRATCH_LEN};
    use rcp_checks::{Disabled, Enforcing, FailSafe, Violation};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Event {
        High,
        Low,
        Delay(u32),
        Decrypt,
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct Pin(Log);

    impl OutputPin for Pin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Event::Low);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().push(Event::High);
            Ok(())
        }
    }

    struct Delay(Log);

    impl PulseDelay for Delay {
        fn delay_cycles(&mut self, cycles: u32) {
            self.0.borrow_mut().push(Event::Delay(cycles));
        }
    }

    /// Checks the buffers it is handed, then scribbles on everything.
    struct Scribbler {
        log: Log,
        saw_clear: bool,
        window: Rc<RefCell<[u8; SCRATCH_LEN]>>,
    }

    impl ProtectedOp for Scribbler {
        fn decrypt<C: FaultChecks>(
            &mut self,
            _key: &KeyShares,
            iv_salt: &[u8; IV_LEN],
            iv: &[u8; IV_LEN],
            blocks: &mut [Block],
            _checks: &mut C,
        ) -> OpStatus {
            self.log.borrow_mut().push(Event::Decrypt);
            self.saw_clear = iv_salt.iter().chain(iv).all(|&b| b == 0)
                && blocks.iter().flatten().all(|&b| b == 0);
            for block in blocks {
                block.fill(0xee);
            }
            self.window.borrow_mut().fill(0xee);
            OpStatus::Completed
        }
    }

    struct Shared(Rc<RefCell<[u8; SCRATCH_LEN]>>);

    impl ScratchMemory for Shared {
        fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
            out.copy_from_slice(&*self.0.borrow());
        }

        fn store(&mut self, data: &[u8; SCRATCH_LEN]) {
            self.0.borrow_mut().copy_from_slice(data);
        }

        fn matches(&self, expected: &[u8; SCRATCH_LEN]) -> bool {
            &*self.0.borrow() == expected
        }
    }

    struct Trap;

    impl FailSafe for Trap {
        fn halt(&mut self, violation: Violation) -> ! {
            panic!("{violation:?}")
        }
    }

    struct Rig {
        log: Log,
        trigger: TriggerSequencer<Pin, Delay>,
        state: HarnessState,
        scratch: ScratchManager<Shared>,
        op: Scribbler,
        trace: TraceLog<16>,
    }

    fn rig() -> Rig {
        let log = Log::default();
        let window = Rc::new(RefCell::new(core::array::from_fn(|i| i as u8)));
        let trigger =
            TriggerSequencer::new(Pin(log.clone()), Delay(log.clone()), 77);
        // Drop the low from construction; tests look at trial events only.
        log.borrow_mut().clear();
        Rig {
            trigger,
            state: HarnessState::default(),
            scratch: ScratchManager::capture(Shared(window.clone())),
            op: Scribbler {
                log: log.clone(),
                saw_clear: false,
                window,
            },
            trace: TraceLog::new(),
            log,
        }
    }

    impl Rig {
        fn trial<C: FaultChecks>(&mut self, checks: &mut C) -> OpStatus {
            self.trigger.run_trial(
                &mut self.state,
                &mut self.scratch,
                &mut self.op,
                checks,
                &mut self.trace,
            )
        }
    }

    #[test]
    fn new_drives_the_pin_low() {
        let log = Log::default();
        let _ = TriggerSequencer::new(Pin(log.clone()), Delay(log.clone()), 5);
        assert_eq!(*log.borrow(), [Event::Low]);
    }

    #[test]
    fn pulse_completes_before_the_operation() {
        let mut rig = rig();
        let status = rig.trial(&mut Disabled);
        assert_eq!(status, OpStatus::Completed);
        assert_eq!(
            *rig.log.borrow(),
            [Event::High, Event::Delay(77), Event::Low, Event::Decrypt]
        );
    }

    #[test]
    fn second_trial_starts_from_boot_state() {
        let mut rig = rig();
        rig.state.iv = [9; IV_LEN];
        rig.trial(&mut Disabled);
        assert!(rig.op.saw_clear);
        assert!(!rig.scratch.is_pristine());

        rig.op.saw_clear = false;
        rig.trial(&mut Disabled);
        assert!(rig.op.saw_clear);
        assert_eq!(rig.trace.counts().trials, 2);
    }

    #[test]
    fn trace_follows_the_sequence() {
        let mut rig = rig();
        rig.trial(&mut Disabled);
        let events: Vec<_> = rig.trace.events().collect();
        assert_eq!(
            events,
            [
                Trace::Restored,
                Trace::Cleared,
                Trace::Pulse { cycles: 77 },
                Trace::OpReturned(OpStatus::Completed),
            ]
        );
    }

    #[test]
    fn enforcing_walks_the_counter() {
        let mut rig = rig();
        let mut checks = Enforcing::new(0xfeed_f00d, Trap);
        rig.trial(&mut checks);
        rig.trial(&mut checks);
        assert_eq!(checks.last_violation(), None);
    }

    #[test]
    #[should_panic(expected = "ExpectedTrue")]
    fn enforcing_catches_a_failed_restore() {
        struct Stuck;

        impl ScratchMemory for Stuck {
            fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
                out.fill(1);
            }
            fn store(&mut self, _data: &[u8; SCRATCH_LEN]) {}
            fn matches(&self, _expected: &[u8; SCRATCH_LEN]) -> bool {
                false
            }
        }

        let mut rig = rig();
        let mut scratch = ScratchManager::capture(Stuck);
        let mut checks = Enforcing::new(1, Trap);
        rig.trigger.run_trial(
            &mut rig.state,
            &mut scratch,
            &mut rig.op,
            &mut checks,
            &mut rig.trace,
        );
    }

    #[test]
    fn verification_reads_only_happen_when_enforcing() {
        /// Counts comparisons against the snapshot.
        struct Counted(Rc<Cell<u32>>);

        impl ScratchMemory for Counted {
            fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
                out.fill(0);
            }
            fn store(&mut self, _data: &[u8; SCRATCH_LEN]) {}
            fn matches(&self, _expected: &[u8; SCRATCH_LEN]) -> bool {
                self.0.set(self.0.get() + 1);
                true
            }
        }

        let compares = Rc::new(Cell::new(0));
        let mut rig = rig();
        let mut scratch = ScratchManager::capture(Counted(compares.clone()));

        rig.trigger.run_trial(
            &mut rig.state,
            &mut scratch,
            &mut rig.op,
            &mut Disabled,
            &mut rig.trace,
        );
        assert_eq!(compares.get(), 0);

        rig.trigger.run_trial(
            &mut rig.state,
            &mut scratch,
            &mut rig.op,
            &mut Enforcing::new(1, Trap),
            &mut rig.trace,
        );
        assert_eq!(compares.get(), 1);
    }
}
