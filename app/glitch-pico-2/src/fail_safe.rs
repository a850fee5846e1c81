// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rcp_checks::{FailSafe, Spin, Violation};

/// Response to a failed enforcing check, chosen in `harness.toml`.
///
/// Only the variant named there is ever constructed.
#[allow(dead_code)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Halt {
    /// Park the core; the controller sees a timeout and state stays put for
    /// a debugger.
    Spin,
    /// Reset the chip.
    Reset,
}

impl FailSafe for Halt {
    fn halt(&mut self, violation: Violation) -> ! {
        match self {
            Halt::Spin => Spin.halt(violation),
            Halt::Reset => reset(violation),
        }
    }
}

#[cfg(target_os = "none")]
fn reset(_violation: Violation) -> ! {
    cortex_m::peripheral::SCB::sys_reset()
}

#[cfg(not(target_os = "none"))]
fn reset(violation: Violation) -> ! {
    eprintln!("fault check failed: {violation:?}");
    std::process::exit(2)
}
