// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run-time view of the harness configuration.
//!
//! Board crates fill this in from their build-time configuration; the values
//! here are what the shipped firmware uses when nothing says otherwise.

/// Whether the redundancy checks in the trial path (and the ones the
/// protected operation calls) enforce anything.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Hardening {
    /// Checks are no-ops.
    #[default]
    Disabled,
    /// Checks are evaluated and a failure halts the target.
    Enforcing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Width of the trigger pulse, in CPU cycles.
    pub pulse_cycles: u32,
    pub hardening: Hardening,
}

/// Longest pulse we accept: 10 ms at 150 MHz. Anything longer is almost
/// certainly a units mistake.
pub const MAX_PULSE_CYCLES: u32 = 1_500_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    ZeroPulse,
    PulseTooLong(u32),
}

impl HarnessConfig {
    /// About 1 ms at 150 MHz, with hardening off.
    pub const DEFAULT: Self = Self {
        pulse_cycles: 150_000,
        hardening: Hardening::Disabled,
    };

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.pulse_cycles == 0 {
            Err(ConfigError::ZeroPulse)
        } else if self.pulse_cycles > MAX_PULSE_CYCLES {
            Err(ConfigError::PulseTooLong(self.pulse_cycles))
        } else {
            Ok(())
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static_assertions::const_assert!(matches!(
    HarnessConfig::DEFAULT.validate(),
    Ok(())
));
