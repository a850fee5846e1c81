// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build-time board configuration for the RP2350 glitch target.
//!
//! The firmware's `build.rs` reads `harness.toml` through [`load`], and
//! [`BoardConfig::write_config`] turns it into the constants the image
//! includes. Anything that can be decided at build time is checked here, so
//! a bad pin, window or baud rate fails the build instead of the board.

use anyhow::{bail, Context, Result};
use glitch_harness::{Hardening, HarnessConfig, SCRATCH_LEN};
use serde::Deserialize;
use std::io::Write;
use std::ops::{Range, RangeInclusive};
use std::path::Path;

/// Scratch banks X and Y; the window has to fit inside them.
pub const SCRATCH_BANKS: Range<u64> = 0x2008_0000..0x2008_2000;

/// GPIO 0 and 1 carry UART0; the Pico 2 brings out GPIO up to 29.
pub const TRIGGER_PINS: RangeInclusive<u8> = 2..=29;

pub const BAUD_RATES: RangeInclusive<u32> = 300..=921_600;

/// `clk_peri` runs straight from the crystal.
pub const CLK_PERI_HZ: u32 = 12_000_000;

/// Largest accepted gap between the requested and the achieved baud rate,
/// in parts per thousand.
pub const MAX_BAUD_ERROR_PERMILLE: u64 = 20;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BoardConfig {
    #[serde(default = "default_trigger_pin")]
    pub trigger_pin: u8,
    #[serde(default = "default_pulse_cycles")]
    pub pulse_cycles: u32,
    #[serde(default = "default_scratch_base")]
    pub scratch_base: u64,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub hardening: HardeningMode,
    #[serde(default)]
    pub fail_safe: FailSafeMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardeningMode {
    #[default]
    Disabled,
    Enforcing,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailSafeMode {
    #[default]
    Spin,
    Reset,
}

fn default_trigger_pin() -> u8 {
    13
}

fn default_pulse_cycles() -> u32 {
    HarnessConfig::DEFAULT.pulse_cycles
}

fn default_scratch_base() -> u64 {
    0x2008_1000
}

fn default_baud_rate() -> u32 {
    115_200
}

/// Reads, parses and validates the configuration at `path`.
pub fn load(path: &Path) -> Result<BoardConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    BoardConfig::from_toml(&text)
        .with_context(|| format!("loading {}", path.display()))
}

impl BoardConfig {
    /// Parses `text` and validates the result.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("parsing")?;
        config.validate().context("validating")?;
        Ok(config)
    }

    pub fn harness(&self) -> HarnessConfig {
        HarnessConfig {
            pulse_cycles: self.pulse_cycles,
            hardening: match self.hardening {
                HardeningMode::Disabled => Hardening::Disabled,
                HardeningMode::Enforcing => Hardening::Enforcing,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !TRIGGER_PINS.contains(&self.trigger_pin) {
            bail!(
                "trigger-pin {} is outside {:?}",
                self.trigger_pin,
                TRIGGER_PINS
            );
        }
        if let Err(e) = self.harness().validate() {
            bail!("pulse-cycles {}: {e:?}", self.pulse_cycles);
        }
        if self.scratch_base % 4 != 0 {
            bail!("scratch-base {:#x} is not word aligned", self.scratch_base);
        }
        let end = self.scratch_base.saturating_add(SCRATCH_LEN as u64);
        if !SCRATCH_BANKS.contains(&self.scratch_base)
            || end > SCRATCH_BANKS.end
        {
            bail!(
                "scratch window {:#x}..{end:#x} does not fit in the scratch \
                 banks {:#x}..{:#x}",
                self.scratch_base,
                SCRATCH_BANKS.start,
                SCRATCH_BANKS.end,
            );
        }
        if !BAUD_RATES.contains(&self.baud_rate) {
            bail!("baud-rate {} is outside {:?}", self.baud_rate, BAUD_RATES);
        }
        let achieved = self.uart_divisors().achieved_baud(CLK_PERI_HZ);
        let error = u64::from(achieved.abs_diff(self.baud_rate)) * 1000
            / u64::from(self.baud_rate);
        if error > MAX_BAUD_ERROR_PERMILLE {
            bail!(
                "baud-rate {} can't be reached from a {CLK_PERI_HZ} Hz \
                 clk_peri; the closest is {achieved}",
                self.baud_rate,
            );
        }
        Ok(())
    }

    pub fn uart_divisors(&self) -> Divisors {
        Divisors::for_baud(CLK_PERI_HZ, self.baud_rate)
    }

    /// Emits the configuration as Rust constants for the firmware to
    /// `include!`.
    pub fn write_config(&self, out: &mut impl Write) -> Result<()> {
        let divisors = self.uart_divisors();
        writeln!(out, "pub const TRIGGER_PIN: u8 = {};", self.trigger_pin)?;
        writeln!(
            out,
            "pub const SCRATCH_BASE: usize = {:#x};",
            self.scratch_base
        )?;
        writeln!(out, "pub const BAUD_RATE: u32 = {};", self.baud_rate)?;
        writeln!(out, "pub const CLK_PERI_HZ: u32 = {CLK_PERI_HZ};")?;
        writeln!(out, "pub const UART_IBRD: u16 = {};", divisors.integer)?;
        writeln!(out, "pub const UART_FBRD: u8 = {};", divisors.fraction)?;
        writeln!(
            out,
            "pub const HARNESS: glitch_harness::HarnessConfig = \
             glitch_harness::HarnessConfig {{ pulse_cycles: {}, \
             hardening: glitch_harness::Hardening::{:?} }};",
            self.pulse_cycles, self.hardening,
        )?;
        writeln!(
            out,
            "pub const FAIL_SAFE: crate::fail_safe::Halt = \
             crate::fail_safe::Halt::{:?};",
            self.fail_safe,
        )?;
        Ok(())
    }
}

/// PL011 baud rate divisors: `integer + fraction / 64` is `clk / (16 *
/// baud)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Divisors {
    pub integer: u16,
    pub fraction: u8,
}

impl Divisors {
    /// Divisors for `baud`, rounded to the nearest 1/64th and clamped to
    /// what the hardware can represent. Rounding carries into the integer
    /// part, so `fraction` always fits its 6-bit field.
    pub fn for_baud(clk_hz: u32, baud: u32) -> Self {
        let div = 8 * u64::from(clk_hz) / u64::from(baud.max(1)) + 1;
        match div >> 7 {
            0 => Self {
                integer: 1,
                fraction: 0,
            },
            integer @ 1..=0xfffe => Self {
                integer: integer as u16,
                fraction: ((div & 0x7f) >> 1) as u8,
            },
            _ => Self {
                integer: 0xffff,
                fraction: 0,
            },
        }
    }

    /// The baud rate these divisors produce from `clk_hz`.
    pub fn achieved_baud(&self, clk_hz: u32) -> u32 {
        let sixty_fourths =
            64 * u64::from(self.integer) + u64::from(self.fraction);
        (4 * u64::from(clk_hz) / sixty_fourths) as u32
    }
}
