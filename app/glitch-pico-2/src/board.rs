// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RP2350 bring-up: clocks, resets, pin muxing, and the small pieces of
//! hardware the harness needs (trigger pin, cycle delay, entropy).

use core::convert::Infallible;

use embedded_hal::digital::v2::OutputPin;
use glitch_harness::PulseDelay;
use rp235x_pac as device;

/// Crystal on the Pico 2.
pub const XOSC_HZ: u32 = 12_000_000;

/// clk_sys once `init` has run: 12 MHz * 125 / 5 / 2.
pub const CLK_SYS_HZ: u32 = 150_000_000;

/// clk_peri runs straight off the crystal so the UART divisors don't depend
/// on the PLL.
pub const CLK_PERI_HZ: u32 = XOSC_HZ;

static_assertions::const_assert_eq!(crate::config::CLK_PERI_HZ, CLK_PERI_HZ);

const UART_TX_PIN: usize = 0;
const UART_RX_PIN: usize = 1;

// IO_BANK0 GPIO_CTRL function selects.
const FUNCSEL_UART: u8 = 2;
const FUNCSEL_SIO: u8 = 5;

/// XOSC startup delay in units of 256 crystal cycles; about 1 ms.
const XOSC_STARTUP_DELAY: u16 = (XOSC_HZ / 1000).div_ceil(256) as u16;

// PLL_SYS: 12 MHz / 1 * 125 = 1500 MHz VCO, then / 5 / 2.
const PLL_REFDIV: u8 = 1;
const PLL_FBDIV: u16 = 125;
const PLL_POSTDIV1: u8 = 5;
const PLL_POSTDIV2: u8 = 2;

static_assertions::const_assert_eq!(
    XOSC_HZ / PLL_REFDIV as u32 * PLL_FBDIV as u32
        / PLL_POSTDIV1 as u32
        / PLL_POSTDIV2 as u32,
    CLK_SYS_HZ
);

/// Brings the chip from boot-ROM state to where the harness can run.
pub fn init(p: &device::Peripherals) {
    p.RESETS.reset().modify(|_, w| {
        w.io_bank0()
            .clear_bit()
            .pads_bank0()
            .clear_bit()
            .pll_sys()
            .clear_bit()
    });
    while !p.RESETS.reset_done().read().io_bank0().bit() {}
    while !p.RESETS.reset_done().read().pads_bank0().bit() {}
    while !p.RESETS.reset_done().read().pll_sys().bit() {}

    start_xosc(&p.XOSC);
    start_clocks(&p.CLOCKS, &p.PLL_SYS);

    // UART0 only finishes leaving reset once clk_peri is running.
    p.RESETS.reset().modify(|_, w| w.uart0().clear_bit());
    while !p.RESETS.reset_done().read().uart0().bit() {}

    // UART0 on GPIO0/1.
    p.PADS_BANK0.gpio(UART_TX_PIN).write(|w| {
        w.drive()._4m_a().slewfast().set_bit().ie().clear_bit();
        w.pde().clear_bit().iso().clear_bit()
    });
    p.PADS_BANK0.gpio(UART_RX_PIN).write(|w| {
        w.drive()._4m_a().ie().set_bit().schmitt().set_bit();
        w.pue().set_bit().pde().clear_bit().iso().clear_bit()
    });
    select_function(&p.IO_BANK0, UART_TX_PIN, FUNCSEL_UART);
    select_function(&p.IO_BANK0, UART_RX_PIN, FUNCSEL_UART);
}

fn start_xosc(xosc: &device::xosc::RegisterBlock) {
    xosc.startup()
        .write(|w| unsafe { w.delay().bits(XOSC_STARTUP_DELAY) });
    xosc.ctrl()
        .write(|w| w.freq_range()._1_15mhz().enable().enable());
    while xosc.status().read().stable().bit_is_clear() {}
}

fn start_clocks(
    clocks: &device::clocks::RegisterBlock,
    pll: &device::pll_sys::RegisterBlock,
) {
    // clk_ref from the crystal, and clk_sys from clk_ref while the PLL
    // comes up. The *_SELECTED registers are one-hot in the source.
    clocks.clk_ref_ctrl().write(|w| w.src().xosc_clksrc());
    let src = clocks.clk_ref_ctrl().read().src().bits();
    while clocks.clk_ref_selected().read().bits() != 1 << src {}
    clocks.clk_sys_ctrl().write(|w| w.src().clk_ref());
    let src = clocks.clk_sys_ctrl().read().src().bits();
    while clocks.clk_sys_selected().read().bits() != 1 << src {}

    pll.cs().write(|w| unsafe { w.refdiv().bits(PLL_REFDIV) });
    pll.fbdiv_int()
        .write(|w| unsafe { w.fbdiv_int().bits(PLL_FBDIV) });
    // Power up the VCO, leaving the post dividers off until it locks.
    pll.pwr().modify(|_, w| w.pd().clear_bit().vcopd().clear_bit());
    while pll.cs().read().lock().bit_is_clear() {}
    pll.prim().write(|w| unsafe {
        w.postdiv1().bits(PLL_POSTDIV1).postdiv2().bits(PLL_POSTDIV2)
    });
    pll.pwr().modify(|_, w| w.postdivpd().clear_bit());

    clocks
        .clk_sys_ctrl()
        .modify(|_, w| w.auxsrc().clksrc_pll_sys());
    clocks
        .clk_sys_ctrl()
        .modify(|_, w| w.src().clksrc_clk_sys_aux());
    let src = clocks.clk_sys_ctrl().read().src().bits();
    while clocks.clk_sys_selected().read().bits() != 1 << src {}

    clocks
        .clk_peri_ctrl()
        .write(|w| w.auxsrc().xosc_clksrc().enable().set_bit());
}

fn select_function(
    io: &device::io_bank0::RegisterBlock,
    pin: usize,
    funcsel: u8,
) {
    io.gpio(pin)
        .gpio_ctrl()
        .write(|w| unsafe { w.funcsel().bits(funcsel) });
}

/// A GPIO driven through the single-cycle IO block.
pub struct SioPin<'a> {
    sio: &'a device::sio::RegisterBlock,
    mask: u32,
}

impl<'a> SioPin<'a> {
    /// Claims `pin` as a push-pull output, initially low.
    pub fn new(
        sio: &'a device::sio::RegisterBlock,
        io: &device::io_bank0::RegisterBlock,
        pads: &device::pads_bank0::RegisterBlock,
        pin: u8,
    ) -> Self {
        let mask = 1 << pin;
        sio.gpio_out_clr().write(|w| unsafe { w.bits(mask) });
        sio.gpio_oe_set().write(|w| unsafe { w.bits(mask) });
        pads.gpio(usize::from(pin)).write(|w| {
            w.drive()._4m_a().ie().clear_bit();
            w.pde().clear_bit().iso().clear_bit()
        });
        select_function(io, usize::from(pin), FUNCSEL_SIO);
        Self { sio, mask }
    }
}

impl OutputPin for SioPin<'_> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.sio.gpio_out_clr().write(|w| unsafe { w.bits(self.mask) });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.sio.gpio_out_set().write(|w| unsafe { w.bits(self.mask) });
        Ok(())
    }
}

/// Busy-waits on the core clock.
pub struct CycleDelay;

impl PulseDelay for CycleDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        cortex_m::asm::delay(cycles);
    }
}

/// Assembles a word from the ring oscillator's random bit. Good enough to
/// vary canary values from boot to boot; not a key source.
pub fn random_word(rosc: &device::rosc::RegisterBlock) -> u32 {
    (0..32).fold(0, |acc, _| {
        (acc << 1) | u32::from(rosc.randombit().read().randombit().bit())
    })
}
