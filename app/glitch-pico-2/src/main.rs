// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault-injection target firmware for the Raspberry Pi Pico 2.
//!
//! On the RP2350 this brings up clocks, UART0 and the trigger pin, then
//! serves the glitch harness protocol forever. Built for a hosted target it
//! instead runs the same harness over stdin/stdout against a software
//! stand-in for the protected routine.

#![cfg_attr(target_os = "none", no_std, no_main)]

#[allow(dead_code)]
mod config {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

mod fail_safe;

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        mod board;
        mod decrypt;
        mod scratch;
        mod uart;

        use panic_halt as _;

        use cortex_m_rt::entry;
        use glitch_harness::{
            Hardening, Harness, HarnessState, Never, TriggerSequencer,
        };
        use rcp_checks::{Disabled, Enforcing, FaultChecks};

        /// Image definition to set up the chip for booting
        ///
        /// See datasheet 5.1.4 Image Definitions for more. These specific
        /// values come from section 5.9.5. Minimum viable image metadata.
        #[link_section = ".image_def"]
        #[used]
        pub static RP235X_IMAGE_DEF_ARM_MIN: [u32; 5] = [
            0xFFFF_DED3, // START
            0x1021_0142, // PICOBIN_BLOCK_ITEM_1BS_IMAGE_TYPE, (EXE | S-mode | ARM | RP2350)
            0x0000_01FF, // PICOBIN_BLOCK_ITEM_2BS_LAST, (size=1 word)
            0x0000_0000, // next = self
            0xAB12_3579, // END
        ];

        #[entry]
        fn main() -> ! {
            // Safety: first thing after reset; nothing has touched the
            // scratch banks yet.
            unsafe { scratch::load_banks() };

            // We're the only code running and nothing else has taken these.
            let p = unsafe { rp235x_pac::Peripherals::steal() };

            board::init(&p);

            match config::HARNESS.hardening {
                Hardening::Disabled => serve(&p, Disabled),
                Hardening::Enforcing => {
                    let salt = board::random_word(&p.ROSC);
                    serve(&p, Enforcing::new(salt, config::FAIL_SAFE))
                }
            }
        }

        fn serve<C: FaultChecks>(p: &rp235x_pac::Peripherals, checks: C) -> ! {
            let serial = uart::Uart::new(
                &p.UART0,
                config::UART_IBRD,
                config::UART_FBRD,
            );
            let trigger = TriggerSequencer::new(
                board::SioPin::new(
                    &p.SIO,
                    &p.IO_BANK0,
                    &p.PADS_BANK0,
                    config::TRIGGER_PIN,
                ),
                board::CycleDelay,
                config::HARNESS.pulse_cycles,
            );
            // Safety: the window covers SCRATCH_Y, which only the protected
            // routine's sections are linked into, and this is the only
            // handle to it.
            let window =
                unsafe { scratch::ScratchWindow::new(config::SCRATCH_BASE) };

            let mut harness = Harness::new(
                serial,
                HarnessState::default(),
                window,
                trigger,
                decrypt::ExternDecrypt,
                checks,
            );

            loop {
                // Failures are in the harness trace; go back to waiting for
                // the next command.
                let _ = harness.run(&Never);
            }
        }
    } else {
        mod sim;

        fn main() -> anyhow::Result<()> {
            sim::run()
        }
    }
}
