// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Polled driver for the RP2350's PL011 UART.

use embedded_hal::serial::{Read, Write};
use rp235x_pac as device;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Error {
    Framing,
    Parity,
    Break,
    Overrun,
}

pub struct Uart<'a> {
    uart: &'a device::uart0::RegisterBlock,
}

impl<'a> Uart<'a> {
    /// Configures the UART for 8N1 with the given baud rate divisors, which
    /// the build works out from `clk_peri`. Assumes the UART is out of reset
    /// and its pins are muxed.
    pub fn new(
        uart: &'a device::uart0::RegisterBlock,
        ibrd: u16,
        fbrd: u8,
    ) -> Self {
        uart.uartibrd()
            .write(|w| unsafe { w.baud_divint().bits(ibrd) });
        uart.uartfbrd()
            .write(|w| unsafe { w.baud_divfrac().bits(fbrd) });
        // The divisors only latch on an LCR_H write, which has to come last.
        uart.uartlcr_h().write(|w| unsafe {
            w.wlen().bits(0b11).fen().set_bit();
            w.pen().clear_bit().stp2().clear_bit()
        });
        uart.uartcr()
            .write(|w| w.uarten().set_bit().txe().set_bit().rxe().set_bit());
        Self { uart }
    }

    pub fn is_tx_full(&self) -> bool {
        self.uart.uartfr().read().txff().bit_is_set()
    }

    pub fn is_rx_empty(&self) -> bool {
        self.uart.uartfr().read().rxfe().bit_is_set()
    }

    pub fn is_busy(&self) -> bool {
        self.uart.uartfr().read().busy().bit_is_set()
    }
}

impl Write<u8> for Uart<'_> {
    type Error = Error;

    fn flush(&mut self) -> nb::Result<(), Error> {
        if self.is_busy() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    fn write(&mut self, byte: u8) -> nb::Result<(), Error> {
        if !self.is_tx_full() {
            self.uart
                .uartdr()
                .write(|w| unsafe { w.data().bits(byte) });
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl Read<u8> for Uart<'_> {
    type Error = Error;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if self.is_rx_empty() {
            return Err(nb::Error::WouldBlock);
        }
        // Status bits travel with the byte they apply to.
        let dr = self.uart.uartdr().read();
        if dr.oe().bit_is_set() {
            Err(nb::Error::Other(Error::Overrun))
        } else if dr.be().bit_is_set() {
            Err(nb::Error::Other(Error::Break))
        } else if dr.pe().bit_is_set() {
            Err(nb::Error::Other(Error::Parity))
        } else if dr.fe().bit_is_set() {
            Err(nb::Error::Other(Error::Framing))
        } else {
            Ok(dr.data().bits())
        }
    }
}
