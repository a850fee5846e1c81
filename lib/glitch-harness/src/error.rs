// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Transport failures that end a pass through the command loop.
///
/// `E` is the serial port's own error type. Neither variant changes the
/// loaded key: a `K` payload cut short by a receive error is discarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HarnessError<E> {
    Receive(E),
    Transmit(E),
}
