// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trial trace for debugging the harness.
//!
//! The target has no console to spare: the serial line belongs to the
//! controller, and anything printed there would corrupt the protocol. Instead
//! the harness records what it did into a small ring of [`Trace`] events
//! plus a set of running [`TraceCounts`], both of which live inside the
//! [`Harness`](crate::Harness) and can be read with a debugger (or, on the
//! host, by tests).
//!
//! An entry carries the source line that recorded it and a generation number
//! for its slot. Recording the same event from the same line twice in a row
//! bumps the entry's `count` instead of using a new slot, so a controller
//! hammering `E` doesn't wash everything else out of the ring.
//!
//! Use [`trace_entry!`](crate::trace_entry) to record; it fills in the line.

use crate::OpStatus;

/// Entries kept by the harness trace.
pub const TRACE_DEPTH: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    None,
    /// Scratch window snapshotted at boot.
    Captured,
    /// A full key arrived and replaced the previous one.
    KeyLoaded,
    /// The transport failed partway through a key payload; the previous key
    /// is still in place.
    KeyAbandoned { received: u8 },
    Restored,
    Cleared,
    Pulse { cycles: u32 },
    OpReturned(OpStatus),
    Reported,
    Ignored(u8),
    ReceiveFailed,
    TransmitFailed,
    Cancelled,
}

/// Running totals, never wrapped out like ring entries are.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceCounts {
    pub trials: u32,
    pub keys_loaded: u32,
    pub keys_abandoned: u32,
    pub ignored: u32,
    pub receive_failures: u32,
    pub transmit_failures: u32,
}

impl TraceCounts {
    fn count(&mut self, event: &Trace) {
        let counter = match event {
            Trace::Pulse { .. } => &mut self.trials,
            Trace::KeyLoaded => &mut self.keys_loaded,
            Trace::KeyAbandoned { .. } => &mut self.keys_abandoned,
            Trace::Ignored(_) => &mut self.ignored,
            Trace::ReceiveFailed => &mut self.receive_failures,
            Trace::TransmitFailed => &mut self.transmit_failures,
            _ => return,
        };
        *counter = counter.wrapping_add(1);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: Trace,
}

const EMPTY: TraceEntry = TraceEntry {
    line: 0,
    generation: 0,
    count: 0,
    payload: Trace::None,
};

/// Fixed-size ring of trace entries plus event counts.
#[derive(Debug)]
pub struct TraceLog<const N: usize> {
    last: Option<usize>,
    buffer: [TraceEntry; N],
    counts: TraceCounts,
}

impl<const N: usize> TraceLog<N> {
    pub const fn new() -> Self {
        Self {
            last: None,
            buffer: [EMPTY; N],
            counts: TraceCounts {
                trials: 0,
                keys_loaded: 0,
                keys_abandoned: 0,
                ignored: 0,
                receive_failures: 0,
                transmit_failures: 0,
            },
        }
    }

    /// Records `event` as coming from `line`. Prefer [`trace_entry!`].
    ///
    /// [`trace_entry!`]: crate::trace_entry
    pub fn record(&mut self, line: u16, event: Trace) {
        self.counts.count(&event);

        // Fold into the most recent entry when it's the same event from the
        // same place, as long as its count has room.
        if let Some(ent) = self.last.and_then(|i| self.buffer.get_mut(i)) {
            if ent.line == line && ent.payload == event {
                if let Some(count) = ent.count.checked_add(1) {
                    ent.count = count;
                    return;
                }
            }
        }

        let ndx = match self.last {
            Some(i) if i + 1 < N => i + 1,
            _ => 0,
        };
        if let Some(ent) = self.buffer.get_mut(ndx) {
            *ent = TraceEntry {
                line,
                generation: ent.generation.wrapping_add(1),
                count: 1,
                payload: event,
            };
            self.last = Some(ndx);
        }
    }

    pub fn counts(&self) -> &TraceCounts {
        &self.counts
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&TraceEntry> {
        self.last.and_then(|i| self.buffer.get(i))
    }

    /// Occupied entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &TraceEntry> + '_ {
        let split = self.last.map_or(0, |i| i + 1);
        let (newer, older) = self.buffer.split_at(split.min(N));
        older
            .iter()
            .chain(newer)
            .filter(|ent| ent.count != 0)
    }

    /// Payloads of the occupied entries, oldest first.
    pub fn events(&self) -> impl Iterator<Item = Trace> + '_ {
        self.entries().map(|ent| ent.payload)
    }
}

impl<const N: usize> Default for TraceLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Records an event in a [`TraceLog`], tagged with the current line.
#[macro_export]
macro_rules! trace_entry {
    ($log:expr, $event:expr) => {{
        let event = $event;
        $crate::trace::TraceLog::record(&mut $log, line!() as u16, event);
    }};
}
