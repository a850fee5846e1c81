// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Snapshot and restore of the scratch window.
//!
//! The protected routine keeps working state (and, on the target, chaff) in
//! a fixed RAM window and leaves it modified on return. To make trial `n+1`
//! start from the same memory as trial `1`, the window is captured once at
//! boot and written back before every trial.

use crate::SCRATCH_LEN;

/// Access to the live scratch window.
pub trait ScratchMemory {
    /// Copies the window into `out`.
    fn load(&self, out: &mut [u8; SCRATCH_LEN]);

    /// Overwrites the whole window with `data`.
    fn store(&mut self, data: &[u8; SCRATCH_LEN]);

    /// Compares the window against `expected`.
    fn matches(&self, expected: &[u8; SCRATCH_LEN]) -> bool;
}

/// A plain in-memory window, for hosted builds.
impl ScratchMemory for [u8; SCRATCH_LEN] {
    fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
        out.copy_from_slice(self);
    }

    fn store(&mut self, data: &[u8; SCRATCH_LEN]) {
        self.copy_from_slice(data);
    }

    fn matches(&self, expected: &[u8; SCRATCH_LEN]) -> bool {
        self == expected
    }
}

impl<M: ScratchMemory + ?Sized> ScratchMemory for &mut M {
    fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
        (**self).load(out)
    }

    fn store(&mut self, data: &[u8; SCRATCH_LEN]) {
        (**self).store(data)
    }

    fn matches(&self, expected: &[u8; SCRATCH_LEN]) -> bool {
        (**self).matches(expected)
    }
}

/// Owns the live window and its boot-time snapshot.
///
/// The only way to get one is [`ScratchManager::capture`], so a restore can
/// never run against a snapshot that was not taken.
pub struct ScratchManager<M> {
    live: M,
    snapshot: [u8; SCRATCH_LEN],
}

impl<M: ScratchMemory> ScratchManager<M> {
    /// Snapshots `live`. Call once, before the command loop starts.
    pub fn capture(live: M) -> Self {
        let mut snapshot = [0; SCRATCH_LEN];
        live.load(&mut snapshot);
        Self { live, snapshot }
    }

    /// Writes the snapshot back over the live window.
    pub fn restore(&mut self) {
        self.live.store(&self.snapshot);
    }

    /// True if the live window currently equals the snapshot.
    pub fn is_pristine(&self) -> bool {
        self.live.matches(&self.snapshot)
    }

    pub fn snapshot(&self) -> &[u8; SCRATCH_LEN] {
        &self.snapshot
    }

    pub fn live(&self) -> &M {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut M {
        &mut self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patterned() -> [u8; SCRATCH_LEN] {
        core::array::from_fn(|i| (i * 7) as u8)
    }

    #[test]
    fn capture_copies_the_window() {
        let scratch = ScratchManager::capture(patterned());
        assert_eq!(scratch.snapshot(), &patterned());
        assert!(scratch.is_pristine());
    }

    #[test]
    fn restore_undoes_a_trial() {
        let mut scratch = ScratchManager::capture(patterned());
        scratch.live_mut()[100] ^= 0xff;
        assert!(!scratch.is_pristine());

        scratch.restore();

        assert!(scratch.is_pristine());
        assert_eq!(scratch.live(), &patterned());
    }

    #[test]
    fn works_through_a_borrowed_window() {
        let mut window = patterned();
        {
            let mut scratch = ScratchManager::capture(&mut window);
            scratch.live_mut()[0] = 0xaa;
            scratch.restore();
        }
        assert_eq!(window, patterned());
    }

    proptest! {
        #[test]
        fn restore_after_arbitrary_corruption(
            writes in proptest::collection::vec(
                (0..SCRATCH_LEN, any::<u8>()),
                0..64,
            ),
        ) {
            let mut scratch = ScratchManager::capture(patterned());
            for (at, value) in writes {
                scratch.live_mut()[at] = value;
            }
            scratch.restore();
            prop_assert!(scratch.is_pristine());
            prop_assert_eq!(scratch.live(), &patterned());
        }
    }
}
