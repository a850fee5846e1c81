// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Block, KeyShares, BLOCK_COUNT, BLOCK_LEN, IV_LEN, RESULT_LEN};
use zeroize::Zeroize;

/// Buffers handed to the protected operation.
///
/// The key persists across trials until a `K` command replaces it; the IV,
/// IV salt and working blocks are zeroed at the start of every trial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessState {
    pub key: KeyShares,
    pub iv_salt: [u8; IV_LEN],
    pub iv: [u8; IV_LEN],
    pub blocks: [Block; BLOCK_COUNT],
}

impl HarnessState {
    pub const fn new(key: KeyShares) -> Self {
        Self {
            key,
            iv_salt: [0; IV_LEN],
            iv: [0; IV_LEN],
            blocks: [[0; BLOCK_LEN]; BLOCK_COUNT],
        }
    }

    /// Zeroes the IV, IV salt and working blocks.
    ///
    /// Uses `zeroize` so that the stores survive optimization even though
    /// nothing in Rust reads these buffers before the protected call
    /// overwrites them.
    pub fn clear_working(&mut self) {
        self.iv_salt.zeroize();
        self.iv.zeroize();
        for block in &mut self.blocks {
            block.zeroize();
        }
    }

    /// True if the IV, IV salt and working blocks are all zero.
    pub fn is_working_clear(&self) -> bool {
        self.iv_salt
            .iter()
            .chain(&self.iv)
            .chain(self.blocks.iter().flatten())
            .all(|&b| b == 0)
    }

    /// Leading bytes of the first working block; what `E` reports.
    pub fn result(&self) -> [u8; RESULT_LEN] {
        let mut out = [0; RESULT_LEN];
        out.copy_from_slice(&self.blocks[0][..RESULT_LEN]);
        out
    }
}

impl Default for HarnessState {
    fn default() -> Self {
        Self::new(KeyShares::FACTORY)
    }
}
