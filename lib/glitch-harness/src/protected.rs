// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boundary to the protected decryption routine.

use crate::{KeyShares, BLOCK_COUNT, BLOCK_LEN, IV_LEN};
use rcp_checks::FaultChecks;

/// One working block.
pub type Block = [u8; BLOCK_LEN];

/// What the harness can know about a protected call once it returns.
///
/// The routine on the target has no status channel at all; its binding
/// reports [`OpStatus::Unknown`]. "Returned" is not the same as "succeeded":
/// a faulted run returns just as readily as a clean one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpStatus {
    /// The implementation vouches for having run to completion.
    Completed,
    /// Control came back; nothing more is known.
    Unknown,
}

/// The operation under test.
///
/// Implementations decrypt `blocks` in place using the key shares, IV salt
/// and IV. `checks` is the redundancy-check strategy the operation must call
/// at its security-relevant points; whether those calls enforce anything is
/// the caller's decision.
pub trait ProtectedOp {
    fn decrypt<C: FaultChecks>(
        &mut self,
        key: &KeyShares,
        iv_salt: &[u8; IV_LEN],
        iv: &[u8; IV_LEN],
        blocks: &mut [Block],
        checks: &mut C,
    ) -> OpStatus;
}

/// Canary tag for a block count crossing a call.
const BLOCK_COUNT_TAG: u8 = 0x4e;

/// Block count for a routine that takes the working blocks as pointer and
/// length.
///
/// [`issue`](BlockCount::issue) clamps the count to [`BLOCK_COUNT`] and salts
/// it with a canary. [`verify`](BlockCount::verify) re-derives the count from
/// the buffer once the routine returns, so a count or canary that changed
/// across the call fails the check.
#[derive(Debug)]
pub struct BlockCount {
    count: usize,
    salted: u32,
}

impl BlockCount {
    pub fn issue<C: FaultChecks>(blocks: &[Block], checks: &mut C) -> Self {
        let count = blocks.len().min(BLOCK_COUNT);
        checks.iequal(count as u32, blocks.len() as u32);
        let salted = checks.canary_get(BLOCK_COUNT_TAG) ^ count as u32;
        Self { count, salted }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn verify<C: FaultChecks>(&self, blocks: &[Block], checks: &mut C) {
        let count = core::hint::black_box(self.count);
        checks.iequal(count as u32, blocks.len() as u32);
        checks.canary_check(self.salted ^ blocks.len() as u32, BLOCK_COUNT_TAG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcp_checks::{Disabled, Enforcing, FailSafe, Violation};

    struct Trap;

    impl FailSafe for Trap {
        fn halt(&mut self, violation: Violation) -> ! {
            panic!("{violation:?}")
        }
    }

    fn enforcing() -> Enforcing<Trap> {
        Enforcing::new(0x0bad_cafe, Trap)
    }

    #[test]
    fn clean_call_verifies() {
        let blocks = [[0; BLOCK_LEN]; BLOCK_COUNT];
        let mut checks = enforcing();
        let count = BlockCount::issue(&blocks, &mut checks);
        assert_eq!(count.count(), BLOCK_COUNT);
        count.verify(&blocks, &mut checks);
    }

    #[test]
    #[should_panic(expected = "Unequal")]
    fn changed_count_is_caught() {
        let blocks = [[0; BLOCK_LEN]; BLOCK_COUNT];
        let mut checks = enforcing();
        let mut count = BlockCount::issue(&blocks, &mut checks);
        count.count += 1;
        count.verify(&blocks, &mut checks);
    }

    #[test]
    #[should_panic(expected = "Canary")]
    fn changed_canary_is_caught() {
        let blocks = [[0; BLOCK_LEN]; BLOCK_COUNT];
        let mut checks = enforcing();
        let mut count = BlockCount::issue(&blocks, &mut checks);
        count.salted ^= 1;
        count.verify(&blocks, &mut checks);
    }

    #[test]
    #[should_panic(expected = "Unequal")]
    fn oversized_buffer_is_refused() {
        let blocks = [[0; BLOCK_LEN]; BLOCK_COUNT + 1];
        BlockCount::issue(&blocks, &mut enforcing());
    }

    #[test]
    fn disabled_clamps_without_checking() {
        let blocks = [[0; BLOCK_LEN]; BLOCK_COUNT + 1];
        let count = BlockCount::issue(&blocks, &mut Disabled);
        assert_eq!(count.count(), BLOCK_COUNT);
        count.verify(&blocks, &mut Disabled);
    }
}
