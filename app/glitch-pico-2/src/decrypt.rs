// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binding to the protected decryption routine, linked in from a static
//! library at build time.

use core::ffi::c_int;

use glitch_harness::{
    Block, BlockCount, KeyShares, OpStatus, ProtectedOp, IV_LEN, KEY_LEN,
};
use rcp_checks::FaultChecks;
use zeroize::Zeroizing;

extern "C" {
    /// Decrypts `nblk` 32-byte blocks at `buf` in place. Reports nothing.
    fn decrypt(
        key4way: *mut u8,
        iv_otp_salt: *mut u8,
        iv_public: *mut u8,
        buf: *mut Block,
        nblk: c_int,
    );
}

pub struct ExternDecrypt;

impl ProtectedOp for ExternDecrypt {
    fn decrypt<C: FaultChecks>(
        &mut self,
        key: &KeyShares,
        iv_salt: &[u8; IV_LEN],
        iv: &[u8; IV_LEN],
        blocks: &mut [Block],
        checks: &mut C,
    ) -> OpStatus {
        // The routine takes everything by mutable pointer. Hand it copies of
        // the inputs so whatever it does to them stays out of the next trial.
        let mut key4way = Zeroizing::new([0u8; KEY_LEN]);
        key4way.copy_from_slice(key.wire_bytes());
        let mut iv_salt = *iv_salt;
        let mut iv = *iv;

        let nblk = BlockCount::issue(blocks, checks);

        // Safety: every pointer is to a live buffer of the size the routine
        // expects, and `nblk` does not exceed the blocks behind `buf`.
        unsafe {
            decrypt(
                key4way.as_mut_ptr(),
                iv_salt.as_mut_ptr(),
                iv.as_mut_ptr(),
                blocks.as_mut_ptr(),
                nblk.count() as c_int,
            );
        }

        nblk.verify(blocks, checks);
        OpStatus::Unknown
    }
}
