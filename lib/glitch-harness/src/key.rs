// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Four-way XOR sharing of a 256-bit key.
//!
//! Each 32-bit word `K` of the key is stored as four words `a, b, c, d` with
//! `a ^ b ^ c ^ d == K`. Shares are laid out word by word:
//!
//! ```text
//!   a0 b0 c0 d0 a1 b1 c1 d1 ... a7 b7 c7 d7     (8 * 4 * 4 = 128 bytes)
//! ```
//!
//! This is the buffer the `K` command carries verbatim.

use crate::KEY_LEN;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

/// Bytes per key word.
pub const WORD: usize = 4;

/// Words in a 256-bit key.
pub const WORDS: usize = 8;

/// Shares per word.
pub const SHARES: usize = 4;

/// Size of an unshared key.
pub const RAW_KEY_LEN: usize = WORD * WORDS;

/// Key shares in wire layout.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Zeroize,
)]
#[repr(C)]
pub struct KeyShares {
    words: [[[u8; WORD]; SHARES]; WORDS],
}

static_assertions::const_assert_eq!(core::mem::size_of::<KeyShares>(), KEY_LEN);

/// Shares the firmware boots with until the controller sends its own.
const FACTORY_WIRE: [u8; KEY_LEN] = [
    0x6c, 0x31, 0x10, 0x89, 0x36, 0x54, 0x06, 0x49, 0xb8, 0x3b, 0xc5, 0x4b,
    0xe2, 0x5e, 0xd3, 0x8b, 0x7a, 0xc9, 0x40, 0x76, 0xa9, 0x83, 0xac, 0x10,
    0x70, 0xf3, 0x77, 0xe8, 0xa3, 0xb9, 0x9b, 0x8e, 0x81, 0x4f, 0xe5, 0xf5,
    0x80, 0x8d, 0x1c, 0xa7, 0x0e, 0xbd, 0xf7, 0x0d, 0x0f, 0x7f, 0x0e, 0x5f,
    0xaa, 0x0b, 0xee, 0xc6, 0x93, 0xf7, 0x79, 0xfc, 0x52, 0x5f, 0x6d, 0xb8,
    0x6b, 0xa3, 0xfa, 0x82, 0x5b, 0xf0, 0xef, 0x65, 0xfd, 0x70, 0xb2, 0x31,
    0x87, 0x6b, 0x54, 0x85, 0x21, 0xeb, 0x09, 0xd1, 0x17, 0x5c, 0xfd, 0x1c,
    0x35, 0x6d, 0x44, 0x60, 0x71, 0xd1, 0xcc, 0xbf, 0x53, 0xe0, 0x75, 0xc3,
    0x8b, 0x1f, 0xd4, 0xbf, 0x4b, 0x99, 0x45, 0xc7, 0x01, 0x3a, 0x2f, 0x06,
    0xc1, 0xbc, 0xbe, 0x7e, 0xc4, 0xf3, 0xcc, 0x93, 0x42, 0x6a, 0xdf, 0x21,
    0x3a, 0xb2, 0xf8, 0x92, 0xbc, 0x2b, 0xeb, 0x20,
];

impl KeyShares {
    /// Default shares shipped with the target firmware. They recombine to
    /// the all-zero key.
    pub const FACTORY: Self = zerocopy::transmute!(FACTORY_WIRE);

    /// All-zero shares (which recombine to the all-zero key).
    pub const ZERO: Self = Self {
        words: [[[0; WORD]; SHARES]; WORDS],
    };

    /// Reinterprets a wire buffer as shares. Any 128 bytes are valid.
    pub fn from_wire(bytes: [u8; KEY_LEN]) -> Self {
        zerocopy::transmute!(bytes)
    }

    /// Splits `key` into fresh shares. `fill` must fill its argument with
    /// random bytes; it is called three times per key word, for `a`, `b` and
    /// `c`, and `d` is derived so the four recombine to the key word.
    pub fn split(
        key: &[u8; RAW_KEY_LEN],
        mut fill: impl FnMut(&mut [u8; WORD]),
    ) -> Self {
        let mut shares = Self::ZERO;
        for (word, k) in shares.words.iter_mut().zip(key.chunks_exact(WORD)) {
            let (random, last) = word.split_at_mut(SHARES - 1);
            let d = &mut last[0];
            d.copy_from_slice(k);
            for share in random {
                fill(&mut *share);
                xor_into(d, share);
            }
        }
        shares
    }

    /// Recombines the shares into the key they encode.
    pub fn combine(&self) -> [u8; RAW_KEY_LEN] {
        let mut key = [0; RAW_KEY_LEN];
        for (out, word) in key.chunks_exact_mut(WORD).zip(&self.words) {
            for share in word {
                for (o, s) in out.iter_mut().zip(share) {
                    *o ^= s;
                }
            }
        }
        key
    }

    /// Shares in wire order.
    pub fn wire_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Default for KeyShares {
    fn default() -> Self {
        Self::FACTORY
    }
}

fn xor_into(acc: &mut [u8; WORD], other: &[u8; WORD]) {
    for (a, o) in acc.iter_mut().zip(other) {
        *a ^= o;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counting_fill() -> impl FnMut(&mut [u8; WORD]) {
        let mut next = 0u8;
        move |share| {
            for b in share.iter_mut() {
                *b = next;
                next = next.wrapping_add(1);
            }
        }
    }

    #[test]
    fn zero_shares_encode_zero_key() {
        assert_eq!(KeyShares::ZERO.combine(), [0; RAW_KEY_LEN]);
    }

    #[test]
    fn wire_layout_is_word_major() {
        let mut wire = [0u8; KEY_LEN];
        // Word 1, share d, byte 2.
        wire[16 + 12 + 2] = 0x5a;
        let shares = KeyShares::from_wire(wire);
        let key = shares.combine();
        assert_eq!(key[4 + 2], 0x5a);
        assert_eq!(key.iter().filter(|&&b| b != 0).count(), 1);
        assert_eq!(shares.wire_bytes(), &wire[..]);
    }

    #[test]
    fn split_uses_fill_for_the_first_three_shares() {
        let key = [0xffu8; RAW_KEY_LEN];
        let shares = KeyShares::split(&key, counting_fill());
        let wire = shares.wire_bytes();
        assert_eq!(&wire[..12], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(shares.combine(), key);
    }

    #[test]
    fn factory_shares_are_distinct_from_zero() {
        assert_ne!(KeyShares::FACTORY, KeyShares::ZERO);
        assert_eq!(KeyShares::default(), KeyShares::FACTORY);
        assert_eq!(KeyShares::FACTORY.wire_bytes(), &FACTORY_WIRE[..]);
    }

    #[test]
    fn factory_shares_encode_zero_key() {
        assert_eq!(KeyShares::FACTORY.combine(), [0; RAW_KEY_LEN]);
    }

    #[test]
    fn zeroize_clears_every_share() {
        let mut shares = KeyShares::FACTORY;
        shares.zeroize();
        assert_eq!(shares, KeyShares::ZERO);
    }

    proptest! {
        #[test]
        fn split_then_combine_recovers_key(
            key in any::<[u8; RAW_KEY_LEN]>(),
            seed in any::<u8>(),
        ) {
            let mut next = seed;
            let shares = KeyShares::split(&key, |share| {
                for b in share.iter_mut() {
                    next = next.wrapping_mul(37).wrapping_add(11);
                    *b = next;
                }
            });
            prop_assert_eq!(shares.combine(), key);
        }
    }
}
