// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use glitch_harness::key::{RAW_KEY_LEN, SHARES, WORD, WORDS};
use glitch_harness::{KeyShares, KEY_LEN};
use zeroize::Zeroizing;

/// Shares are printed as two blocks of this many bytes.
const BLOCK: usize = KEY_LEN / 2;

/// Random bytes consumed per key: shares a, b and c of every word.
const RANDOM_LEN: usize = WORDS * (SHARES - 1) * WORD;

#[derive(Debug, Parser)]
#[clap(max_term_width = 80, about = "4-way XOR key sharing for the glitch harness")]
struct Args {
    /// Print C-style escaped strings (\x00\x11...) instead of plain hex
    #[clap(short, long, global = true)]
    c_array: bool,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Split a 256-bit key into shares, printed as two 64-byte blocks
    Encode {
        /// Key as 64 hex characters
        key: String,
    },
    /// Recombine two 64-byte share blocks into the key
    Decode {
        /// First block as 128 hex characters
        block0: String,
        /// Second block as 128 hex characters
        block1: String,
    },
    /// Split a key and print all 128 share bytes on one line, ready to
    /// follow a `K` command
    Raw {
        /// Key as 64 hex characters
        key: String,
    },
}

pub fn main() -> Result<()> {
    let args = Args::parse();
    for line in run(&args.cmd, args.c_array, fill_random)? {
        println!("{line}");
    }
    Ok(())
}

fn fill_random(out: &mut [u8]) -> Result<()> {
    getrandom::fill(out).map_err(|e| anyhow!("reading OS entropy: {e}"))
}

/// Runs one subcommand, returning the lines to print.
fn run(
    cmd: &Cmd,
    c_array: bool,
    mut random: impl FnMut(&mut [u8]) -> Result<()>,
) -> Result<Vec<String>> {
    let format = |bytes: &[u8]| {
        if c_array {
            to_c_array(bytes)
        } else {
            hex::encode(bytes)
        }
    };

    let lines = match cmd {
        Cmd::Encode { key } => {
            let shares = split(key, &mut random)?;
            let (block0, block1) = shares.wire_bytes().split_at(BLOCK);
            vec![format(block0), format(block1)]
        }
        Cmd::Raw { key } => {
            let shares = split(key, &mut random)?;
            vec![format(shares.wire_bytes())]
        }
        Cmd::Decode { block0, block1 } => {
            let mut wire = Zeroizing::new([0u8; KEY_LEN]);
            let (first, second) = wire.split_at_mut(BLOCK);
            parse_hex_into(block0, "block0", first)?;
            parse_hex_into(block1, "block1", second)?;
            let key = Zeroizing::new(KeyShares::from_wire(*wire).combine());
            vec![format(&key[..])]
        }
    };
    Ok(lines)
}

fn split(
    key_hex: &str,
    random: &mut impl FnMut(&mut [u8]) -> Result<()>,
) -> Result<Zeroizing<KeyShares>> {
    let mut key = Zeroizing::new([0u8; RAW_KEY_LEN]);
    parse_hex_into(key_hex, "key", &mut key[..])?;

    let mut pool = Zeroizing::new([0u8; RANDOM_LEN]);
    random(&mut pool[..])?;
    let mut chunks = pool.chunks_exact(WORD);
    let shares = KeyShares::split(&key, |share| {
        if let Some(chunk) = chunks.next() {
            share.copy_from_slice(chunk);
        }
    });
    Ok(Zeroizing::new(shares))
}

/// Decodes `text` into `out`, which it must fill exactly.
///
/// Whitespace is ignored, so `00 11 22` and `001122` decode alike.
fn parse_hex_into(text: &str, what: &str, out: &mut [u8]) -> Result<()> {
    let digits: Zeroizing<String> = Zeroizing::new(
        text.chars().filter(|c| !c.is_ascii_whitespace()).collect(),
    );
    let count = digits.chars().count();
    if count != out.len() * 2 {
        bail!(
            "{what} must be exactly {} bytes ({} hex characters), got {count} \
             characters",
            out.len(),
            out.len() * 2,
        );
    }
    hex::decode_to_slice(digits.as_bytes(), out)
        .with_context(|| format!("{what} must be valid hexadecimal"))
}

fn to_c_array(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0123456789abcdeffedcba987654321000112233445566778899aabbccddeeff";

    fn counting(out: &mut [u8]) -> Result<()> {
        for (i, b) in out.iter_mut().enumerate() {
            *b = i as u8;
        }
        Ok(())
    }

    fn encode(c_array: bool) -> Vec<String> {
        let cmd = Cmd::Encode {
            key: KEY.to_string(),
        };
        run(&cmd, c_array, counting).unwrap()
    }

    #[test]
    fn encode_then_decode() {
        let blocks = encode(false);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 128);
        assert_eq!(blocks[1].len(), 128);

        let cmd = Cmd::Decode {
            block0: blocks[0].clone(),
            block1: blocks[1].clone(),
        };
        assert_eq!(run(&cmd, false, counting).unwrap(), [KEY]);
    }

    #[test]
    fn first_shares_come_from_the_random_source() {
        let blocks = encode(false);
        // a0 b0 c0 are the first twelve random bytes; d0 makes up the rest.
        assert!(blocks[0].starts_with("000102030405060708090a0b"));
    }

    #[test]
    fn raw_is_both_blocks_on_one_line() {
        let cmd = Cmd::Raw {
            key: KEY.to_string(),
        };
        let raw = run(&cmd, false, counting).unwrap();
        let blocks = encode(false);
        assert_eq!(raw, [format!("{}{}", blocks[0], blocks[1])]);
    }

    #[test]
    fn c_array_escapes_every_byte() {
        let blocks = encode(true);
        assert_eq!(blocks[0].len(), 64 * 4);
        assert!(blocks[0].starts_with("\\x00\\x01\\x02"));

        let cmd = Cmd::Decode {
            block0: "00".repeat(BLOCK),
            block1: "00".repeat(BLOCK),
        };
        let key = run(&cmd, true, counting).unwrap();
        assert_eq!(key, ["\\x00".repeat(RAW_KEY_LEN)]);
    }

    #[test]
    fn factory_key_decodes_to_zero() {
        let wire = hex::encode(KeyShares::FACTORY.wire_bytes());
        let cmd = Cmd::Decode {
            block0: wire[..128].to_string(),
            block1: wire[128..].to_string(),
        };
        let key = run(&cmd, false, counting).unwrap();
        assert_eq!(key, ["00".repeat(RAW_KEY_LEN)]);
    }

    #[test]
    fn rejects_bad_input() {
        let short = Cmd::Encode {
            key: "0011".to_string(),
        };
        let err = run(&short, false, counting).unwrap_err();
        assert!(err.to_string().contains("exactly 32 bytes"), "{err}");

        let not_hex = Cmd::Encode {
            key: "zz".repeat(RAW_KEY_LEN),
        };
        let err = run(&not_hex, false, counting).unwrap_err();
        assert!(err.to_string().contains("hexadecimal"), "{err}");

        let bad_block = Cmd::Decode {
            block0: "00".repeat(BLOCK),
            block1: "00".repeat(BLOCK - 1),
        };
        let err = run(&bad_block, false, counting).unwrap_err();
        assert!(err.to_string().contains("block1"), "{err}");
    }

    #[test]
    fn whitespace_between_bytes_is_ignored() {
        let spaced = Cmd::Encode {
            key: ["00"; RAW_KEY_LEN].join(" "),
        };
        let packed = Cmd::Encode {
            key: "00".repeat(RAW_KEY_LEN),
        };
        assert_eq!(
            run(&spaced, false, counting).unwrap(),
            run(&packed, false, counting).unwrap(),
        );

        let cmd = Cmd::Decode {
            block0: format!(" {}\n", "00 ".repeat(BLOCK)),
            block1: "00".repeat(BLOCK),
        };
        assert_eq!(
            run(&cmd, false, counting).unwrap(),
            ["00".repeat(RAW_KEY_LEN)]
        );
    }

    #[test]
    fn non_ascii_is_not_hex() {
        let cmd = Cmd::Encode {
            key: format!("{}\u{e9}", "0".repeat(RAW_KEY_LEN * 2 - 1)),
        };
        let err = run(&cmd, false, counting).unwrap_err();
        assert!(err.to_string().contains("hexadecimal"), "{err}");
    }

    #[test]
    fn entropy_failure_is_reported() {
        let cmd = Cmd::Encode {
            key: KEY.to_string(),
        };
        let err = run(&cmd, false, |_: &mut [u8]| bail!("no entropy"))
            .unwrap_err();
        assert_eq!(err.to_string(), "no entropy");
    }
}
