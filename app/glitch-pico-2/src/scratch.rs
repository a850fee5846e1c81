// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use glitch_harness::{ScratchMemory, SCRATCH_LEN};

const WORDS: usize = SCRATCH_LEN / 4;

/// Copies the `.scratch_x` and `.scratch_y` load images out of flash.
///
/// The protected routine links its code into SCRATCH_X and its initial
/// working state into SCRATCH_Y, and cortex-m-rt only initializes `.data`.
///
/// # Safety
///
/// Call once, before anything reads, writes or executes the scratch banks.
pub unsafe fn load_banks() {
    // Symbols from memory.x:
    extern "C" {
        static mut __sscratch_x: u32;
        static mut __escratch_x: u32;
        static __siscratch_x: u32;
        static mut __sscratch_y: u32;
        static mut __escratch_y: u32;
        static __siscratch_y: u32;
    }

    r0::init_data(
        core::ptr::addr_of_mut!(__sscratch_x),
        core::ptr::addr_of_mut!(__escratch_x),
        core::ptr::addr_of!(__siscratch_x),
    );
    r0::init_data(
        core::ptr::addr_of_mut!(__sscratch_y),
        core::ptr::addr_of_mut!(__escratch_y),
        core::ptr::addr_of!(__siscratch_y),
    );

    // SCRATCH_X now holds code.
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// The scratch window in SRAM, accessed a word at a time with volatile
/// loads and stores so that no copy is elided or merged with the protected
/// routine's own accesses.
pub struct ScratchWindow {
    base: *mut u32,
}

impl ScratchWindow {
    /// # Safety
    ///
    /// `base` must be the word-aligned address of `SCRATCH_LEN` bytes of RAM
    /// that no Rust reference points into, and there must be only one
    /// `ScratchWindow` for it.
    pub unsafe fn new(base: usize) -> Self {
        Self {
            base: base as *mut u32,
        }
    }

    fn read(&self, i: usize) -> u32 {
        // Safety: `i < WORDS` at every call site, so this stays inside the
        // window `new` was promised.
        unsafe { self.base.add(i).read_volatile() }
    }

    fn write(&mut self, i: usize, word: u32) {
        // Safety: as for `read`.
        unsafe { self.base.add(i).write_volatile(word) }
    }
}

impl ScratchMemory for ScratchWindow {
    fn load(&self, out: &mut [u8; SCRATCH_LEN]) {
        for (i, chunk) in out.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&self.read(i).to_ne_bytes());
        }
    }

    fn store(&mut self, data: &[u8; SCRATCH_LEN]) {
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            let mut word = [0; 4];
            word.copy_from_slice(chunk);
            self.write(i, u32::from_ne_bytes(word));
        }
    }

    fn matches(&self, expected: &[u8; SCRATCH_LEN]) -> bool {
        (0..WORDS).all(|i| {
            let mut word = [0; 4];
            word.copy_from_slice(&expected[i * 4..][..4]);
            self.read(i) == u32::from_ne_bytes(word)
        })
    }
}
