// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    println!("cargo:rerun-if-env-changed=GLITCH_HARNESS_CONFIG");
    let path = match std::env::var_os("GLITCH_HARNESS_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => manifest_dir.join("harness.toml"),
    };
    println!("cargo:rerun-if-changed={}", path.display());

    let config = build_glitch_board::load(&path)?;
    let dest = out_dir.join("config.rs");
    let mut out = std::fs::File::create(&dest)
        .with_context(|| format!("creating {}", dest.display()))?;
    config.write_config(&mut out)?;

    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        link_target(&manifest_dir, &out_dir)?;
    }
    Ok(())
}

/// Memory layout for cortex-m-rt, and the routine under test.
fn link_target(manifest_dir: &Path, out_dir: &Path) -> Result<()> {
    std::fs::copy(manifest_dir.join("memory.x"), out_dir.join("memory.x"))
        .context("copying memory.x")?;
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    println!("cargo:rerun-if-env-changed=GLITCH_DECRYPT_LIB_DIR");
    println!("cargo:rerun-if-env-changed=GLITCH_DECRYPT_LIB");
    let Some(dir) = std::env::var_os("GLITCH_DECRYPT_LIB_DIR") else {
        bail!(
            "GLITCH_DECRYPT_LIB_DIR is not set; point it at the directory \
             holding the static library that provides `decrypt`"
        );
    };
    let name = std::env::var("GLITCH_DECRYPT_LIB")
        .unwrap_or_else(|_| "decrypt".to_string());
    let dir = PathBuf::from(dir);
    let archive = dir.join(format!("lib{name}.a"));
    if !archive.is_file() {
        bail!("{} does not exist", archive.display());
    }
    println!("cargo:rerun-if-changed={}", archive.display());
    println!("cargo:rustc-link-search=native={}", dir.display());
    println!("cargo:rustc-link-lib=static={name}");
    Ok(())
}
