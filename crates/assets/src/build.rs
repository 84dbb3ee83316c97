// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Build Support
//!
//! This module contains the build time functionality.  Missing or failing shader tooling only
//! produces cargo warnings.  The visualizer falls back to its CPU phosphor when the compiled
//! shaders cannot be found at runtime.

use std::{ffi, fs, path::Path, process};

/// Use slangc to recursively compile shaders from `shaders/` to `assets/shaders/`.
pub fn build_shaders() {
    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR unset, skipping shaders");
        return;
    };
    let crate_root = Path::new(&manifest_dir);

    let src_root = crate_root.join("shaders");
    let dest_root = crate_root.join("assets/shaders");

    println!("cargo:rerun-if-changed=shaders");

    if !src_root.exists() {
        return;
    }

    if process::Command::new("slangc").arg("-v").output().is_err() {
        println!("cargo:warning=no slangc found, phosphor shaders will not be built");
        return;
    }

    fn compile_dir(dir: &Path, src_root: &Path, dest_root: &Path, ext: &ffi::OsStr) {
        let Ok(entries) = fs::read_dir(dir) else {
            println!("cargo:warning=cannot read {dir:?}");
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                compile_dir(&path, src_root, dest_root, ext);
            } else if path.extension() == Some(ext) {
                let Ok(stem) = path.strip_prefix(src_root) else {
                    continue;
                };
                let out = dest_root.join(stem).with_extension("spv");
                if let Some(parent) = out.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        println!("cargo:warning=cannot create {parent:?}: {e}");
                        continue;
                    }
                }

                // `slangc <input> -target spirv -o <out>`
                let status = process::Command::new("slangc")
                    .arg(path.as_os_str())
                    .arg("-target")
                    .arg("spirv")
                    .arg("-entry")
                    .arg("main")
                    .arg("-o")
                    .arg(out.as_os_str())
                    .status();

                match status {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        println!("cargo:warning=slangc failed for {path:?}: {status}");
                    }
                    Err(e) => println!("cargo:warning=slangc did not run for {path:?}: {e}"),
                }
            }
        }
    }

    let slang_ext = ffi::OsStr::new("slang");
    compile_dir(&src_root, &src_root, &dest_root, slang_ext);
}

/// Sets the path for hard coding into the binary for use at runtime by the assets module.
// Packagers, see the Cargo.toml for the visualizer.
pub fn set_asset_default_dir() {
    let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let manifest = Path::new(&manifest_dir).join("Cargo.toml");

    let asset_dir = fs::read_to_string(&manifest)
        .ok()
        .and_then(|cargo| toml::from_str::<toml::Value>(&cargo).ok())
        .and_then(|parsed| {
            parsed
                .get("package")?
                .get("metadata")?
                .get("afterglow")?
                .get("asset_dir")?
                .as_str()
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "assets".to_owned());
    println!("cargo:rustc-env=AFTERGLOW_BUILD_ASSETS_DIR={asset_dir}");
}
