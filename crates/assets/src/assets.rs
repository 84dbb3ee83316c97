// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Assets
//!
//! The assets module encapsulates how lookups can vary across platforms and between usage and
//! development.  `AssetDirs` is a set of realized directories where lookups may search.  Hold onto
//! it for doing many lookups at computer speed but re-initialize it for human-speed queries.
//!
//! ## Precedence Rules
//!
//! - On **debug builds** we use:
//!
//!   1. `AFTERGLOW_ASSETS_DIR` enabling overrides for any purpose.
//!   2. The source tree's assets folder, below the build time `CARGO_MANIFEST_DIR`.
//!
//! - On **release builds** we use:
//!
//!   1. `AFTERGLOW_ASSETS_DIR`
//!   2. The user's local data directory
//!   3. A preferred installation directory controlled by `AFTERGLOW_BUILD_ASSETS_DIR` or
//!      `package.metadata.afterglow.asset_dir` in the Cargo.toml.
//!   4. The expected system directory as a backup.
//!
//! When set, `AFTERGLOW_ASSETS_DIR` and `AFTERGLOW_BUILD_ASSETS_DIR` should point directly to an
//! assets root i.e. a folder containing a shaders directory.

use std::path::PathBuf;

use crate::prelude::*;

/// Pre-calculated and checked parent paths for reuse in asset look-ups.
pub struct AssetDirs {
    search_paths: Vec<PathBuf>,
}

/// Set by the build script from the package metadata, or by hand.  Only used for release builds.
const DEFAULT_ASSET_DIR: Option<&str> = option_env!("AFTERGLOW_BUILD_ASSETS_DIR");

/// Source tree location, used by debug builds.
const MANIFEST_DIR: Option<&str> = option_env!("CARGO_MANIFEST_DIR");

/// First word of every SPIR-V module, in the byte order of the machine that wrote it.
const SPIRV_MAGIC: u32 = 0x0723_0203;

impl AssetDirs {
    /// Checks asset search directories once on construction.
    pub fn new() -> Self {
        let mut search_paths = Vec::with_capacity(4);

        let as_assets_root = |p: PathBuf| -> Option<PathBuf> {
            p.canonicalize().ok().filter(|p| p.exists() && p.is_dir())
        };

        let with_assets_subdir = |p: PathBuf| as_assets_root(p.join("afterglow").join("assets"));

        if let Ok(raw) = std::env::var("AFTERGLOW_ASSETS_DIR") {
            match as_assets_root(PathBuf::from(&raw)) {
                Some(path) => search_paths.push(path),
                None => log::warn!("invalid AFTERGLOW_ASSETS_DIR (path not found): {}", raw),
            }
        }

        if cfg!(debug_assertions) {
            // `cargo run` exports the visualizer's manifest dir.  Binaries started any other way
            // still find the source tree through this crate's own location.
            std::env::var("CARGO_MANIFEST_DIR")
                .ok()
                .map(|dir| PathBuf::from(dir).join("assets"))
                .and_then(as_assets_root)
                .into_iter()
                .for_each(|p| search_paths.push(p));
            MANIFEST_DIR
                .map(|dir| PathBuf::from(dir).join("../../afterglow-visualizer/assets"))
                .and_then(as_assets_root)
                .into_iter()
                .for_each(|p| search_paths.push(p));
        } else {
            dirs::data_local_dir()
                .and_then(with_assets_subdir)
                .into_iter()
                .for_each(|p| search_paths.push(p));

            DEFAULT_ASSET_DIR
                .map(PathBuf::from)
                .and_then(as_assets_root)
                .into_iter()
                .for_each(|p| search_paths.push(p));

            dirs::data_dir()
                .and_then(with_assets_subdir)
                .into_iter()
                .for_each(|p| search_paths.push(p));
        }

        AssetDirs { search_paths }
    }

    /// Checks asset paths for `name`, returning the first existing candidate.
    pub fn find(&self, name: &str, kind: AssetKind) -> Option<PathBuf> {
        let mut file = PathBuf::from(kind.subdir()).join(name);
        file.set_extension(kind.ext());

        let found = self
            .search_paths
            .iter()
            .map(|root| root.join(&file))
            .find(|candidate| candidate.exists());

        if found.is_none() {
            log::debug!("{kind:?} {name} not found");
            self.search_paths.iter().for_each(|root| {
                log::debug!("  checked: {:?}", root.join(&file));
            });
        }
        found
    }

    /// Load SPIR-V words for the shader `name`, e.g. `phosphor/decay`.
    pub fn find_shader(&self, name: &str) -> Result<Vec<u32>, AssetError> {
        let path = self
            .find(name, AssetKind::Shader)
            .ok_or_else(|| AssetError::NotFound {
                name: name.to_owned(),
                searched: self.search_paths.len(),
            })?;
        let bytes = std::fs::read(&path).map_err(|source| AssetError::Read { path, source })?;
        spirv_words(name, &bytes)
    }
}

/// Split a SPIR-V module into words, swapping byte order when the magic number says so.
fn spirv_words(name: &str, bytes: &[u8]) -> Result<Vec<u32>, AssetError> {
    let invalid = |reason: String| AssetError::InvalidShader {
        name: name.to_owned(),
        reason,
    };
    if bytes.len() % size_of::<u32>() != 0 {
        return Err(invalid(format!(
            "length not a multiple of 4: {} bytes",
            bytes.len()
        )));
    }
    let mut words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]]))
        .collect();
    match words.first() {
        Some(&SPIRV_MAGIC) => {}
        Some(word) if word.swap_bytes() == SPIRV_MAGIC => {
            words.iter_mut().for_each(|w| *w = w.swap_bytes());
        }
        Some(word) => return Err(invalid(format!("bad magic {word:#010x}"))),
        None => return Err(invalid("empty file".to_owned())),
    }
    Ok(words)
}

impl Default for AssetDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A scratch assets root holding `shaders/<name>.spv`.
    fn scratch_root(tag: &str, name: &str, bytes: &[u8]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("afterglow-assets-{tag}-{}", std::process::id()));
        let file = root.join("shaders").join(name).with_extension("spv");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, bytes).unwrap();
        root
    }

    fn module(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[test]
    fn test_find_shader() {
        let words = [SPIRV_MAGIC, 0x0001_0300, 0, 7, 0];
        let root = scratch_root("found", "phosphor/decay", &module(&words));
        let dirs = AssetDirs {
            search_paths: vec![root.clone()],
        };
        assert_eq!(dirs.find_shader("phosphor/decay").unwrap(), words);

        match dirs.find_shader("phosphor/missing") {
            Err(AssetError::NotFound { name, searched }) => {
                assert_eq!(name, "phosphor/missing");
                assert_eq!(searched, 1);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_spirv_words_checks_magic() {
        let words = [SPIRV_MAGIC, 0x0001_0300, 42];
        let swapped: Vec<u32> = words.iter().map(|w| w.swap_bytes()).collect();
        assert_eq!(spirv_words("blur", &module(&swapped)).unwrap(), words);

        let err = spirv_words("blur", &module(&[0xdead_beef, 1])).unwrap_err();
        assert!(matches!(err, AssetError::InvalidShader { .. }));
        println!("{err}");
        assert!(err.to_string().contains("blur"));

        assert!(spirv_words("blur", &[3, 2, 0x23, 7, 1]).is_err());
        assert!(spirv_words("blur", &[]).is_err());
    }
}
