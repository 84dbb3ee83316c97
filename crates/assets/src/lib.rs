// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Assets
//!
//! The phosphor passes are Slang compute shaders, and the visualizer only ever loads them as
//! SPIR-V.  `build` compiles `shaders/**/*.slang` into `assets/shaders/**/*.spv` from a build
//! script.  The runtime half finds those files again from the source tree or an installed
//! package and hands back checked SPIR-V words.
//!
//! A shader that cannot be found or does not look like SPIR-V is an `AssetError`, never a panic.
//! The visualizer treats any of them as "no GPU phosphor" and renders on the CPU.
//!
//! Both halves are feature gated to keep compile time down.  Use the `build` feature in
//! build-dependencies and the `runtime` feature in normal dependencies.

#[cfg(feature = "runtime")]
pub mod assets;
#[cfg(feature = "build")]
pub mod build;
#[cfg(feature = "runtime")]
pub use assets::*;

use std::ffi::OsStr;
use std::path::PathBuf;

mod prelude {
    pub use super::AssetError;
    pub use super::AssetKind;
}

#[derive(Debug, Clone, Copy)]
pub enum AssetKind {
    /// Compiled compute shader, named by its path below `shaders/` without extension.
    Shader,
}

impl AssetKind {
    fn ext(&self) -> &'static OsStr {
        match self {
            AssetKind::Shader => OsStr::new("spv"),
        }
    }

    fn subdir(&self) -> &'static OsStr {
        match self {
            AssetKind::Shader => OsStr::new("shaders"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("shader {name} not found in {searched} asset directories")]
    NotFound { name: String, searched: usize },
    #[error("shader {name} is not SPIR-V: {reason}")]
    InvalidShader { name: String, reason: String },
}
