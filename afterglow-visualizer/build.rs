// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use afterglow_assets as assets;

fn main() {
    assets::build::set_asset_default_dir();
    assets::build::build_shaders();
}
