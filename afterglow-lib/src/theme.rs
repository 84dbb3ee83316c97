// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in palettes for everything drawn outside the phosphor.

use crate::colors::Rgb;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub background: Rgb,
    /// Traces, bars and the main spectrum.
    pub foreground: Rgb,
    /// Alternate spectrum, grid lines and labels.
    pub secondary: Rgb,
    /// Meter segment between -3 dB and 0 dB.
    pub caution: Rgb,
    /// Meter segment above 0 dB.
    pub clip: Rgb,
    pub splitter: Rgb,
}

impl Theme {
    pub const DARK: Theme = Theme {
        background: [0.05, 0.05, 0.06],
        foreground: [0.55, 0.85, 1.0],
        secondary: [0.45, 0.45, 0.5],
        caution: [1.0, 0.8, 0.2],
        clip: [1.0, 0.25, 0.2],
        splitter: [0.2, 0.2, 0.22],
    };

    pub const LIGHT: Theme = Theme {
        background: [0.96, 0.96, 0.94],
        foreground: [0.1, 0.3, 0.6],
        secondary: [0.55, 0.55, 0.55],
        caution: [0.85, 0.55, 0.0],
        clip: [0.85, 0.1, 0.1],
        splitter: [0.8, 0.8, 0.78],
    };

    /// Look up `window.theme`.  Unknown names fall back to dark.
    pub fn named(name: &str) -> Theme {
        match name.to_ascii_lowercase().as_str() {
            "dark" => Self::DARK,
            "light" => Self::LIGHT,
            other => {
                log::warn!("unknown theme {other:?}, using dark");
                Self::DARK
            }
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::DARK
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_named_themes() {
        assert_eq!(Theme::named("Light"), Theme::LIGHT);
        assert_eq!(Theme::named("solarized"), Theme::DARK);
    }
}
