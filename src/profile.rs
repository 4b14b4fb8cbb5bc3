//! # Compression Profiles
//!
//! A profile is one Ghostscript attempt strategy: a `-dPDFSETTINGS` preset
//! plus optional extra directives. Profiles are tried in a fixed order, from
//! the highest-fidelity preset of the configured ladder down to the optional
//! aggressive downsampling pass.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ghostscript `-dPDFSETTINGS` presets, weakest to strongest compression.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// Highest quality, largest output.
    Prepress,
    /// ~300 dpi.
    Printer,
    /// ~150 dpi, a good balance for study notes.
    Ebook,
    /// ~72 dpi, smallest output.
    Screen,
}

impl QualityPreset {
    pub fn name(self) -> &'static str {
        match self {
            QualityPreset::Prepress => "prepress",
            QualityPreset::Printer => "printer",
            QualityPreset::Ebook => "ebook",
            QualityPreset::Screen => "screen",
        }
    }

    /// The `-dPDFSETTINGS=` directive for this preset.
    pub fn directive(self) -> String {
        format!("-dPDFSETTINGS=/{}", self.name())
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

impl FromStr for QualityPreset {
    type Err = ConfigError;

    /// Accepts `ebook` as well as Ghostscript's own `/ebook` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let name = trimmed.strip_prefix('/').unwrap_or(trimmed);
        match name.to_ascii_lowercase().as_str() {
            "prepress" => Ok(QualityPreset::Prepress),
            "printer" => Ok(QualityPreset::Printer),
            "ebook" => Ok(QualityPreset::Ebook),
            "screen" => Ok(QualityPreset::Screen),
            _ => Err(ConfigError::UnknownQuality(trimmed.to_string())),
        }
    }
}

/// Resolution caps (dpi) applied by the aggressive pass.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Downsampling {
    #[serde(default = "default_color_dpi")]
    pub color_dpi: u32,
    #[serde(default = "default_gray_dpi")]
    pub gray_dpi: u32,
    #[serde(default = "default_mono_dpi")]
    pub mono_dpi: u32,
}

fn default_color_dpi() -> u32 {
    96
}
fn default_gray_dpi() -> u32 {
    96
}
fn default_mono_dpi() -> u32 {
    150
}

impl Default for Downsampling {
    fn default() -> Self {
        Self {
            color_dpi: default_color_dpi(),
            gray_dpi: default_gray_dpi(),
            mono_dpi: default_mono_dpi(),
        }
    }
}

impl Downsampling {
    /// Ghostscript directives enabling bicubic downsampling to these caps.
    pub fn directives(&self) -> Vec<String> {
        let mut args = vec!["-dDetectDuplicateImages=true".to_string()];
        for (kind, dpi) in [
            ("Color", self.color_dpi),
            ("Gray", self.gray_dpi),
            ("Mono", self.mono_dpi),
        ] {
            args.push(format!("-dDownsample{kind}Images=true"));
            args.push(format!("-d{kind}ImageDownsampleType=/Bicubic"));
            args.push(format!("-d{kind}ImageResolution={dpi}"));
        }
        args
    }
}

/// One compression attempt strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub quality: QualityPreset,
    pub extra_args: Vec<String>,
}

impl Profile {
    pub fn preset(quality: QualityPreset) -> Self {
        Self {
            quality,
            extra_args: Vec::new(),
        }
    }

    /// The strongest preset combined with explicit image downsampling.
    pub fn aggressive(caps: &Downsampling) -> Self {
        Self {
            quality: QualityPreset::Screen,
            extra_args: caps.directives(),
        }
    }

    pub fn is_aggressive(&self) -> bool {
        !self.extra_args.is_empty()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_aggressive() {
            write!(f, "{} + downsampling", self.quality)
        } else {
            write!(f, "{}", self.quality)
        }
    }
}

/// Parses a comma-separated quality ladder such as `"ebook, /screen"`.
///
/// Empty tokens are skipped; every nonempty token must name a preset.
pub fn parse_ladder(raw: &str) -> Result<Vec<QualityPreset>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(QualityPreset::from_str)
        .collect()
}

/// The ladder used when nothing is configured.
pub fn default_ladder() -> Vec<QualityPreset> {
    vec![QualityPreset::Ebook, QualityPreset::Screen]
}

/// Builds the ordered profile list: one per ladder entry, then the
/// aggressive pass when `aggressive` is set.
pub fn build_profiles(ladder: &[QualityPreset], aggressive: Option<&Downsampling>) -> Vec<Profile> {
    let mut profiles: Vec<Profile> = ladder.iter().copied().map(Profile::preset).collect();
    if let Some(caps) = aggressive {
        profiles.push(Profile::aggressive(caps));
    }
    profiles
}
