//! Display configuration.

use mgt_asic::{Asic, BorderView};

/// Fitted internal RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RamSize {
    Ram256K,
    #[default]
    Ram512K,
}

impl RamSize {
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Self::Ram256K => 256 * 1024,
            Self::Ram512K => 512 * 1024,
        }
    }
}

/// Configuration for the display pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamConfig {
    /// Border view preset index (0-4), as stored in the options file.
    pub borders: u8,
    pub ram: RamSize,
    /// Throttle frame drawing during accelerated disk access.
    pub turbo_disk: bool,
}

impl Default for SamConfig {
    fn default() -> Self {
        Self { borders: 2, ram: RamSize::default(), turbo_disk: true }
    }
}

impl SamConfig {
    /// The border preset this configuration selects; out-of-range indices
    /// fall back to the narrowest view.
    #[must_use]
    pub fn border_view(&self) -> BorderView {
        BorderView::from_index(self.borders)
    }

    /// Build the display engine for this configuration.
    #[must_use]
    pub fn build_display(&self) -> Asic {
        Asic::new(self.border_view(), self.turbo_disk)
    }

    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
