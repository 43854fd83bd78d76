//! Cycle counter to raster position mapping.

use crate::{CYCLES_PER_BLOCK, CYCLES_PER_LINE, RASTER_OFFSET_CYCLES};

/// A raster position: scanline and 8-pixel block within the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterPos {
    pub line: u32,
    pub block: u32,
}

impl RasterPos {
    /// Start of frame.
    pub const ORIGIN: RasterPos = RasterPos { line: 0, block: 0 };
}

/// Map a frame cycle count to the raster position being drawn.
///
/// Counts before [`RASTER_OFFSET_CYCLES`] fall in the tail of the interrupt
/// period, which the real hardware spends finishing the previous frame's last
/// line. They are reported as (0, 0); callers don't require exactness there
/// and downstream artefact timing was tuned against this mapping, so it is
/// kept as-is.
#[must_use]
pub fn raster_pos(cycles: u32) -> RasterPos {
    if cycles >= RASTER_OFFSET_CYCLES {
        let display_cycles = cycles - RASTER_OFFSET_CYCLES;
        RasterPos {
            line: display_cycles / CYCLES_PER_LINE,
            block: (display_cycles % CYCLES_PER_LINE) / CYCLES_PER_BLOCK,
        }
    } else {
        RasterPos::ORIGIN
    }
}
