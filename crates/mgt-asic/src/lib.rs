//! MGT ASIC (SAM Coupé display synthesis).
//!
//! The ASIC generates the SAM's display: it maps the frame cycle counter to a
//! raster position, rasterizes the picture incrementally in lockstep with the
//! CPU, reproduces the mid-scanline mode-change and screen-enable artefacts,
//! double-buffers the output, computes per-line change flags for the blit
//! stage, and throttles frame drawing under turbo speeds.
//!
//! # Standalone IC
//!
//! This crate has no dependencies — the ASIC reads display memory through the
//! [`VideoMemory`] trait supplied by the caller, keeping it decoupled from any
//! particular memory model. Only the display *page number* is stored; every
//! fetch goes back through the trait, so a page or mode change is picked up
//! immediately.
//!
//! # Timing (PAL)
//!
//! - 384 cycles per line = 48 blocks of 8 cycles (one block = 8 screen pixels)
//! - 312 lines per frame: 68 top border + 192 screen + 52 bottom border
//! - 119,808 cycles per frame (≈50.08 frames/second at 6 MHz)
//! - The frame cycle counter starts 64 cycles before the display of line 0;
//!   positions inside that window report as (0, 0)
//!
//! # Screen memory layout
//!
//! Four screen modes, addressed within the 16K display page:
//!
//! - Mode 1: Spectrum-compatible — interleaved bitmap
//!   (`(y & 0xC0) << 5 | (y & 0x07) << 8 | (y & 0x38) << 2`), attributes at
//!   6144 onwards, 32 bytes per 8-line group
//! - Mode 2: linear bitmap at `y << 5`, attributes 8K later
//! - Mode 3: 512×192×4 colours, 128 bytes per line, four 2-bit pixels per byte
//! - Mode 4: 256×192×16 colours, 128 bytes per line, two 4-bit pixels per byte
//!
//! Modes 3 and 4 need 24K, so the display spans an even/odd page pair and
//! fetch offsets may run past the first page.
//!
//! # Output surfaces
//!
//! Palette-index bytes (0-127 master palette), row-major. One block renders
//! to 16 output pixels — mode 3's horizontal resolution; the other modes
//! double each screen pixel. Surfaces are allocated at twice the view height:
//! the rasterizer writes single-height rows and the diagnostic composite
//! line-doubles into the full allocation.

mod asic;
mod mode;
mod palette;
mod raster;
mod screen;
mod turbo;
mod view;

pub use asic::{Asic, FinishedFrame, Overlay};
pub use mode::ScreenMode;
pub use palette::{BLACK, GREYS, PALETTE};
pub use raster::{RasterPos, raster_pos};
pub use screen::{DirtyLines, Surface};
pub use turbo::{TURBO_DISK, TURBO_KEY};
pub use view::{BorderView, ViewWindow};

/// Main screen dimensions in lines and 8-pixel blocks.
pub const SCREEN_LINES: u32 = 192;
pub const SCREEN_BLOCKS: u32 = 32;

/// Border bands surrounding the main screen.
pub const TOP_BORDER_LINES: u32 = 68;
pub const BOTTOM_BORDER_LINES: u32 = 52;
pub const BORDER_BLOCKS: u32 = 8;

/// Full frame dimensions.
pub const HEIGHT_LINES: u32 = TOP_BORDER_LINES + SCREEN_LINES + BOTTOM_BORDER_LINES;
pub const WIDTH_BLOCKS: u32 = BORDER_BLOCKS + SCREEN_BLOCKS + BORDER_BLOCKS;

/// Cycle counts: 8 cycles per block, 384 per line, 119,808 per frame.
pub const CYCLES_PER_BLOCK: u32 = 8;
pub const CYCLES_PER_LINE: u32 = WIDTH_BLOCKS * CYCLES_PER_BLOCK;
pub const CYCLES_PER_FRAME: u32 = HEIGHT_LINES * CYCLES_PER_LINE;

/// The frame cycle counter leads the display of line 0 by one border's worth
/// of blocks. Counts inside this window belong to the previous frame's final
/// line; they report as position (0, 0) — see [`raster_pos`].
pub const RASTER_OFFSET_CYCLES: u32 = BORDER_BLOCKS * CYCLES_PER_BLOCK;

/// ASIC settle time after a mid-scanline register change: rendering resumes
/// one block after the artefact cell.
pub const VIDEO_PIPELINE_CYCLES: u32 = 8;

/// Output pixels per block (mode 3 horizontal resolution).
pub const PIXELS_PER_BLOCK: u32 = 16;

/// Read-only access to the SAM's paged display memory.
///
/// Implementations must be side-effect free: the ASIC fetches through this
/// trait both while rasterizing and from diagnostic accessors.
pub trait VideoMemory {
    /// Read a display byte. `offset` is relative to the start of the given
    /// 16K page and may extend into the following page (modes 3 and 4 use a
    /// 24K display spanning a page pair).
    fn vram_peek(&self, page: u8, offset: u32) -> u8;
}
