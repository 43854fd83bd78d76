//! The display synthesis engine.
//!
//! One [`Asic`] owns everything mutable about display generation: the update
//! cursor, mode and border state, the CLUT, the double-buffered surfaces, the
//! dirty-line flags, and the frame pacer. The instruction loop drives it
//! synchronously: catch rendering up whenever video state is about to change,
//! inject the hardware artefact if the change itself produces one, and close
//! each frame with `end`.
//!
//! # Frame lifecycle
//!
//! ```text
//! flyback → begin → advance_to*/change_mode/change_border → end → (swap) → flyback
//! ```
//!
//! `end` presents the frame (dirty diff against the last displayed surface,
//! O(1) buffer swap) unless the pacer marked it skipped, then decides the
//! next frame's draw/skip state. Calls must arrive in non-decreasing cycle
//! order within a frame; that is a caller contract, checked in debug builds.

use crate::mode::{decode_block, fetch_block};
use crate::palette::{BLACK, GREYS};
use crate::raster::{RasterPos, raster_pos};
use crate::screen::{DirtyLines, FrameBuffers, Layer, Surface};
use crate::turbo::FramePacer;
use crate::view::{BorderView, ViewWindow};
use crate::{
    BORDER_BLOCKS, CYCLES_PER_BLOCK, CYCLES_PER_LINE, PIXELS_PER_BLOCK, SCREEN_BLOCKS,
    SCREEN_LINES, ScreenMode, TOP_BORDER_LINES, VIDEO_PIPELINE_CYCLES, VideoMemory, WIDTH_BLOCKS,
};

/// Frames between flash-attribute phase toggles.
const FLASH_FRAME_COUNT: u8 = 16;

/// How long a status message stays visible.
const STATUS_ACTIVE_MS: u64 = 2500;

/// Border register bit: screen output disabled (modes 3/4 only).
const BORDER_SOFF: u8 = 0x80;

/// Power-on CLUT: the ROM's Spectrum-compatible assignment — low half at
/// mid intensity, upper half with the half-bright step added.
const DEFAULT_CLUT: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, //
    0x08, 0x19, 0x2A, 0x3B, 0x4C, 0x5D, 0x6E, 0x7F,
];

/// Drawn over the double-height composite before a frame is presented
/// (menus, debugger panels). Purely a port: the engine renders identically
/// whether or not one is attached.
pub trait Overlay {
    /// Draw widgets onto the composite surface.
    fn draw(&mut self, surface: &mut Surface);

    /// Highlight the current raster cell (debugger view).
    fn show_raster(&self) -> bool {
        false
    }
}

/// A presented frame as handed to the output stage.
pub struct FinishedFrame<'a> {
    /// Palette-index pixels, row-major.
    pub pixels: &'a [u8],
    /// Bytes per row.
    pub pitch: usize,
    /// Rows that were presented (double the view height for composites).
    pub rows: usize,
    /// Per-row change flags against the previously displayed frame.
    pub dirty: &'a [bool],
}

struct StatusLine {
    text: String,
    since_ms: u64,
}

/// The SAM Coupé display synthesis engine.
pub struct Asic {
    view: ViewWindow,
    mode: ScreenMode,
    page: u8,
    border: u8,
    clut: [u8; 16],
    flash_phase: bool,
    flash_frames: u8,
    /// Furthest raster point rendered this frame. Tracks the true raster
    /// position, not the rendered one: it advances through invisible regions
    /// too, and is reset exactly once per frame at flyback.
    cursor: RasterPos,
    buffers: FrameBuffers,
    dirty: DirtyLines,
    displayed_rows: usize,
    draw_frame: bool,
    pacer: FramePacer,
    turbo_disk: bool,
    frame_count: u64,
    status: Option<StatusLine>,
    marker_phase: u8,
    present_hook: Option<Box<dyn FnMut()>>,
}

impl Asic {
    /// Create the engine for the given border view. `turbo_disk` enables the
    /// disk-activity turbo trigger.
    #[must_use]
    pub fn new(view: BorderView, turbo_disk: bool) -> Self {
        let window = ViewWindow::new(view);
        let rows = window.height_lines() * 2;
        Self {
            view: window,
            mode: ScreenMode::One,
            page: 0,
            border: 0,
            clut: DEFAULT_CLUT,
            flash_phase: false,
            flash_frames: 0,
            cursor: RasterPos::ORIGIN,
            buffers: FrameBuffers::new(window.width_pixels(), rows),
            dirty: DirtyLines::new(rows),
            displayed_rows: window.height_lines() as usize,
            draw_frame: true,
            pacer: FramePacer::new(),
            turbo_disk,
            frame_count: 0,
            status: None,
            marker_phase: 0,
            present_hook: None,
        }
    }

    /// Reconfigure the visible window. Reallocates the surfaces; never call
    /// mid-frame.
    pub fn set_view(&mut self, view: BorderView) {
        let window = ViewWindow::new(view);
        let rows = window.height_lines() * 2;
        self.view = window;
        self.buffers = FrameBuffers::new(window.width_pixels(), rows);
        self.dirty = DirtyLines::new(rows);
        self.displayed_rows = window.height_lines() as usize;
        self.cursor = RasterPos::ORIGIN;
    }

    // === Frame lifecycle ===

    /// Start-of-frame reset: cursor to the origin, flash phase every 16th
    /// frame, expired status text cleared, frame counted.
    pub fn flyback(&mut self, now_ms: u64) {
        self.cursor = RasterPos::ORIGIN;

        self.flash_frames += 1;
        if self.flash_frames == FLASH_FRAME_COUNT {
            self.flash_frames = 0;
            self.flash_phase = !self.flash_phase;
        }

        if let Some(status) = &self.status {
            if now_ms.saturating_sub(status.since_ms) > STATUS_ACTIVE_MS {
                self.status = None;
            }
        }

        self.frame_count += 1;
        self.pacer.count_frame();
    }

    /// Seed the new frame from the previous one up to the cursor, so a
    /// mid-frame composite shows the previous frame where this one hasn't
    /// reached yet. A no-op straight after flyback.
    pub fn begin(&mut self) {
        if !self.draw_frame {
            return;
        }
        self.copy_before_cursor();
    }

    /// Render everything between the cursor and the raster position for
    /// `cycles`, exactly once. Does nothing while the frame is skipped.
    pub fn advance_to(&mut self, cycles: u32, mem: &dyn VideoMemory) {
        if !self.draw_frame {
            return;
        }
        let target = raster_pos(cycles);
        debug_assert!(
            target.line >= self.cursor.line,
            "advance_to must not move backwards within a frame"
        );
        self.rasterize_to(target, mem);
    }

    /// Catch-up hint from a caller about to read or write screen memory:
    /// renders up to `cycles` only if the line range overlaps the region the
    /// rasterizer hasn't reached yet.
    pub fn touch_lines(&mut self, from: u32, to: u32, cycles: u32, mem: &dyn VideoMemory) {
        if to >= self.cursor.line && from <= raster_pos(cycles).line {
            self.advance_to(cycles, mem);
        }
    }

    /// Close the frame: catch up to `cycles`, complete the picture from the
    /// previous frame, present (plain surface, or double-height composite
    /// when an overlay is attached), and run the pacer for the next frame.
    ///
    /// Returns whether a frame was presented.
    pub fn end(
        &mut self,
        cycles: u32,
        now_ms: u64,
        disk_active: bool,
        mem: &dyn VideoMemory,
        mut overlay: Option<&mut dyn Overlay>,
    ) -> bool {
        let presented = self.draw_frame;

        if self.draw_frame {
            self.advance_to(cycles, mem);
            self.copy_after_cursor();

            if let Some(ov) = overlay.as_mut() {
                self.compose_overlay();
                if ov.show_raster() {
                    self.draw_raster_marker();
                }
                ov.draw(self.buffers.overlay_mut());
                self.present(Layer::Overlay);
            } else {
                self.present(Layer::Screen);
            }
        }

        let disk_turbo = disk_active && self.turbo_disk;
        self.draw_frame = self.pacer.sync(now_ms, disk_turbo, overlay.is_some());
        presented
    }

    // === Mid-scanline state changes ===

    /// Install a new screen mode and display page at `cycles`.
    ///
    /// A change that crosses the character/bitmap family boundary while the
    /// raster is inside the main screen (and left of the right border) makes
    /// the ASIC emit one artefact cell: the old mode's decode applied to
    /// bytes fetched through the new addressing. Rendering then resumes one
    /// block later while the chip settles.
    pub fn change_mode(&mut self, mode: ScreenMode, page: u8, cycles: u32, mem: &dyn VideoMemory) {
        self.advance_to(cycles, mem);

        let pos = raster_pos(cycles);
        if is_screen_line(pos.line)
            && pos.block < BORDER_BLOCKS + SCREEN_BLOCKS
            && pos.block >= BORDER_BLOCKS
            && !mode.same_family(self.mode)
        {
            self.draw_mode_artifact(pos, mode, page, mem);
            self.cursor.block += VIDEO_PIPELINE_CYCLES / CYCLES_PER_BLOCK;
        }

        self.mode = mode;
        self.page = page;
    }

    /// Install a new border register value at `cycles`.
    ///
    /// Toggling the screen-enable bit while the raster is on the visible
    /// display leaves one cell drawn from the new border state before the
    /// chip settles.
    pub fn change_border(&mut self, value: u8, cycles: u32, mem: &dyn VideoMemory) {
        self.advance_to(cycles, mem);

        if (self.border ^ value) & BORDER_SOFF != 0 {
            let pos = raster_pos(cycles);
            if self.view.contains(pos.line, pos.block) {
                let colour = if value & BORDER_SOFF != 0 && self.mode.is_bitmap() {
                    BLACK
                } else {
                    self.clut[border_clut_index(value)]
                };
                let row = (pos.line - self.view.top) as usize;
                let x = ((pos.block - self.view.left) * PIXELS_PER_BLOCK) as usize;
                self.buffers.current_mut().line_mut(row)[x..x + PIXELS_PER_BLOCK as usize]
                    .fill(colour);
                self.cursor.block += VIDEO_PIPELINE_CYCLES / CYCLES_PER_BLOCK;
            }
        }

        self.border = value;
    }

    /// Install mode and page without artefact handling (power-on, snapshot
    /// restore).
    pub fn set_mode(&mut self, mode: ScreenMode, page: u8) {
        self.mode = mode;
        self.page = page;
    }

    /// Install a border register value without artefact handling.
    pub fn set_border(&mut self, value: u8) {
        self.border = value;
    }

    /// Write one CLUT register (index 0-15, 7-bit colour).
    pub fn set_clut(&mut self, index: usize, colour: u8) {
        if let Some(entry) = self.clut.get_mut(index) {
            *entry = colour & 0x7F;
        }
    }

    // === Output stage interface ===

    /// The last presented frame with its change flags.
    #[must_use]
    pub fn finished_surface(&self) -> FinishedFrame<'_> {
        let surface = self.buffers.displayed_surface();
        FinishedFrame {
            pixels: surface.pixels(),
            pitch: surface.pitch(),
            rows: self.displayed_rows,
            dirty: self.dirty.flags(),
        }
    }

    /// Per-row change flags of the last presented frame.
    #[must_use]
    pub fn dirty_lines(&self) -> &DirtyLines {
        &self.dirty
    }

    /// Force a row dirty (output stage damage, e.g. an exposed window area).
    pub fn mark_line_dirty(&mut self, row: usize) {
        self.dirty.mark(row);
    }

    /// Clear all change flags; the output stage calls this after redrawing.
    pub fn clear_dirty_lines(&mut self) {
        self.dirty.clear();
    }

    /// Called after each presented frame, for hosts that need to pump their
    /// own loop. Rendering is identical with no hook set.
    pub fn set_present_hook(&mut self, hook: Option<Box<dyn FnMut()>>) {
        self.present_hook = hook;
    }

    // === Diagnostics ===

    /// The 4 bytes the ASIC is consuming for the block one position behind
    /// the raster, clamped to the last screen cell outside the display.
    #[must_use]
    pub fn asic_data(&self, cycles: u32, mem: &dyn VideoMemory) -> [u8; 4] {
        let mut line = (cycles / CYCLES_PER_LINE) as i32 - TOP_BORDER_LINES as i32;
        let mut block =
            ((cycles % CYCLES_PER_LINE) / CYCLES_PER_BLOCK) as i32 - (2 * BORDER_BLOCKS) as i32;

        if block < 0 {
            line -= 1;
            block = SCREEN_BLOCKS as i32 - 1;
        }
        if line < 0 || line >= SCREEN_LINES as i32 {
            line = SCREEN_LINES as i32 - 1;
            block = SCREEN_BLOCKS as i32 - 1;
        }

        fetch_block(self.mode, self.page, mem, line as u32, block as u32)
    }

    /// Show a status message; it stays visible for 2.5 s of wall-clock time.
    pub fn set_status(&mut self, text: impl Into<String>, now_ms: u64) {
        self.status = Some(StatusLine { text: text.into(), since_ms: now_ms });
    }

    /// The current status message, if one is visible.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.text.as_str())
    }

    // === Accessors ===

    #[must_use]
    pub fn view(&self) -> ViewWindow {
        self.view
    }

    /// Output width in pixels.
    #[must_use]
    pub fn width_pixels(&self) -> u32 {
        self.view.width_pixels()
    }

    /// Output height in scanlines (the composite is double this).
    #[must_use]
    pub fn height_lines(&self) -> u32 {
        self.view.height_lines()
    }

    #[must_use]
    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    #[must_use]
    pub fn display_page(&self) -> u8 {
        self.mode.display_page(self.page)
    }

    #[must_use]
    pub fn border(&self) -> u8 {
        self.border
    }

    #[must_use]
    pub fn screen_off(&self) -> bool {
        self.border & BORDER_SOFF != 0 && self.mode.is_bitmap()
    }

    #[must_use]
    pub fn flash_phase(&self) -> bool {
        self.flash_phase
    }

    #[must_use]
    pub fn cursor(&self) -> RasterPos {
        self.cursor
    }

    /// Will the current frame be rasterized and presented?
    #[must_use]
    pub fn draw_frame(&self) -> bool {
        self.draw_frame
    }

    /// Hold or release the turbo key trigger.
    pub fn set_turbo_key(&mut self, held: bool) {
        self.pacer.set_key_held(held);
    }

    /// Most recent relative-speed readout (updated once per second).
    #[must_use]
    pub fn speed_percent(&self) -> u32 {
        self.pacer.speed_percent()
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // === Rasterization ===

    /// Render the half-open raster interval (cursor, target], then move the
    /// cursor to the target whether or not any of it was visible.
    fn rasterize_to(&mut self, target: RasterPos, mem: &dyn VideoMemory) {
        if target.line == self.cursor.line {
            // Part of a single line.
            if target.block > self.cursor.block {
                self.update_segment(target.line, self.cursor.block, target.block, mem);
                self.cursor.block = target.block;
            }
            return;
        }

        // Multiple lines: clip to the visible range, finish the cursor line,
        // start the target line, and fill everything between.
        let mut from = self.cursor.line.max(self.view.top);
        let mut to = target.line.min(self.view.bottom - 1);

        if from <= to {
            if from == self.cursor.line {
                self.update_segment(self.cursor.line, self.cursor.block, WIDTH_BLOCKS, mem);
                from += 1;
            }
            if to == target.line {
                self.update_segment(target.line, 0, target.block, mem);
                to -= 1;
            }
            for line in from..=to {
                self.update_segment(line, 0, WIDTH_BLOCKS, mem);
            }
        }

        self.cursor = target;
    }

    /// Render one segment of one line. Exactly one region type applies:
    /// disabled screen (black), main screen (mode renderer plus side
    /// borders), or border.
    fn update_segment(&mut self, line: u32, from_block: u32, to_block: u32, mem: &dyn VideoMemory) {
        if !self.view.contains_line(line) {
            return;
        }

        if self.screen_off() {
            self.fill_blocks(line, from_block, to_block, BLACK);
        } else if is_screen_line(line) {
            self.mode_blocks(line, from_block, to_block, mem);
        } else {
            let colour = self.clut[border_clut_index(self.border)];
            self.fill_blocks(line, from_block, to_block, colour);
        }
    }

    /// Flat fill for border and blanked segments.
    fn fill_blocks(&mut self, line: u32, from_block: u32, to_block: u32, colour: u8) {
        let view = self.view;
        let row = (line - view.top) as usize;
        let surface = self.buffers.current_mut();
        for block in from_block..to_block.min(WIDTH_BLOCKS) {
            if block < view.left || block >= view.right {
                continue;
            }
            let x = ((block - view.left) * PIXELS_PER_BLOCK) as usize;
            surface.line_mut(row)[x..x + PIXELS_PER_BLOCK as usize].fill(colour);
        }
    }

    /// Render main-screen blocks through the current mode, with border
    /// colour for the side-border blocks of the segment.
    fn mode_blocks(&mut self, line: u32, from_block: u32, to_block: u32, mem: &dyn VideoMemory) {
        let view = self.view;
        let row = (line - view.top) as usize;
        let y = line - TOP_BORDER_LINES;
        let (mode, page, clut, flash) = (self.mode, self.page, self.clut, self.flash_phase);
        let border_colour = clut[border_clut_index(self.border)];

        let surface = self.buffers.current_mut();
        for block in from_block..to_block.min(WIDTH_BLOCKS) {
            if block < view.left || block >= view.right {
                continue;
            }
            let x = ((block - view.left) * PIXELS_PER_BLOCK) as usize;
            let out = &mut surface.line_mut(row)[x..x + PIXELS_PER_BLOCK as usize];

            if (BORDER_BLOCKS..BORDER_BLOCKS + SCREEN_BLOCKS).contains(&block) {
                let bytes = fetch_block(mode, page, mem, y, block - BORDER_BLOCKS);
                out.copy_from_slice(&decode_block(mode, bytes, &clut, flash));
            } else {
                out.fill(border_colour);
            }
        }
    }

    /// The mode-change artefact cell: bytes fetched through the *new* mode's
    /// addressing, decoded by the *old* mode — the stale decode window of the
    /// real chip.
    fn draw_mode_artifact(
        &mut self,
        pos: RasterPos,
        new_mode: ScreenMode,
        new_page: u8,
        mem: &dyn VideoMemory,
    ) {
        if !self.view.contains(pos.line, pos.block) {
            return;
        }
        let bytes = fetch_block(
            new_mode,
            new_page,
            mem,
            pos.line - TOP_BORDER_LINES,
            pos.block - BORDER_BLOCKS,
        );
        let pixels = decode_block(self.mode, bytes, &self.clut, self.flash_phase);

        let row = (pos.line - self.view.top) as usize;
        let x = ((pos.block - self.view.left) * PIXELS_PER_BLOCK) as usize;
        self.buffers.current_mut().line_mut(row)[x..x + PIXELS_PER_BLOCK as usize]
            .copy_from_slice(&pixels);
    }

    // === Presentation ===

    /// Diff the presented surface against the last displayed one, record it
    /// as displayed, and flip both buffer pairs.
    fn present(&mut self, layer: Layer) {
        let rows = match layer {
            Layer::Screen => self.view.height_lines() as usize,
            Layer::Overlay => self.view.height_lines() as usize * 2,
        };

        let presented = match layer {
            Layer::Screen => self.buffers.current(),
            Layer::Overlay => self.buffers.overlay(),
        };
        let displayed = self.buffers.displayed_surface();
        for row in 0..rows {
            // Rows the output stage already marked dirty don't need comparing.
            if self.dirty.is_dirty(row) {
                continue;
            }
            if presented.line(row) != displayed.line(row) {
                self.dirty.mark(row);
            }
        }

        self.displayed_rows = rows;
        self.buffers.set_displayed(layer);
        self.buffers.swap();

        if let Some(hook) = self.present_hook.as_mut() {
            hook();
        }
    }

    /// Seed rows before the cursor from the previous frame (in-progress
    /// composite support).
    fn copy_before_cursor(&mut self) {
        let view = self.view;
        let cursor = self.cursor;

        let last = i64::from(cursor.line.min(view.bottom - 1)) - i64::from(view.top);
        if last <= 0 {
            return;
        }
        let mut last = last as usize;

        let (current, previous) = self.buffers.screen_pair_mut();

        // Partial cursor row first.
        if cursor.line >= view.top && last == (cursor.line - view.top) as usize {
            let width =
                (cursor.block.min(view.right).saturating_sub(view.left) * PIXELS_PER_BLOCK) as usize;
            if width > 0 {
                current.line_mut(last)[..width].copy_from_slice(&previous.line(last)[..width]);
            }
            last -= 1;
        }

        for row in 0..=last {
            current.line_mut(row).copy_from_slice(previous.line(row));
        }
    }

    /// Complete rows after the cursor from the previous frame, so a frame
    /// shown mid-render is whole.
    fn copy_after_cursor(&mut self) {
        let view = self.view;
        let cursor = self.cursor;
        let rows = view.height_lines() as usize;

        let mut top = (cursor.line.max(view.top) - view.top) as usize;
        if top >= rows {
            return;
        }

        let (current, previous) = self.buffers.screen_pair_mut();

        // Undrawn remainder of the cursor row first.
        if cursor.line >= view.top && top == (cursor.line - view.top) as usize {
            let offset = ((cursor.block.max(view.left) - view.left) * PIXELS_PER_BLOCK) as usize;
            let pitch = current.pitch();
            if offset < pitch {
                current.line_mut(top)[offset..].copy_from_slice(&previous.line(top)[offset..]);
            }
            top += 1;
        }

        for row in top..rows {
            current.line_mut(row).copy_from_slice(previous.line(row));
        }
    }

    /// Line-double the rendered frame into the overlay composite surface.
    fn compose_overlay(&mut self) {
        let rows = self.view.height_lines() as usize;
        let (overlay, screen) = self.buffers.compose_pair_mut();
        for row in 0..rows * 2 {
            overlay.line_mut(row).copy_from_slice(screen.line(row / 2));
        }
    }

    /// Pulse a 2×2 grayscale marker at the raster cell on the composite
    /// (debugger view). Cycles through the grey ramp, brightening then
    /// fading.
    fn draw_raster_marker(&mut self) {
        let view = self.view;
        let cursor = self.cursor;
        if !view.contains(cursor.line, cursor.block) {
            return;
        }

        self.marker_phase = (self.marker_phase + 1) & 0x0F;
        let phase = usize::from(self.marker_phase);
        let colour = GREYS[if phase < 8 { phase } else { 15 - phase }];

        let x = ((cursor.block - view.left) * PIXELS_PER_BLOCK) as usize;
        let row = ((cursor.line - view.top) * 2) as usize;
        let overlay = self.buffers.overlay_mut();
        overlay.line_mut(row)[x..x + 2].fill(colour);
        overlay.line_mut(row + 1)[x..x + 2].fill(colour);
    }
}

/// Is this raster line inside the main screen band?
fn is_screen_line(line: u32) -> bool {
    (TOP_BORDER_LINES..TOP_BORDER_LINES + SCREEN_LINES).contains(&line)
}

/// CLUT index selected by a border register value: bits 0-2 plus bit 5.
fn border_clut_index(border: u8) -> usize {
    usize::from(((border & 0x20) >> 2) | (border & 0x07))
}
