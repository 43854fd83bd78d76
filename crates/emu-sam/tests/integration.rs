//! Integration tests for the SAM Coupé display pipeline.
//!
//! These drive the ASIC engine against paged RAM the way the instruction
//! loop would — catch-up calls at register writes, `end` at frame boundaries
//! — and check the presented frames. Screenshots land in `test_output/` at
//! the repository root for visual inspection.

#![allow(clippy::cast_possible_truncation)]

use emu_sam::{RamSize, SamConfig, SamMemory};
use mgt_asic::{
    Asic, BorderView, CYCLES_PER_BLOCK, CYCLES_PER_FRAME, CYCLES_PER_LINE, FinishedFrame,
    RASTER_OFFSET_CYCLES, RasterPos, ScreenMode,
};

/// Output directory for test artefacts (repo root's test_output/).
const OUTPUT_DIR: &str = "../../test_output";

/// Cycle count at which the raster reaches the given cell.
fn cell_cycles(line: u32, block: u32) -> u32 {
    RASTER_OFFSET_CYCLES + line * CYCLES_PER_LINE + block * CYCLES_PER_BLOCK
}

/// Full-scan display so surface rows and raster lines coincide.
fn full_scan_display() -> Asic {
    Asic::new(BorderView::CompleteScan, false)
}

fn run_frame(asic: &mut Asic, memory: &SamMemory, now_ms: u64) -> bool {
    asic.flyback(now_ms);
    asic.begin();
    asic.end(CYCLES_PER_FRAME, now_ms, false, memory, None)
}

fn row<'a>(frame: &'a FinishedFrame<'_>, row: usize) -> &'a [u8] {
    &frame.pixels[row * frame.pitch..(row + 1) * frame.pitch]
}

/// Fill a mode 3/4 display (24K from the given page) with one byte value.
fn fill_bitmap_screen(memory: &mut SamMemory, page: u8, value: u8) {
    for offset in 0..0x6000u32 {
        memory.write(page, offset, value);
    }
}

// ---------------------------------------------------------------------------
// Mode 4 frame through paged RAM
// ---------------------------------------------------------------------------

#[test]
fn mode4_frame_renders_through_paged_ram() {
    let mut memory = SamMemory::new(RamSize::Ram512K);
    fill_bitmap_screen(&mut memory, 4, 0x0F);

    let mut display = full_scan_display();
    display.set_mode(ScreenMode::Four, 4);
    assert!(run_frame(&mut display, &memory, 10));

    let frame = display.finished_surface();
    // Screen line 0 is raster line 68; screen block 0 is raster block 8.
    // Byte 0x0F decodes to two black then two bright-white output pixels.
    let x = 8 * 16;
    assert_eq!(&row(&frame, 68)[x..x + 4], &[0x00, 0x00, 0x7F, 0x7F]);

    // Screen rows changed against the initial blank display; an untouched
    // black border row diffs clean.
    assert!(frame.dirty[68]);
    assert!(!frame.dirty[10]);
}

#[test]
fn identical_frames_need_no_redraw() {
    let mut memory = SamMemory::new(RamSize::Ram512K);
    fill_bitmap_screen(&mut memory, 4, 0xA5);

    let mut display = full_scan_display();
    display.set_mode(ScreenMode::Four, 4);
    run_frame(&mut display, &memory, 10);
    display.clear_dirty_lines();

    run_frame(&mut display, &memory, 30);
    assert!(!display.dirty_lines().any());

    // A single byte poked into the display file dirties exactly its line.
    memory.write(4, 40 << 7, 0xFF); // screen line 40, first block
    display.clear_dirty_lines();
    run_frame(&mut display, &memory, 50);
    assert!(display.dirty_lines().is_dirty(68 + 40));
    assert!(!display.dirty_lines().is_dirty(68 + 41));
}

// ---------------------------------------------------------------------------
// Mid-scanline register writes
// ---------------------------------------------------------------------------

#[test]
fn border_write_mid_line_leaves_a_stripe() {
    let memory = SamMemory::new(RamSize::Ram512K);
    let mut display = full_scan_display();
    display.set_border(0x01);

    display.flyback(0);
    display.begin();
    // Change the border colour while the raster crosses border line 20.
    display.change_border(0x02, cell_cycles(20, 10), &memory);
    assert!(display.end(CYCLES_PER_FRAME, 10, false, &memory, None));

    let frame = display.finished_surface();
    assert!(row(&frame, 20)[..160].iter().all(|&p| p == 0x11), "left of the write: old colour");
    assert!(row(&frame, 20)[160..].iter().all(|&p| p == 0x22), "right of the write: new colour");
    assert!(row(&frame, 21).iter().all(|&p| p == 0x22));
}

#[test]
fn mode_switch_mid_screen_line_splits_the_decode() {
    // The write lands on raster line 100 = screen line 32. Lay out that
    // line's data for both modes: mode 4 pixels 0x0F, mode 2 zero pattern
    // with paper-2 attributes 8K above the bitmap.
    let mut memory = SamMemory::new(RamSize::Ram512K);
    for offset in (32 << 7)..(33 << 7) {
        memory.write(0, offset, 0x0F);
    }
    for col in 0..32 {
        memory.write(0, (32 << 5) + col + 0x2000, 0x10);
    }

    let mut display = full_scan_display();
    display.set_mode(ScreenMode::Four, 0);
    display.flyback(0);
    display.begin();

    // Crossing the family boundary mid-screen: artefact cell plus settle.
    display.change_mode(ScreenMode::Two, 0, cell_cycles(100, 18), &memory);
    assert_eq!(display.cursor(), RasterPos { line: 100, block: 19 });

    assert!(display.end(CYCLES_PER_FRAME, 10, false, &memory, None));
    let frame = display.finished_surface();
    // After the settle block the line decodes as mode 2: paper 2 through the
    // power-on CLUT.
    assert!(row(&frame, 100)[19 * 16..20 * 16].iter().all(|&p| p == 0x22));
    // Before the write the line was mode 4 pixels (0x0F pairs).
    assert_eq!(&row(&frame, 100)[8 * 16..8 * 16 + 4], &[0x00, 0x00, 0x7F, 0x7F]);
}

// ---------------------------------------------------------------------------
// CLUT
// ---------------------------------------------------------------------------

#[test]
fn clut_writes_retint_the_screen() {
    let mut memory = SamMemory::new(RamSize::Ram512K);
    let mut display = full_scan_display();
    display.set_mode(ScreenMode::Four, 0);

    run_frame(&mut display, &memory, 10);
    let frame = display.finished_surface();
    assert_eq!(row(&frame, 100)[8 * 16], 0x00, "zero pixels through CLUT entry 0");

    display.set_clut(0, 0x22);
    run_frame(&mut display, &memory, 30);
    let frame = display.finished_surface();
    assert_eq!(row(&frame, 100)[8 * 16], 0x22);
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

#[test]
fn speed_readout_counts_emulated_frames() {
    let memory = SamMemory::new(RamSize::Ram256K);
    let mut display = full_scan_display();

    // 26 frames spread over one wall-clock second reads 52%.
    for i in 0..26u64 {
        run_frame(&mut display, &memory, i * 40);
    }
    assert_eq!(display.speed_percent(), 52);
}

#[test]
fn configured_pipeline_gates_on_disk_activity() {
    let config = SamConfig { borders: 4, ram: RamSize::Ram512K, turbo_disk: true };
    let memory = SamMemory::new(config.ram);
    let mut display = config.build_display();

    let mut presented = 0;
    for i in 0..100u64 {
        display.flyback(1 + i * 10);
        display.begin();
        if display.end(CYCLES_PER_FRAME, 1 + i * 10, true, &memory, None) {
            presented += 1;
        }
    }
    assert!(presented <= 7, "turbo disk must cap presentation, drew {presented}");
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[cfg(feature = "native")]
#[test]
fn screenshot_of_a_finished_frame() {
    let _ = std::fs::create_dir_all(OUTPUT_DIR);

    let mut memory = SamMemory::new(RamSize::Ram512K);
    fill_bitmap_screen(&mut memory, 4, 0x3C);

    let mut display = full_scan_display();
    display.set_mode(ScreenMode::Four, 4);
    display.set_border(0x01);
    run_frame(&mut display, &memory, 10);

    let path = std::path::Path::new(OUTPUT_DIR).join("sam_mode4.png");
    emu_sam::capture::save_screenshot(&display, &path).expect("screenshot");
    let written = std::fs::metadata(&path).expect("file exists").len();
    assert!(written > 0);
}
