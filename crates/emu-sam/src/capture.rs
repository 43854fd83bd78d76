//! Headless capture: PNG screenshots of finished frames.

use std::error::Error;
use std::fs;
use std::path::Path;

use mgt_asic::{Asic, PALETTE};

/// Save the last presented frame as a PNG file.
///
/// The frame is palette-indexed; this resolves each byte through the master
/// palette to RGBA for the PNG encoder.
pub fn save_screenshot(asic: &Asic, path: &Path) -> Result<(), Box<dyn Error>> {
    let frame = asic.finished_surface();
    let width = frame.pitch as u32;
    let height = frame.rows as u32;

    let file = fs::File::create(path)?;
    let w = std::io::BufWriter::new(file);
    let mut encoder = png::Encoder::new(w, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;

    // Palette indices → RGBA bytes
    let mut rgba = Vec::with_capacity(frame.rows * frame.pitch * 4);
    for &index in &frame.pixels[..frame.rows * frame.pitch] {
        let argb = PALETTE[usize::from(index & 0x7F)];
        rgba.push(((argb >> 16) & 0xFF) as u8);
        rgba.push(((argb >> 8) & 0xFF) as u8);
        rgba.push((argb & 0xFF) as u8);
        rgba.push(0xFF); // Alpha
    }

    writer.write_image_data(&rgba)?;
    Ok(())
}
