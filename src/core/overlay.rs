use crate::core::georef::Georeferencer;
use crate::core::raster::CoverageRaster;
use crate::domain::model::{BoundaryRing, CoverageVerdict, PixelCoord, Transmitter};
use crate::utils::error::Result;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const TRANSMITTER_COLOR: Rgb<u8> = Rgb([30, 80, 220]);
const COVERED_COLOR: Rgb<u8> = Rgb([0, 150, 60]);
const OUTSIDE_COLOR: Rgb<u8> = Rgb([220, 30, 30]);
const RING_COLOR: Rgb<u8> = Rgb([250, 200, 0]);
const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const MARKER_HALF_SIZE: i32 = 4;

/// 在網格「副本」上標出發射端、設備與量測圓環；原始網格不變
pub fn render_overlay(
    raster: &CoverageRaster,
    georef: &Georeferencer,
    transmitter: &Transmitter,
    verdicts: &[CoverageVerdict],
    rings: &[BoundaryRing],
) -> RgbImage {
    let mut image = raster.as_image().clone();

    for ring in rings {
        let pixels: Vec<PixelCoord> = ring
            .points
            .iter()
            .map(|&(lat, lon)| georef.pixel_clamped(lat, lon))
            .collect();
        for pair in pixels.windows(2) {
            draw_line(&mut image, pair[0], pair[1], RING_COLOR);
        }
    }

    for verdict in verdicts {
        let at = georef.pixel_clamped(verdict.device.latitude, verdict.device.longitude);
        if verdict.outside_coverage {
            draw_cross(&mut image, at, OUTSIDE_COLOR);
        } else {
            draw_marker(&mut image, at, COVERED_COLOR);
        }
    }

    let tx = georef.pixel_clamped(transmitter.latitude, transmitter.longitude);
    draw_marker(&mut image, tx, TRANSMITTER_COLOR);

    image
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_marker(image: &mut RgbImage, at: PixelCoord, color: Rgb<u8>) {
    let (cx, cy) = (at.x as i32, at.y as i32);
    let outer = MARKER_HALF_SIZE + 1;
    for dy in -outer..=outer {
        for dx in -outer..=outer {
            let edge = dx.abs() == outer || dy.abs() == outer;
            put(image, cx + dx, cy + dy, if edge { OUTLINE_COLOR } else { color });
        }
    }
}

fn draw_cross(image: &mut RgbImage, at: PixelCoord, color: Rgb<u8>) {
    let (cx, cy) = (at.x as i32, at.y as i32);
    for d in -MARKER_HALF_SIZE..=MARKER_HALF_SIZE {
        for w in -1..=1 {
            put(image, cx + d + w, cy + d, color);
            put(image, cx + d + w, cy - d, color);
        }
    }
}

// Bresenham
fn draw_line(image: &mut RgbImage, from: PixelCoord, to: PixelCoord, color: Rgb<u8>) {
    let (mut x, mut y) = (from.x as i32, from.y as i32);
    let (x1, y1) = (to.x as i32, to.y as i32);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
