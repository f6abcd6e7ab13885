// THEORY:
// The `BufferEncoder` packs a finalized grid into two flat buffers for renderers:
// a displacement heightfield (`f32` per cell) and an RGBA heat map (`u8` x 4 per
// cell). It is a pure function of the grid and a color scheme, so a scheme
// change re-encodes without touching segmentation.
//
// Colors come from each cell's finalized `percentage`, its position inside the
// observed thickness range. The encoder never recomputes that position itself.
//
// Buffer row 0 is the *last* grid row: renderers sample with V pointing up.

use palette::{FromColor, Hsv, Srgb};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::ColorScheme;
use crate::core_modules::cell::FinalCell;
use crate::core_modules::grid_finalizer::FinalGrid;
use crate::core_modules::segment::BoundingBox;

/// Color of a non-inspected cell.
pub const ND_COLOR: [u8; 4] = [128, 128, 128, 255];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedBuffers {
    pub width: usize,
    pub height: usize,
    /// `width * height` heights, bottom grid row first.
    pub displacement: Vec<f32>,
    /// `width * height * 4` RGBA bytes, bottom grid row first.
    pub color: Vec<u8>,
}

/// Encodes the whole grid.
pub fn encode(final_grid: &FinalGrid, scheme: ColorScheme) -> EncodedBuffers {
    let window = BoundingBox {
        x_min: 0,
        x_max: final_grid.width.saturating_sub(1),
        y_min: 0,
        y_max: final_grid.height.saturating_sub(1),
    };
    if final_grid.width == 0 || final_grid.height == 0 {
        return EncodedBuffers {
            width: 0,
            height: 0,
            displacement: Vec::new(),
            color: Vec::new(),
        };
    }
    encode_region(final_grid, scheme, window)
}

/// Encodes the cells inside `region` (inclusive bounds, clipped to the grid)
/// with the same mapping as [`encode`]. Used for per-segment heat map crops.
pub fn encode_region(
    final_grid: &FinalGrid,
    scheme: ColorScheme,
    region: BoundingBox,
) -> EncodedBuffers {
    let x_max = region.x_max.min(final_grid.width.saturating_sub(1));
    let y_max = region.y_max.min(final_grid.height.saturating_sub(1));
    if final_grid.width == 0 || final_grid.height == 0 || region.x_min > x_max || region.y_min > y_max {
        return EncodedBuffers {
            width: 0,
            height: 0,
            displacement: Vec::new(),
            color: Vec::new(),
        };
    }

    let width = x_max - region.x_min + 1;
    let height = y_max - region.y_min + 1;
    let mut displacement = vec![0.0f32; width * height];
    let mut color = vec![0u8; width * height * 4];

    displacement
        .par_chunks_mut(width)
        .zip(color.par_chunks_mut(width * 4))
        .enumerate()
        .for_each(|(buffer_row, (heights, rgba))| {
            let grid_row = &final_grid.rows[y_max - buffer_row];
            let cells = &grid_row[region.x_min..=x_max];
            for (x, cell) in cells.iter().enumerate() {
                heights[x] = cell.effective_thickness.filter(|_| !cell.is_nd()).unwrap_or(0.0) as f32;
                rgba[x * 4..x * 4 + 4].copy_from_slice(&cell_color(cell, scheme));
            }
        });

    EncodedBuffers {
        width,
        height,
        displacement,
        color,
    }
}

pub fn cell_color(cell: &FinalCell, scheme: ColorScheme) -> [u8; 4] {
    match cell.percentage {
        Some(percentage) if !cell.is_nd() => ramp_color(percentage / 100.0, scheme),
        _ => ND_COLOR,
    }
}

/// Maps a normalized position `p` (0 = thinnest) onto the scheme's ramp.
pub fn ramp_color(p: f64, scheme: ColorScheme) -> [u8; 4] {
    let p = p.clamp(0.0, 1.0) as f32;
    match scheme {
        ColorScheme::Spectrum => {
            let hsv: Hsv = Hsv::new(240.0 * (1.0 - p), 1.0, 1.0);
            let rgb: Srgb = Srgb::from_color(hsv);
            let rgb: Srgb<u8> = rgb.into_format();
            [rgb.red, rgb.green, rgb.blue, 255]
        }
        ColorScheme::Grayscale => {
            let level = (p * 255.0).round() as u8;
            [level, level, level, 255]
        }
    }
}
