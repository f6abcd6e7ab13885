use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageEncoder, RgbaImage};

use crate::config::ColorScheme;
use crate::core_modules::buffer_encoder::{encode_region, EncodedBuffers};
use crate::core_modules::grid_finalizer::FinalGrid;
use crate::core_modules::segment::SegmentBox;

/// Wraps an encoded color buffer as an image, one pixel per grid cell.
pub fn to_rgba_image(buffers: &EncodedBuffers) -> Option<RgbaImage> {
    RgbaImage::from_raw(buffers.width as u32, buffers.height as u32, buffers.color.clone())
}

/// Nearest-neighbor enlargement so single cells stay crisp squares.
pub fn upscale(image: &RgbaImage, factor: u32) -> RgbaImage {
    let factor = factor.max(1);
    imageops::resize(image, image.width() * factor, image.height() * factor, FilterType::Nearest)
}

/// Heat map crop of one segment's bounding box.
pub fn segment_crop(final_grid: &FinalGrid, segment: &SegmentBox, scheme: ColorScheme) -> Option<RgbaImage> {
    to_rgba_image(&encode_region(final_grid, scheme, segment.coordinates))
}

pub fn save_png(path: &Path, image: &RgbaImage) -> Result<(), image::error::ImageError> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::png::PngEncoder::new(output);

    encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)?;

    Ok(())
}
