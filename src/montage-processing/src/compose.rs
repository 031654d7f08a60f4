//! Frame composition: draw a raster image scaled-to-fit into a pixel buffer

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::error::ComposeError;
use crate::pixel::{FrameSize, PixelBuffer};

/// A decoded still image in any source color format
pub type RasterImage = DynamicImage;

/// Placement of a scaled image inside the output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FittedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Largest rectangle with the source aspect ratio that fits inside `bounds`, centered
///
/// Returns `None` for a source with a zero dimension.
pub fn fitted_rect(source_width: u32, source_height: u32, bounds: FrameSize) -> Option<FittedRect> {
    if source_width == 0 || source_height == 0 {
        return None;
    }

    let scale = f64::min(
        bounds.width as f64 / source_width as f64,
        bounds.height as f64 / source_height as f64,
    );

    let width = ((source_width as f64 * scale).round() as u32).clamp(1, bounds.width);
    let height = ((source_height as f64 * scale).round() as u32).clamp(1, bounds.height);

    Some(FittedRect {
        x: (bounds.width - width) / 2,
        y: (bounds.height - height) / 2,
        width,
        height,
    })
}

/// Clear `buffer` and draw `image` into it, scaled to fit and centered
///
/// Pixels are written as premultiplied ARGB; the letterbox area stays
/// fully transparent.
pub fn compose_into(buffer: &mut PixelBuffer, image: &RasterImage) -> Result<FittedRect, ComposeError> {
    let (source_width, source_height) = image.dimensions();
    let bounds = buffer.size();

    let rect = fitted_rect(source_width, source_height, bounds).ok_or(ComposeError::EmptyImage {
        width: source_width,
        height: source_height,
    })?;

    let expected = bounds.width as usize * bounds.height as usize * buffer.format().bytes_per_pixel();
    if buffer.data().len() != expected {
        return Err(ComposeError::BufferLength {
            expected,
            actual: buffer.data().len(),
        });
    }

    let rgba = image.to_rgba8();
    let scaled: RgbaImage = if rect.width == source_width && rect.height == source_height {
        rgba
    } else {
        imageops::resize(&rgba, rect.width, rect.height, FilterType::Triangle)
    };

    buffer.clear();
    let stride = buffer.bytes_per_row();
    let data = buffer.data_mut();

    for (row_index, row) in scaled.rows().enumerate() {
        let row_start = (rect.y as usize + row_index) * stride + rect.x as usize * 4;
        let dst = &mut data[row_start..row_start + rect.width as usize * 4];

        for (px, out) in row.zip(dst.chunks_exact_mut(4)) {
            let [r, g, b, a] = px.0;
            out[0] = a;
            out[1] = premultiply(r, a);
            out[2] = premultiply(g, a);
            out[3] = premultiply(b, a);
        }
    }

    Ok(rect)
}

#[inline]
fn premultiply(channel: u8, alpha: u8) -> u8 {
    ((channel as u16 * alpha as u16 + 127) / 255) as u8
}
