//! Decoded greyscale pixel grids.
//!
//! The compiler works on a single-channel grid with one intensity byte per
//! pixel. Encoded uploads (PNG, JPEG, BMP, ...) are decoded with the `image`
//! crate and converted to 8-bit luma first.

use crate::error::{ToolpathError, ToolpathResult};
use image::{DynamicImage, GrayImage};
use std::path::Path;
use urtuft_core::CompileError;

/// Row-major greyscale pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelGrid {
    /// Wrap an already decoded buffer.
    ///
    /// Rejects zero-size grids, anything other than one channel, and buffers
    /// whose length does not match the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self, CompileError> {
        if width == 0 || height == 0 {
            return Err(CompileError::EmptyImage { width, height });
        }
        if channels != 1 {
            return Err(CompileError::UnsupportedChannels { channels });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(CompileError::DimensionMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Take ownership of an 8-bit luma image.
    pub fn from_luma(image: GrayImage) -> Result<Self, CompileError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, 1, image.into_raw())
    }

    /// Convert any decoded image to greyscale.
    pub fn from_image(image: DynamicImage) -> Result<Self, CompileError> {
        Self::from_luma(image.to_luma8())
    }

    /// Decode an encoded image held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, CompileError> {
        let image = image::load_from_memory(bytes).map_err(|e| CompileError::Decode {
            reason: e.to_string(),
        })?;
        Self::from_image(image)
    }

    /// Read and decode an image file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ToolpathResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::decode(&bytes).map_err(ToolpathError::from)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Intensity at `column`, `row`.
    ///
    /// # Panics
    /// When the coordinates are outside the grid.
    pub fn intensity(&self, column: u32, row: u32) -> u8 {
        self.pixels[row as usize * self.width as usize + column as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_new_rejects_bad_input() {
        assert_eq!(
            PixelGrid::new(0, 3, 1, vec![]),
            Err(CompileError::EmptyImage {
                width: 0,
                height: 3
            })
        );
        assert_eq!(
            PixelGrid::new(2, 2, 3, vec![0; 12]),
            Err(CompileError::UnsupportedChannels { channels: 3 })
        );
        assert_eq!(
            PixelGrid::new(2, 2, 1, vec![0; 3]),
            Err(CompileError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_row_major_indexing() {
        let grid = PixelGrid::new(3, 2, 1, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(grid.intensity(0, 0), 0);
        assert_eq!(grid.intensity(2, 0), 2);
        assert_eq!(grid.intensity(1, 1), 4);
    }

    #[test]
    fn test_decode_png_to_luma() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([0, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let grid = PixelGrid::decode(&bytes).unwrap();
        assert_eq!((grid.width(), grid.height()), (2, 1));
        assert_eq!(grid.intensity(0, 0), 0);
        assert_eq!(grid.intensity(1, 0), 255);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            PixelGrid::decode(b"not an image"),
            Err(CompileError::Decode { .. })
        ));
    }

    #[test]
    fn test_from_luma() {
        let image = GrayImage::from_pixel(4, 3, Luma([7]));
        let grid = PixelGrid::from_luma(image).unwrap();
        assert_eq!(grid.intensity(3, 2), 7);
    }
}
