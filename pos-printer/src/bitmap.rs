//! 1-bit raster images for `GS v 0` and TSPL `BITMAP`

use image::{GrayImage, RgbaImage};

/// Luminance below this prints black
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Packed monochrome bitmap: rows of `row_bytes()` bytes, MSB = leftmost
/// pixel, bit set = black dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl MonoBitmap {
    /// Pack a bitmap from a per-pixel "is black" predicate
    pub fn from_fn(width: u32, height: u32, mut black: impl FnMut(u32, u32) -> bool) -> Self {
        let row_bytes = width.div_ceil(8) as usize;
        let mut data = vec![0u8; row_bytes * height as usize];
        for y in 0..height {
            let row = &mut data[y as usize * row_bytes..(y as usize + 1) * row_bytes];
            for x in 0..width {
                if black(x, y) {
                    row[(x / 8) as usize] |= 0x80 >> (x % 8);
                }
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Threshold a grayscale image
    pub fn from_luma(img: &GrayImage, threshold: u8) -> Self {
        Self::from_fn(img.width(), img.height(), |x, y| {
            img.get_pixel(x, y)[0] < threshold
        })
    }

    /// Threshold an RGBA image; pixels with alpha below 128 are paper
    pub fn from_rgba(img: &RgbaImage, threshold: u8) -> Self {
        Self::from_fn(img.width(), img.height(), |x, y| {
            let p = img.get_pixel(x, y);
            if p[3] < 128 {
                return false;
            }
            let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
            (luma as u8) < threshold
        })
    }

    /// Flip every dot (some label firmware expects 0 = black)
    pub fn inverted(mut self) -> Self {
        for b in &mut self.data {
            *b = !*b;
        }
        // padding bits past the right edge stay clear
        let pad = (self.row_bytes() * 8) as u32 - self.width;
        if pad > 0 {
            let mask = 0xFFu8 << pad;
            let row_bytes = self.row_bytes();
            for row in self.data.chunks_mut(row_bytes) {
                if let Some(last) = row.last_mut() {
                    *last &= mask;
                }
            }
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        self.width.div_ceil(8) as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_black(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.data[y as usize * self.row_bytes() + (x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn test_pack_msb_first() {
        let bmp = MonoBitmap::from_fn(10, 2, |x, y| y == 0 && (x == 0 || x == 9));
        assert_eq!(bmp.row_bytes(), 2);
        assert_eq!(bmp.data(), &[0x80, 0x40, 0x00, 0x00]);
        assert!(bmp.is_black(9, 0));
        assert!(!bmp.is_black(8, 0));
    }

    #[test]
    fn test_threshold() {
        let mut img = GrayImage::from_pixel(8, 1, Luma([255]));
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([127]));
        img.put_pixel(2, 0, Luma([128]));
        let bmp = MonoBitmap::from_luma(&img, DEFAULT_THRESHOLD);
        assert_eq!(bmp.data(), &[0b1100_0000]);
    }

    #[test]
    fn test_transparent_is_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let bmp = MonoBitmap::from_rgba(&img, DEFAULT_THRESHOLD);
        assert!(!bmp.is_black(0, 0));
        assert!(bmp.is_black(1, 0));
    }

    #[test]
    fn test_inverted_keeps_padding_clear() {
        let bmp = MonoBitmap::from_fn(10, 1, |x, _| x == 0).inverted();
        assert_eq!(bmp.data(), &[0x7F, 0xC0]);
    }
}
