//! Text rendering onto raster labels

use image::{GrayImage, Luma};

/// Draws text onto a grayscale canvas (0 = black ink)
pub trait GlyphRenderer: Send + Sync {
    /// Width in pixels of `text` drawn `height` pixels tall
    fn measure(&self, text: &str, height: u32) -> u32;

    /// Draw `text` with its top-left corner at `(x, y)`; pixels off the
    /// canvas are skipped
    fn draw(&self, canvas: &mut GrayImage, text: &str, x: u32, y: u32, height: u32);
}

fn darken(canvas: &mut GrayImage, x: i64, y: i64, ink: u8) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    let px = canvas.get_pixel_mut(x as u32, y as u32);
    px[0] = px[0].min(255 - ink);
}

/// Built-in 8x8 bitmap font, scaled by whole pixels
///
/// Covers ASCII and Latin-1. Cyrillic letters that share a Latin shape
/// borrow it; everything else is drawn as `?`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockGlyphs;

impl BlockGlyphs {
    fn scale(height: u32) -> u32 {
        (height / 8).max(1)
    }

    fn glyph(c: char) -> [u8; 8] {
        use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};

        let c = latin_lookalike(c).unwrap_or(c);
        BASIC_FONTS
            .get(c)
            .or_else(|| LATIN_FONTS.get(c))
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8])
    }
}

fn latin_lookalike(c: char) -> Option<char> {
    let mapped = match c {
        'А' => 'A',
        'В' => 'B',
        'Е' | 'Ё' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'Х' => 'X',
        'а' => 'a',
        'е' | 'ё' => 'e',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'у' => 'y',
        'х' => 'x',
        _ => return None,
    };
    Some(mapped)
}

impl GlyphRenderer for BlockGlyphs {
    fn measure(&self, text: &str, height: u32) -> u32 {
        text.chars().count() as u32 * 8 * Self::scale(height)
    }

    fn draw(&self, canvas: &mut GrayImage, text: &str, x: u32, y: u32, height: u32) {
        let s = Self::scale(height) as i64;
        for (i, c) in text.chars().enumerate() {
            let origin_x = x as i64 + i as i64 * 8 * s;
            for (row, bits) in Self::glyph(c).iter().enumerate() {
                for col in 0..8 {
                    // bit 0 is the leftmost pixel
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    for dy in 0..s {
                        for dx in 0..s {
                            darken(
                                canvas,
                                origin_x + col as i64 * s + dx,
                                y as i64 + row as i64 * s + dy,
                                255,
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(feature = "truetype")]
pub use truetype::TrueTypeGlyphs;

#[cfg(feature = "truetype")]
mod truetype {
    use super::{GlyphRenderer, darken};
    use crate::error::{PrintError, PrintResult};
    use image::GrayImage;
    use rusttype::{Font, Scale, point};
    use std::path::Path;

    /// Any TrueType/OpenType font, antialiased then darkened onto the canvas
    pub struct TrueTypeGlyphs {
        font: Font<'static>,
    }

    impl TrueTypeGlyphs {
        pub fn from_bytes(bytes: Vec<u8>) -> PrintResult<Self> {
            Font::try_from_vec(bytes)
                .map(|font| Self { font })
                .ok_or_else(|| PrintError::Render("not a TrueType/OpenType font".into()))
        }

        pub fn from_file(path: &Path) -> PrintResult<Self> {
            let bytes = std::fs::read(path)
                .map_err(|e| PrintError::Render(format!("{}: {}", path.display(), e)))?;
            Self::from_bytes(bytes)
        }
    }

    impl GlyphRenderer for TrueTypeGlyphs {
        fn measure(&self, text: &str, height: u32) -> u32 {
            let scale = Scale::uniform(height as f32);
            let width: f32 = text
                .chars()
                .map(|c| self.font.glyph(c).scaled(scale).h_metrics().advance_width)
                .sum();
            width.ceil() as u32
        }

        fn draw(&self, canvas: &mut GrayImage, text: &str, x: u32, y: u32, height: u32) {
            let scale = Scale::uniform(height as f32);
            let ascent = self.font.v_metrics(scale).ascent;
            for glyph in self
                .font
                .layout(text, scale, point(x as f32, y as f32 + ascent))
            {
                let Some(bb) = glyph.pixel_bounding_box() else {
                    continue;
                };
                glyph.draw(|gx, gy, coverage| {
                    let ink = (coverage.clamp(0.0, 1.0) * 255.0) as u8;
                    darken(
                        canvas,
                        bb.min.x as i64 + gx as i64,
                        bb.min.y as i64 + gy as i64,
                        ink,
                    );
                });
            }
        }
    }
}

/// Fill a rectangle with black, clipped to the canvas
pub(crate) fn fill_rect(canvas: &mut GrayImage, x: u32, y: u32, w: u32, h: u32) {
    let x_end = (x + w).min(canvas.width());
    let y_end = (y + h).min(canvas.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            canvas.put_pixel(px, py, Luma([0]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ink(canvas: &GrayImage) -> usize {
        canvas.pixels().filter(|p| p[0] < 128).count()
    }

    #[test]
    fn test_block_measure() {
        assert_eq!(BlockGlyphs.measure("ABC", 8), 24);
        assert_eq!(BlockGlyphs.measure("ABC", 24), 72);
        assert_eq!(BlockGlyphs.measure("", 24), 0);
        // never below scale 1
        assert_eq!(BlockGlyphs.measure("A", 3), 8);
    }

    #[test]
    fn test_block_draws_ink() {
        let mut canvas = GrayImage::from_pixel(32, 16, Luma([255]));
        BlockGlyphs.draw(&mut canvas, "A", 0, 0, 16);
        assert!(ink(&canvas) > 0);
        // nothing right of the single 16px glyph
        for y in 0..16 {
            for x in 16..32 {
                assert_eq!(canvas.get_pixel(x, y)[0], 255);
            }
        }
    }

    #[test]
    fn test_block_fallbacks() {
        let render = |text: &str| {
            let mut canvas = GrayImage::from_pixel(8, 8, Luma([255]));
            BlockGlyphs.draw(&mut canvas, text, 0, 0, 8);
            canvas
        };
        assert_eq!(render("Ж"), render("?"));
        assert_eq!(render("Р"), render("P"));
        assert_ne!(render("Р"), render("?"));
    }

    #[test]
    fn test_block_clips_at_edge() {
        let mut canvas = GrayImage::from_pixel(4, 4, Luma([255]));
        BlockGlyphs.draw(&mut canvas, "WWW", 2, 2, 16);
        assert!(ink(&canvas) > 0);
    }

    #[test]
    fn test_fill_rect_clipped() {
        let mut canvas = GrayImage::from_pixel(10, 10, Luma([255]));
        fill_rect(&mut canvas, 8, 8, 5, 5);
        assert_eq!(ink(&canvas), 4);
        fill_rect(&mut canvas, 20, 20, 5, 5);
        assert_eq!(ink(&canvas), 4);
    }

    #[cfg(feature = "truetype")]
    #[test]
    fn test_truetype_rejects_garbage() {
        assert!(TrueTypeGlyphs::from_bytes(vec![0, 1, 2, 3]).is_err());
        assert!(TrueTypeGlyphs::from_file(std::path::Path::new("/nonexistent.ttf")).is_err());
    }
}
