//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. Text is encoded
//! immediately with the builder's code page, so the buffer is always ready
//! to send.

use crate::bitmap::MonoBitmap;
use crate::codepage::Codepage;
use crate::error::{PrintError, PrintResult};
use std::path::Path;
use tracing::{debug, instrument};

/// Widest line any supported receipt printer can print
pub const MAX_LINE_CHARS: usize = 42;

/// Left/right justify two strings on one `width`-character line
///
/// The right side is never truncated; an overlong left side is cut and
/// marked with `…`. At least one space always separates the two.
pub fn lr_safe(left: &str, right: &str, width: usize) -> String {
    let right_len = right.chars().count();
    let max_left = width.saturating_sub(right_len + 1).max(1);

    let mut left_part: String = left.to_string();
    if left.chars().count() > max_left {
        let keep = max_left.saturating_sub(1).max(1);
        left_part = left.chars().take(keep).collect();
        left_part.push('…');
    }

    let left_len = left_part.chars().count();
    let spaces = width.saturating_sub(left_len + right_len).max(1);
    format!("{}{}{}", left_part, " ".repeat(spaces), right)
}

/// ESC/POS command builder
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    codepage: Codepage,
}

impl EscPosBuilder {
    /// Create a builder for `width` characters per line
    ///
    /// Starts with `ESC @` (initialize).
    pub fn new(width: usize, codepage: Codepage) -> Self {
        let mut buf = Vec::with_capacity(4096);
        buf.extend_from_slice(&[0x1B, 0x40]);
        Self {
            buf,
            width,
            codepage,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn codepage(&self) -> Codepage {
        self.codepage
    }

    // === Setup ===

    /// Line spacing in dots (`ESC 3 n`)
    pub fn line_spacing(&mut self, dots: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x33, dots]);
        self
    }

    /// Select character table `n` (`ESC t n`) and switch the text encoder
    /// to match
    pub fn code_table(&mut self, n: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x74, n]);
        self.codepage = Codepage::from_escpos_table(n);
        self
    }

    // === Text Output ===

    /// Write text in the current code page
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend(self.codepage.encode(s));
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed `lines` lines (`ESC d n`)
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    // === Text Style ===

    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    // === Layout Helpers ===

    /// Full-width line of `-`
    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    /// Left and right text on one line, see [`lr_safe`]
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let line = lr_safe(left, right, self.width);
        self.line(&line)
    }

    // === Graphics ===

    /// Centered raster image (`GS v 0`, normal density)
    pub fn raster(&mut self, bitmap: &MonoBitmap) -> &mut Self {
        let x_bytes = bitmap.row_bytes();
        let height = bitmap.height() as usize;

        self.center();
        self.buf.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
        self.buf.push((x_bytes & 0xFF) as u8);
        self.buf.push((x_bytes >> 8) as u8);
        self.buf.push((height & 0xFF) as u8);
        self.buf.push((height >> 8) as u8);
        self.buf.extend_from_slice(bitmap.data());
        self.buf.push(b'\n');
        self.left();
        self
    }

    // === Paper Control ===

    /// Full cut (`GS V 0`)
    pub fn cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x00]);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Load an image file as a receipt logo
///
/// Scaled down to at most `max_width` dots, transparent pixels are paper.
#[instrument]
pub fn load_logo(path: &Path, max_width: u32) -> PrintResult<MonoBitmap> {
    use image::GenericImageView;

    let img = image::open(path)
        .map_err(|e| PrintError::Render(format!("{}: {}", path.display(), e)))?;
    let (w, h) = img.dimensions();
    debug!(width = w, height = h, "Logo image opened");

    let max_width = max_width.max(8);
    let img = if w > max_width {
        let new_h = ((h as f64) * (max_width as f64 / w as f64)).round().max(1.0) as u32;
        img.resize_exact(max_width, new_h, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    Ok(MonoBitmap::from_rgba(
        &img.to_rgba8(),
        crate::bitmap::DEFAULT_THRESHOLD,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_lr_safe_fits() {
        let line = lr_safe("ИТОГО:", "125.00", 20);
        assert_eq!(line, format!("ИТОГО:{}125.00", " ".repeat(8)));
        assert_eq!(line.chars().count(), 20);
    }

    #[test]
    fn test_lr_safe_truncates_left() {
        let line = lr_safe("Очень длинное название", "1.00", 12);
        // max_left = 12 - 4 - 1 = 7 -> 6 chars + ellipsis
        assert_eq!(line, "Очень … 1.00");
        assert_eq!(line.chars().count(), 12);
    }

    #[test]
    fn test_lr_safe_right_never_truncated() {
        let line = lr_safe("ИТОГО:", "1234567890.00", 10);
        assert!(line.ends_with(" 1234567890.00"));
        assert!(line.starts_with('И'));
    }

    #[test]
    fn test_builder_encodes_with_table() {
        let mut b = EscPosBuilder::new(32, Codepage::Cp1251);
        b.code_table(17).line("Ё");
        let data = b.build();
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        assert!(contains(&data, &[0x1B, 0x74, 17]));
        // CP866 Ё
        assert!(contains(&data, &[0xF0, b'\n']));
    }

    #[test]
    fn test_separator() {
        let mut b = EscPosBuilder::new(10, Codepage::Cp866);
        b.sep_single();
        assert!(contains(&b.build(), b"----------\n"));
    }

    #[test]
    fn test_raster_header() {
        let bmp = MonoBitmap::from_fn(20, 3, |x, _| x < 4);
        let mut b = EscPosBuilder::new(32, Codepage::Cp866);
        b.raster(&bmp);
        let data = b.build();
        let header = [0x1D, 0x76, 0x30, 0x00, 3, 0, 3, 0];
        let at = data
            .windows(header.len())
            .position(|w| w == header)
            .unwrap();
        assert_eq!(&data[at + 8..at + 11], &[0xF0, 0x00, 0x00]);
    }

    #[test]
    fn test_load_logo_scales_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        let img = image::RgbaImage::from_pixel(400, 100, image::Rgba([0, 0, 0, 255]));
        img.save(&path).unwrap();

        let bmp = load_logo(&path, 200).unwrap();
        assert_eq!(bmp.width(), 200);
        assert_eq!(bmp.height(), 50);
        assert!(bmp.is_black(10, 10));
    }

    #[test]
    fn test_load_logo_missing_file() {
        let err = load_logo(Path::new("/nonexistent/logo.png"), 384).unwrap_err();
        assert!(matches!(err, PrintError::Render(_)));
    }
}
