//! Bitmap labels for firmware whose `TEXT` positioning can't be trusted
//!
//! The label is drawn pixel-exact on the host and sent as one TSPL
//! `BITMAP`, so printer font metrics no longer matter.

use super::glyphs::{GlyphRenderer, fill_rect};
use super::layout::{BOTTOM_GAP, TextPlacement, compute_layout};
use super::{LabelSpec, tspl_header, wrap_title};
use crate::barcode::ean13_modules;
use crate::bitmap::{DEFAULT_THRESHOLD, MonoBitmap};
use crate::error::PrintResult;
use image::{GrayImage, Luma, imageops};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    /// Luminance below this prints
    pub threshold: u8,
    /// Send bit 0 for black dots
    pub invert: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            invert: false,
        }
    }
}

/// Draw the label in its physical orientation (white = 255)
pub fn render_label(spec: &LabelSpec, glyphs: &dyn GlyphRenderer) -> PrintResult<GrayImage> {
    let title = wrap_title(&spec.title, spec.text_scale);
    let layout = compute_layout(spec, &title)?;
    let mut canvas = GrayImage::from_pixel(layout.frame_width, layout.frame_height, Luma([255]));

    for bar in &layout.border {
        fill_rect(&mut canvas, bar.x, bar.y, bar.w, bar.h);
    }

    let line_h = layout.metrics.char_height;
    let draw_centered = |canvas: &mut GrayImage, text: &TextPlacement| {
        let w = glyphs.measure(&text.text, line_h);
        let x = layout.safe.x + layout.safe.w.saturating_sub(w) / 2;
        glyphs.draw(canvas, &text.text, x, text.rect.y, line_h);
    };
    for text in layout.title.iter().chain(layout.price.iter()) {
        draw_centered(&mut canvas, text);
    }

    let bc = &layout.barcode;
    for (i, bar) in ean13_modules(&bc.code)?.into_iter().enumerate() {
        if bar {
            fill_rect(
                &mut canvas,
                bc.rect.x + i as u32 * bc.narrow,
                bc.rect.y,
                bc.narrow,
                bc.rect.h,
            );
        }
    }
    let band = bc.text_band();
    let digits_h = BOTTOM_GAP - 2;
    let digits_w = glyphs.measure(&bc.code, digits_h);
    let center = band.x + band.w / 2;
    glyphs.draw(
        &mut canvas,
        &bc.code,
        center.saturating_sub(digits_w / 2),
        band.y + 1,
        digits_h,
    );

    Ok(if layout.rotated {
        imageops::rotate90(&canvas)
    } else {
        canvas
    })
}

/// Raster label job: TSPL setup, one `BITMAP`, `PRINT 1`
pub fn build_raster_label(
    spec: &LabelSpec,
    glyphs: &dyn GlyphRenderer,
    options: &RasterOptions,
) -> PrintResult<Vec<u8>> {
    let image = render_label(spec, glyphs)?;
    let mut bitmap = MonoBitmap::from_luma(&image, options.threshold);
    if options.invert {
        bitmap = bitmap.inverted();
    }

    let mut out = Vec::with_capacity(bitmap.data().len() + 256);
    for line in tspl_header(spec) {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(
        format!(
            "BITMAP 0,0,{},{},0,",
            bitmap.row_bytes(),
            bitmap.height()
        )
        .as_bytes(),
    );
    out.extend_from_slice(bitmap.data());
    out.extend_from_slice(b"\r\nPRINT 1\r\n\r\n");

    debug!(
        width = bitmap.width(),
        height = bitmap.height(),
        invert = options.invert,
        bytes = out.len(),
        "Raster label built"
    );
    Ok(out)
}
