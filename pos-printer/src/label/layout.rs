//! Label geometry shared by the vector and raster builders
//!
//! Everything is computed in the *layout frame*: the label as the reader
//! sees it. For rotated labels the frame is the physical label turned 90°
//! and [`Rect::to_physical`] / [`TextPlacement::anchor`] map back.

use super::{FontMetrics, LabelSpec};
use crate::barcode::{estimated_modules, normalize_ean13};
use crate::error::PrintResult;

/// Border distance from the label edge
pub const BORDER_MARGIN: u32 = 4;
pub const BORDER_THICKNESS: u32 = 2;
/// Space between the border and content
pub const SAFE_PADDING: u32 = 6;
pub const DASH_LENGTH: u32 = 8;
pub const DASH_GAP: u32 = 6;
/// Band under the bars for human-readable digits
pub const BOTTOM_GAP: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    /// Map a frame rect onto the physical label (`phys_w` dots wide)
    pub fn to_physical(self, rotated: bool, phys_w: u32) -> Rect {
        if rotated {
            Rect::new(
                phys_w.saturating_sub(self.y + self.h),
                self.x,
                self.h,
                self.w,
            )
        } else {
            self
        }
    }
}

/// Reference point of a rotated (90° clockwise) TSPL element whose
/// unrotated top-left corner sits at frame `(x, y)`
fn anchor_point(x: u32, y: u32, rotated: bool, phys_w: u32) -> (u32, u32) {
    if rotated {
        (phys_w.saturating_sub(y), x)
    } else {
        (x, y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPlacement {
    pub text: String,
    pub rect: Rect,
}

impl TextPlacement {
    pub fn anchor(&self, rotated: bool, phys_w: u32) -> (u32, u32) {
        anchor_point(self.rect.x, self.rect.y, rotated, phys_w)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodePlacement {
    /// Normalized 13-digit code
    pub code: String,
    /// Bars only; the human-readable band follows below
    pub rect: Rect,
    pub narrow: u32,
    pub modules: u32,
}

impl BarcodePlacement {
    pub fn anchor(&self, rotated: bool, phys_w: u32) -> (u32, u32) {
        anchor_point(self.rect.x, self.rect.y, rotated, phys_w)
    }

    /// Area of the human-readable digits
    pub fn text_band(&self) -> Rect {
        Rect::new(self.rect.x, self.rect.bottom(), self.rect.w, BOTTOM_GAP)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelLayout {
    pub frame_width: u32,
    pub frame_height: u32,
    pub physical_width: u32,
    pub physical_height: u32,
    pub rotated: bool,
    pub metrics: FontMetrics,
    pub safe: Rect,
    pub title: Vec<TextPlacement>,
    pub price: Option<TextPlacement>,
    pub barcode: BarcodePlacement,
    /// Dashed border segments, frame coordinates
    pub border: Vec<Rect>,
}

/// Position title lines, price and barcode inside the safe area
///
/// The barcode is placed first and clamped to the bottom of the safe area;
/// the price and title are then pushed up to stay above it. A price that
/// cannot stay inside the safe area is dropped, as are title lines with no
/// room left above the price.
pub fn compute_layout(spec: &LabelSpec, title_lines: &[String]) -> PrintResult<LabelLayout> {
    let code = normalize_ean13(&spec.barcode)?;
    let (frame_w, frame_h) = spec.frame_size();
    let (phys_w, phys_h) = spec.physical_size();
    let metrics = spec.metrics();
    let line_h = metrics.char_height;

    let inset = BORDER_MARGIN + BORDER_THICKNESS + SAFE_PADDING;
    let safe = Rect::new(
        inset,
        inset,
        frame_w.saturating_sub(inset * 2).max(1),
        frame_h.saturating_sub(inset * 2).max(1),
    );

    let lines = title_lines.len() as u32;
    let title_h = if lines == 0 {
        0
    } else {
        lines * line_h + (lines - 1) * spec.line_gap
    };
    let title_block = if lines == 0 { 0 } else { title_h + spec.gap_after_title };
    let price = spec.price_text();
    let price_block = if price.is_some() { line_h + spec.gap_after_price } else { 0 };

    let barcode_h = spec
        .barcode_height
        .max(1)
        .min(safe.h.saturating_sub(BOTTOM_GAP).max(1));
    let content_h = title_block + price_block + barcode_h + BOTTOM_GAP;
    let top = safe.y + safe.h.saturating_sub(content_h) / 2;

    // barcode first
    let max_barcode_y = safe.bottom().saturating_sub(barcode_h + BOTTOM_GAP).max(safe.y);
    let barcode_y = (top + title_block + price_block)
        .saturating_sub(spec.barcode_raise)
        .max(safe.y)
        .min(max_barcode_y);

    let (narrow, modules) = barcode_width(&code, spec.barcode_bar_width, safe.w);
    let barcode_w = modules * narrow;
    let barcode = BarcodePlacement {
        rect: Rect::new(centered(safe, barcode_w), barcode_y, barcode_w, barcode_h),
        code,
        narrow,
        modules,
    };

    let place = |text: &str, y: u32| {
        let w = text.chars().count() as u32 * metrics.char_width;
        TextPlacement {
            text: text.to_string(),
            rect: Rect::new(centered(safe, w), y, w, line_h),
        }
    };

    // dropped when it cannot sit between the safe top and the bars
    let price = price.and_then(|p| {
        let limit = barcode_y.checked_sub(line_h + spec.gap_after_price.max(1))?;
        (limit >= safe.y).then(|| place(p, (top + title_block).min(limit)))
    });

    let anchor = price.as_ref().map_or(barcode_y, |p| p.rect.y);
    let block = |n: u32| n * line_h + n.saturating_sub(1) * spec.line_gap + spec.gap_after_title;
    let mut fit = lines;
    while fit > 0 && block(fit) > anchor {
        fit -= 1;
    }
    let title_top = top.min(anchor.saturating_sub(block(fit)));
    let title = title_lines
        .iter()
        .take(fit as usize)
        .enumerate()
        .map(|(i, line)| place(line, title_top + i as u32 * (line_h + spec.line_gap)))
        .collect();

    Ok(LabelLayout {
        frame_width: frame_w,
        frame_height: frame_h,
        physical_width: phys_w,
        physical_height: phys_h,
        rotated: spec.rotated,
        metrics,
        safe,
        title,
        price,
        barcode,
        border: dashed_border(frame_w, frame_h),
    })
}

fn centered(safe: Rect, width: u32) -> u32 {
    safe.x + safe.w.saturating_sub(width) / 2
}

/// Narrow bar width that fits the safe width, and the module count
fn barcode_width(code: &str, requested: u32, available: u32) -> (u32, u32) {
    let modules = estimated_modules(code);
    let mut narrow = requested.max(1);
    while narrow > 1 && modules * narrow > available {
        narrow -= 1;
    }
    (narrow, modules)
}

/// Short bars along every edge of a `width` x `height` frame
pub fn dashed_border(width: u32, height: u32) -> Vec<Rect> {
    let mut bars = Vec::new();
    if width <= BORDER_MARGIN * 2 + BORDER_THICKNESS || height <= BORDER_MARGIN * 2 + BORDER_THICKNESS
    {
        return bars;
    }
    let right = width - BORDER_MARGIN - BORDER_THICKNESS;
    let bottom = height - BORDER_MARGIN - BORDER_THICKNESS;

    let mut x = BORDER_MARGIN;
    while x < width - BORDER_MARGIN {
        let len = DASH_LENGTH.min(width - BORDER_MARGIN - x);
        bars.push(Rect::new(x, BORDER_MARGIN, len, BORDER_THICKNESS));
        bars.push(Rect::new(x, bottom, len, BORDER_THICKNESS));
        x += DASH_LENGTH + DASH_GAP;
    }
    let mut y = BORDER_MARGIN;
    while y < height - BORDER_MARGIN {
        let len = DASH_LENGTH.min(height - BORDER_MARGIN - y);
        bars.push(Rect::new(BORDER_MARGIN, y, BORDER_THICKNESS, len));
        bars.push(Rect::new(right, y, BORDER_THICKNESS, len));
        y += DASH_LENGTH + DASH_GAP;
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrintError;
    use crate::label::wrap_title;

    fn spec(title: &str, price: Option<&str>) -> LabelSpec {
        LabelSpec {
            title: title.to_string(),
            barcode: "4006381333931".to_string(),
            price: price.map(str::to_string),
            ..Default::default()
        }
    }

    fn layout(spec: &LabelSpec) -> LabelLayout {
        compute_layout(spec, &wrap_title(&spec.title, spec.text_scale)).unwrap()
    }

    #[test]
    fn test_safe_area() {
        let l = layout(&spec("Хлеб", None));
        assert_eq!((l.frame_width, l.frame_height), (200, 120));
        assert_eq!(l.safe, Rect::new(12, 12, 176, 96));
    }

    #[test]
    fn test_fitting_content_is_centered() {
        let l = layout(&spec("Хлеб", None));
        // 24 + 2 + 32 + 14 = 72 of 96 -> 12 above and below
        assert_eq!(l.title[0].rect.y, 24);
        assert_eq!(l.barcode.rect.y, 50);
        // 4 chars * 16 dots centred in 176
        assert_eq!(l.title[0].rect.x, 12 + (176 - 64) / 2);
        assert_eq!(l.barcode.rect.x, 12 + (176 - 95) / 2);
    }

    #[test]
    fn test_overflow_clamps_barcode_and_price() {
        let s = LabelSpec {
            barcode_height: 40,
            ..spec("Молоко Простоквашино 3.2% 930 мл", Some("89.90 ₽"))
        };
        let l = layout(&s);
        let bc = &l.barcode.rect;
        assert!(bc.y + bc.h + BOTTOM_GAP <= l.safe.y + l.safe.h);

        let price = l.price.as_ref().unwrap();
        assert!(price.rect.y < bc.y);
        assert!(price.rect.bottom() < bc.y);
        // only the first title line fits above the price
        assert_eq!(l.title.len(), 1);
        assert_eq!(l.title[0].text, "Молоко Простоквашино");
        for line in &l.title {
            assert!(line.rect.bottom() <= price.rect.y);
        }
    }

    #[test]
    fn test_barcode_height_shrinks_to_safe_area() {
        let s = LabelSpec {
            barcode_height: 500,
            ..spec("A", None)
        };
        let l = layout(&s);
        assert_eq!(l.barcode.rect.h, 96 - BOTTOM_GAP);
        assert_eq!(l.barcode.rect.y, l.safe.y);
    }

    #[test]
    fn test_price_never_leaves_safe_area() {
        // bars fill the safe area: no room for a price above them
        let l = layout(&LabelSpec {
            barcode_height: 500,
            ..spec("A", Some("10.00"))
        });
        assert!(l.price.is_none());

        // just enough room: price pinned to the safe top
        let l = layout(&LabelSpec {
            barcode_height: 96 - BOTTOM_GAP - 26,
            ..spec("A", Some("10.00"))
        });
        let price = l.price.as_ref().unwrap();
        assert_eq!(l.barcode.rect.y, 38);
        assert_eq!(price.rect.y, l.safe.y);
        assert!(price.rect.bottom() < l.barcode.rect.y);

        for h in 1..=96 {
            let l = layout(&LabelSpec {
                barcode_height: h,
                ..spec("Молоко Простоквашино 3.2% 930 мл", Some("89.90 ₽"))
            });
            if let Some(price) = &l.price {
                assert!(price.rect.y >= l.safe.y, "height {h}");
                assert!(price.rect.bottom() < l.barcode.rect.y, "height {h}");
            }
        }
    }

    #[test]
    fn test_barcode_raise() {
        let base = layout(&spec("Хлеб", None)).barcode.rect.y;
        let raised = layout(&LabelSpec {
            barcode_raise: 6,
            ..spec("Хлеб", None)
        })
        .barcode
        .rect
        .y;
        assert_eq!(raised, base - 6);
    }

    #[test]
    fn test_narrow_bar_reduced_to_fit() {
        let l = layout(&LabelSpec {
            barcode_bar_width: 3,
            ..spec("A", None)
        });
        // 95 * 2 > 176, 95 * 1 fits
        assert_eq!(l.barcode.narrow, 1);
        assert_eq!(l.barcode.rect.w, 95);
    }

    #[test]
    fn test_invalid_barcode() {
        let s = LabelSpec {
            barcode: "123".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            compute_layout(&s, &[]),
            Err(PrintError::InvalidBarcode(_))
        ));
    }

    #[test]
    fn test_rotation_mapping() {
        let r = Rect::new(10, 20, 30, 5);
        assert_eq!(r.to_physical(false, 200), r);
        assert_eq!(r.to_physical(true, 200), Rect::new(175, 10, 5, 30));

        let t = TextPlacement {
            text: "x".into(),
            rect: r,
        };
        assert_eq!(t.anchor(true, 200), (180, 10));
    }

    #[test]
    fn test_rotated_frame() {
        let l = layout(&LabelSpec {
            rotated: true,
            ..spec("Хлеб", None)
        });
        assert_eq!((l.frame_width, l.frame_height), (120, 200));
        assert_eq!((l.physical_width, l.physical_height), (200, 120));
        assert_eq!(l.safe.w, 96);
        for bar in &l.border {
            let p = bar.to_physical(true, l.physical_width);
            assert!(p.right() <= 200 && p.bottom() <= 120);
        }
    }

    #[test]
    fn test_dashed_border() {
        let bars = dashed_border(200, 120);
        assert!(!bars.is_empty());
        assert!(bars.contains(&Rect::new(4, 4, 8, 2)));
        assert!(bars.contains(&Rect::new(4, 114, 8, 2)));
        assert!(bars.contains(&Rect::new(194, 4, 2, 8)));
        for b in &bars {
            assert!(b.right() <= 196 && b.bottom() <= 116);
        }
        assert!(dashed_border(8, 8).is_empty());
    }
}
