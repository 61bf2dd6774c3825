//! Product labels (title, price, EAN-13) for TSPL label printers
//!
//! Two backends share one layout:
//! - [`tspl::build_label`] emits vector `TEXT` / `BARCODE` commands
//! - [`raster::build_raster_label`] draws the label and sends a `BITMAP`
//!
//! All geometry is in printer dots (203 dpi, 8 dots/mm).

pub mod glyphs;
pub mod layout;
pub mod raster;
pub mod tspl;

pub use glyphs::{BlockGlyphs, GlyphRenderer};
#[cfg(feature = "truetype")]
pub use glyphs::TrueTypeGlyphs;
pub use layout::{LabelLayout, Rect, TextPlacement, compute_layout};
pub use raster::{RasterOptions, build_raster_label};
pub use tspl::build_label;

use crate::codepage::Codepage;
use serde::{Deserialize, Serialize};

pub const DOTS_PER_MM: u32 = 8;

/// Title used when the caller sends none
pub const DEFAULT_TITLE: &str = "ТОВАР";

/// Base title budget in characters at text scale 1
const WRAP_CHARS: u32 = 20;

pub fn mm_to_dots(mm: u32) -> u32 {
    mm * DOTS_PER_MM
}

/// Character cell of a printer-resident font at scale 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontMetrics {
    pub char_width: u32,
    pub char_height: u32,
}

impl FontMetrics {
    pub const fn new(char_width: u32, char_height: u32) -> Self {
        Self {
            char_width,
            char_height,
        }
    }

    /// Nominal cell of TSPL fonts `"1"`..`"5"` (unknown ids use `"3"`)
    ///
    /// Firmware clones differ by a few dots; override through
    /// [`LabelSpec::font_metrics`] when centering is off on a real printout.
    pub fn for_font(font_id: &str) -> Self {
        match font_id {
            "1" => Self::new(8, 12),
            "2" => Self::new(12, 20),
            "3" => Self::new(16, 24),
            "4" => Self::new(24, 32),
            "5" => Self::new(32, 48),
            _ => Self::new(16, 24),
        }
    }
}

/// Everything needed to render one product label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabelSpec {
    pub title: String,
    /// 12 or 13 digits, separators allowed
    pub barcode: String,
    pub price: Option<String>,
    pub width_mm: u32,
    pub height_mm: u32,
    pub gap_mm: u32,
    /// Lay the content out along the label's long edge
    pub rotated: bool,
    pub font_id: String,
    pub text_scale: u32,
    pub line_gap: u32,
    pub gap_after_title: u32,
    pub gap_after_price: u32,
    /// Lift the barcode by this many dots
    pub barcode_raise: u32,
    pub barcode_height: u32,
    /// Narrow bar (module) width
    pub barcode_bar_width: u32,
    pub speed: u32,
    pub density: u32,
    pub font_metrics: Option<FontMetrics>,
}

/// Xprinter XP-365B with 25x15 mm stock
impl Default for LabelSpec {
    fn default() -> Self {
        Self {
            title: String::new(),
            barcode: String::new(),
            price: None,
            width_mm: 25,
            height_mm: 15,
            gap_mm: 7,
            rotated: false,
            font_id: "3".to_string(),
            text_scale: 1,
            line_gap: 2,
            gap_after_title: 2,
            gap_after_price: 2,
            barcode_raise: 0,
            barcode_height: 32,
            barcode_bar_width: 1,
            speed: 4,
            density: 8,
            font_metrics: None,
        }
    }
}

impl LabelSpec {
    pub fn scale(&self) -> u32 {
        self.text_scale.max(1)
    }

    /// Cell metrics at the label's text scale
    pub fn metrics(&self) -> FontMetrics {
        let base = self
            .font_metrics
            .unwrap_or_else(|| FontMetrics::for_font(&self.font_id));
        FontMetrics::new(
            base.char_width.max(1) * self.scale(),
            base.char_height.max(1) * self.scale(),
        )
    }

    /// Physical label size in dots
    pub fn physical_size(&self) -> (u32, u32) {
        (mm_to_dots(self.width_mm), mm_to_dots(self.height_mm))
    }

    /// Size of the frame content is laid out in (swapped when rotated)
    pub fn frame_size(&self) -> (u32, u32) {
        let (w, h) = self.physical_size();
        if self.rotated { (h, w) } else { (w, h) }
    }

    fn price_text(&self) -> Option<&str> {
        self.price.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Word-wrap a title into at most two lines of `max(4, 20 / scale)`
/// characters; overlong words are cut
pub fn wrap_title(title: &str, text_scale: u32) -> Vec<String> {
    let budget = (WRAP_CHARS / text_scale.max(1)).max(4) as usize;
    let title = title.trim();
    let title = if title.is_empty() { DEFAULT_TITLE } else { title };

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in title.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if candidate.chars().count() <= budget {
            current = candidate;
        } else {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
        .into_iter()
        .take(2)
        .map(|l| l.chars().take(budget).collect())
        .collect()
}

/// `SIZE` .. `CODEPAGE` preamble shared by both backends
pub(crate) fn tspl_header(spec: &LabelSpec) -> Vec<String> {
    vec![
        format!("SIZE {} mm,{} mm", spec.width_mm, spec.height_mm),
        format!("GAP {} mm,0 mm", spec.gap_mm),
        format!("SPEED {}", spec.speed),
        format!("DENSITY {}", spec.density),
        "DIRECTION 1".to_string(),
        "REFERENCE 0,0".to_string(),
        "OFFSET 0".to_string(),
        "CLS".to_string(),
        format!("CODEPAGE {}", Codepage::Cp866.tspl_name()),
    ]
}
