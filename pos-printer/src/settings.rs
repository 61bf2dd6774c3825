//! Printer settings persisted in the key-value store
//!
//! Every key is optional; a missing or unparsable value falls back to its
//! default (unparsable values are logged).

use crate::error::PrintResult;
use crate::label::RasterOptions;
use crate::network::NetworkConfig;
use crate::receipt::{ReceiptFont, ReceiptLayout};
use crate::store::KeyValueStore;
use crate::usb::WritePlan;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const KEY_DOTS_PER_LINE: &str = "escpos_dpl";
pub const KEY_FONT: &str = "escpos_font";
pub const KEY_CHARS_PER_LINE: &str = "escpos_cpl";
pub const KEY_LINE_SPACING: &str = "escpos_line";
pub const KEY_CODE_TABLE: &str = "escpos_cp";
pub const KEY_BRIDGE_URL: &str = "cafe_printer_bridge_url";
pub const KEY_RAW_FALLBACK: &str = "printer_raw_fallback";
pub const KEY_SECURE_ORIGIN: &str = "printer_secure_origin";
pub const KEY_LABEL_MODE: &str = "label_mode";
pub const KEY_LABEL_INVERT: &str = "label_invert";
pub const KEY_LABEL_FONT_PATH: &str = "label_font_path";
pub const KEY_USB_CHUNK_SIZE: &str = "usb_chunk_size";
pub const KEY_USB_CHUNK_DELAY_MS: &str = "usb_chunk_delay_ms";

/// Which label builder to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
    /// TSPL `TEXT` / `BARCODE`
    #[default]
    Vector,
    /// Host-rendered `BITMAP`
    Raster,
}

impl LabelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelMode::Vector => "vector",
            LabelMode::Raster => "raster",
        }
    }
}

impl FromStr for LabelMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "tspl" => Ok(LabelMode::Vector),
            "raster" | "bitmap" => Ok(LabelMode::Raster),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrinterSettings {
    pub receipt: ReceiptLayout,
    pub network: NetworkConfig,
    pub label_mode: LabelMode,
    pub label_invert: bool,
    /// TTF/OTF used for raster labels; built-in block glyphs when unset
    pub label_font_path: Option<PathBuf>,
    /// USB chunking for label jobs
    pub label_plan: WritePlan,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            receipt: ReceiptLayout::default(),
            network: NetworkConfig::default(),
            label_mode: LabelMode::default(),
            label_invert: false,
            label_font_path: None,
            label_plan: WritePlan::LABEL,
        }
    }
}

fn read<T: FromStr>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = raw, "Ignoring unparsable printer setting");
            None
        }
    }
}

fn read_flag(store: &dyn KeyValueStore, key: &str) -> Option<bool> {
    let raw = store.get(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        "" => None,
        other => {
            warn!(key, value = other, "Ignoring unparsable printer flag");
            None
        }
    }
}

impl PrinterSettings {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let defaults = Self::default();

        let font = store
            .get(KEY_FONT)
            .and_then(|f| ReceiptFont::parse(&f))
            .unwrap_or(defaults.receipt.font);
        let receipt = ReceiptLayout {
            dots_per_line: read::<u32>(store, KEY_DOTS_PER_LINE)
                .filter(|d| *d > 0)
                .unwrap_or(defaults.receipt.dots_per_line),
            font,
            chars_per_line: read::<usize>(store, KEY_CHARS_PER_LINE).filter(|c| *c > 0),
            line_spacing: read::<u8>(store, KEY_LINE_SPACING),
            code_table: read(store, KEY_CODE_TABLE).unwrap_or(defaults.receipt.code_table),
        };

        let network = NetworkConfig {
            bridge_url: store
                .get(KEY_BRIDGE_URL)
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| defaults.network.bridge_url.clone()),
            raw_fallback: read_flag(store, KEY_RAW_FALLBACK).unwrap_or(defaults.network.raw_fallback),
            secure_origin: read_flag(store, KEY_SECURE_ORIGIN)
                .unwrap_or(defaults.network.secure_origin),
            ..defaults.network
        };

        let label_plan = WritePlan {
            chunk_size: read::<usize>(store, KEY_USB_CHUNK_SIZE)
                .filter(|s| *s > 0)
                .unwrap_or(defaults.label_plan.chunk_size),
            chunk_delay: read::<u64>(store, KEY_USB_CHUNK_DELAY_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.label_plan.chunk_delay),
        };

        Self {
            receipt,
            network,
            label_mode: read(store, KEY_LABEL_MODE).unwrap_or(defaults.label_mode),
            label_invert: read_flag(store, KEY_LABEL_INVERT).unwrap_or(defaults.label_invert),
            label_font_path: store
                .get(KEY_LABEL_FONT_PATH)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            label_plan,
        }
    }

    /// Write every key back; unset optionals are removed
    pub fn save(&self, store: &dyn KeyValueStore) -> PrintResult<()> {
        let r = &self.receipt;
        store.set(KEY_DOTS_PER_LINE, &r.dots_per_line.to_string())?;
        store.set(
            KEY_FONT,
            match r.font {
                ReceiptFont::A => "A",
                ReceiptFont::B => "B",
            },
        )?;
        match r.chars_per_line {
            Some(c) => store.set(KEY_CHARS_PER_LINE, &c.to_string())?,
            None => store.remove(KEY_CHARS_PER_LINE)?,
        }
        match r.line_spacing {
            Some(l) => store.set(KEY_LINE_SPACING, &l.to_string())?,
            None => store.remove(KEY_LINE_SPACING)?,
        }
        store.set(KEY_CODE_TABLE, &r.code_table.to_string())?;

        store.set(KEY_BRIDGE_URL, &self.network.bridge_url)?;
        store.set(KEY_RAW_FALLBACK, &self.network.raw_fallback.to_string())?;
        store.set(KEY_SECURE_ORIGIN, &self.network.secure_origin.to_string())?;

        store.set(KEY_LABEL_MODE, self.label_mode.as_str())?;
        store.set(KEY_LABEL_INVERT, &self.label_invert.to_string())?;
        match &self.label_font_path {
            Some(p) => store.set(KEY_LABEL_FONT_PATH, &p.to_string_lossy())?,
            None => store.remove(KEY_LABEL_FONT_PATH)?,
        }
        store.set(KEY_USB_CHUNK_SIZE, &self.label_plan.chunk_size.to_string())?;
        store.set(
            KEY_USB_CHUNK_DELAY_MS,
            &self.label_plan.chunk_delay.as_millis().to_string(),
        )?;
        Ok(())
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            invert: self.label_invert,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DEFAULT_BRIDGE_URL;
    use crate::store::MemoryStore;

    #[test]
    fn test_defaults_from_empty_store() {
        let s = PrinterSettings::load(&MemoryStore::new());
        assert_eq!(s.receipt, ReceiptLayout::default());
        assert_eq!(s.receipt.width(), 42);
        assert_eq!(s.network.bridge_url, DEFAULT_BRIDGE_URL);
        assert!(!s.network.raw_fallback);
        assert!(!s.network.secure_origin);
        assert_eq!(s.label_mode, LabelMode::Vector);
        assert_eq!(s.label_plan, WritePlan::LABEL);
        assert!(s.label_font_path.is_none());
    }

    #[test]
    fn test_load_values() {
        let store = MemoryStore::new();
        store.set(KEY_DOTS_PER_LINE, "384").unwrap();
        store.set(KEY_FONT, "a").unwrap();
        store.set(KEY_CODE_TABLE, "17").unwrap();
        store.set(KEY_RAW_FALLBACK, "1").unwrap();
        store.set(KEY_LABEL_MODE, "Raster").unwrap();
        store.set(KEY_LABEL_INVERT, "true").unwrap();
        store.set(KEY_USB_CHUNK_SIZE, "2048").unwrap();
        store.set(KEY_USB_CHUNK_DELAY_MS, "10").unwrap();

        let s = PrinterSettings::load(&store);
        assert_eq!(s.receipt.font, ReceiptFont::A);
        // 384 / 12
        assert_eq!(s.receipt.width(), 32);
        assert_eq!(s.receipt.code_table, 17);
        assert!(s.network.raw_fallback);
        assert_eq!(s.label_mode, LabelMode::Raster);
        assert!(s.raster_options().invert);
        assert_eq!(s.label_plan.chunk_size, 2048);
        assert_eq!(s.label_plan.chunk_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_garbage_falls_back() {
        let store = MemoryStore::new();
        store.set(KEY_DOTS_PER_LINE, "wide").unwrap();
        store.set(KEY_CHARS_PER_LINE, "0").unwrap();
        store.set(KEY_CODE_TABLE, "999").unwrap();
        store.set(KEY_RAW_FALLBACK, "maybe").unwrap();
        store.set(KEY_LABEL_MODE, "hologram").unwrap();

        let s = PrinterSettings::load(&store);
        assert_eq!(s.receipt, ReceiptLayout::default());
        assert!(!s.network.raw_fallback);
        assert_eq!(s.label_mode, LabelMode::Vector);
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut s = PrinterSettings::default();
        s.receipt.chars_per_line = Some(32);
        s.network.bridge_url = "http://10.0.0.2:5179/print".to_string();
        s.label_mode = LabelMode::Raster;
        s.label_font_path = Some(PathBuf::from("/usr/share/fonts/dejavu.ttf"));
        s.save(&store).unwrap();

        let loaded = PrinterSettings::load(&store);
        assert_eq!(loaded.receipt, s.receipt);
        assert_eq!(loaded.network.bridge_url, s.network.bridge_url);
        assert_eq!(loaded.label_mode, LabelMode::Raster);
        assert_eq!(loaded.label_font_path, s.label_font_path);

        s.label_font_path = None;
        s.save(&store).unwrap();
        assert_eq!(store.get(KEY_LABEL_FONT_PATH), None);
    }
}
