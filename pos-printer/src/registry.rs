//! USB printer registry
//!
//! Remembers which printers the operator has picked (most recent first,
//! capped at [`MAX_SAVED`]) and which one is active. The active key may
//! point at a device that is unplugged; resolution simply falls through.

use crate::error::{PrintError, PrintResult};
use crate::store::KeyValueStore;
use crate::usb::{UsbBackend, UsbDevice};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Saved printer list cap
pub const MAX_SAVED: usize = 50;

/// Serial sentinel for devices that do not report one
pub const NO_SERIAL: &str = "noserial";

/// Fallback display name
pub const DEFAULT_PRINTER_NAME: &str = "USB Printer";

const KEY_PRINTERS: &str = "escpos_printers";
const KEY_ACTIVE: &str = "escpos_printer_active";

/// Stable identity of a physical USB printer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrinterIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: String,
    pub display_name: String,
}

impl PrinterIdentity {
    pub fn new(
        vendor_id: u16,
        product_id: u16,
        serial: Option<&str>,
        display_name: Option<&str>,
    ) -> Self {
        Self {
            vendor_id,
            product_id,
            serial: safe_serial(serial.unwrap_or_default()),
            display_name: display_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_PRINTER_NAME)
                .to_string(),
        }
    }

    /// Registry key: `vvvv:pppp:serial`
    pub fn key(&self) -> String {
        format!(
            "{:04x}:{:04x}:{}",
            self.vendor_id, self.product_id, self.serial
        )
    }
}

/// Strip whitespace, cap at 64 chars, substitute [`NO_SERIAL`] when empty
pub fn safe_serial(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(64)
        .collect();
    if compact.is_empty() {
        NO_SERIAL.to_string()
    } else {
        compact
    }
}

/// `vvvv:pppp` keys written before serials were tracked
fn is_legacy_key(key: &str) -> bool {
    let mut parts = key.split(':');
    let is_hex4 = |p: Option<&str>| p.is_some_and(|p| p.len() == 4 && p.chars().all(|c| c.is_ascii_hexdigit()));
    is_hex4(parts.next()) && is_hex4(parts.next()) && parts.next().is_none()
}

pub(crate) fn normalize_key(key: &str) -> String {
    if is_legacy_key(key) {
        format!("{}:{}", key, NO_SERIAL)
    } else {
        key.to_string()
    }
}

/// Persisted entry (field names kept compatible with existing stores)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedPrinter {
    key: String,
    #[serde(default)]
    vid_hex: String,
    #[serde(default)]
    pid_hex: String,
    #[serde(default)]
    serial: String,
    #[serde(default)]
    name: String,
}

impl From<&PrinterIdentity> for SavedPrinter {
    fn from(id: &PrinterIdentity) -> Self {
        Self {
            key: id.key(),
            vid_hex: format!("{:04x}", id.vendor_id),
            pid_hex: format!("{:04x}", id.product_id),
            serial: id.serial.clone(),
            name: id.display_name.clone(),
        }
    }
}

impl SavedPrinter {
    fn normalized(mut self) -> Self {
        if is_legacy_key(&self.key) {
            self.key = normalize_key(&self.key);
            self.serial = NO_SERIAL.to_string();
        }
        self
    }

    fn identity(&self) -> Option<PrinterIdentity> {
        let mut parts = self.key.splitn(3, ':');
        let vid = u16::from_str_radix(parts.next()?, 16).ok()?;
        let pid = u16::from_str_radix(parts.next()?, 16).ok()?;
        let serial = parts.next()?;
        Some(PrinterIdentity {
            vendor_id: vid,
            product_id: pid,
            serial: serial.to_string(),
            display_name: if self.name.is_empty() {
                DEFAULT_PRINTER_NAME.to_string()
            } else {
                self.name.clone()
            },
        })
    }
}

/// Picks one device out of the candidates offered to the operator
///
/// Returning `None` means the chooser was dismissed.
pub trait DeviceChooser {
    fn choose(&self, candidates: &[UsbDevice]) -> Option<UsbDevice>;
}

impl<F> DeviceChooser for F
where
    F: Fn(&[UsbDevice]) -> Option<UsbDevice>,
{
    fn choose(&self, candidates: &[UsbDevice]) -> Option<UsbDevice> {
        self(candidates)
    }
}

/// Persisted printer identities plus the active pointer
pub struct DeviceRegistry {
    store: Arc<dyn KeyValueStore>,
    backend: Arc<dyn UsbBackend>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, backend: Arc<dyn UsbBackend>) -> Self {
        Self { store, backend }
    }

    pub fn backend(&self) -> &Arc<dyn UsbBackend> {
        &self.backend
    }

    fn read_saved(&self) -> Vec<SavedPrinter> {
        let Some(raw) = self.store.get(KEY_PRINTERS) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<SavedPrinter>>(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Unreadable saved printer list, ignoring");
                Vec::new()
            }
        }
    }

    fn write_saved(&self, list: &[SavedPrinter]) -> PrintResult<()> {
        let json = serde_json::to_string(list).map_err(|e| PrintError::Storage(e.to_string()))?;
        self.store.set(KEY_PRINTERS, &json)
    }

    /// Saved printers, most recent first
    ///
    /// Legacy two-part keys are upgraded in place and written back.
    pub fn saved(&self) -> Vec<PrinterIdentity> {
        let raw = self.read_saved();
        let normalized: Vec<SavedPrinter> =
            raw.iter().cloned().map(SavedPrinter::normalized).collect();
        if normalized != raw {
            debug!("Upgrading legacy printer keys");
            if let Err(e) = self.write_saved(&normalized) {
                warn!(error = %e, "Failed to persist upgraded printer keys");
            }
        }
        normalized.iter().filter_map(SavedPrinter::identity).collect()
    }

    pub fn active_key(&self) -> Option<String> {
        self.store
            .get(KEY_ACTIVE)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| normalize_key(&k))
    }

    pub fn set_active(&self, key: &str) -> PrintResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return self.store.remove(KEY_ACTIVE);
        }
        self.store.set(KEY_ACTIVE, key)
    }

    /// Upsert at the front of the saved list, evicting the oldest, and
    /// make the identity active
    pub fn remember(&self, identity: &PrinterIdentity) -> PrintResult<()> {
        let key = identity.key();
        let mut list: Vec<SavedPrinter> = self
            .read_saved()
            .into_iter()
            .map(SavedPrinter::normalized)
            .filter(|p| p.key != key)
            .collect();
        list.insert(0, SavedPrinter::from(identity));
        list.truncate(MAX_SAVED);
        self.write_saved(&list)?;
        self.set_active(&key)
    }

    /// Devices currently reachable; empty without USB support
    pub fn list_authorized(&self) -> Vec<UsbDevice> {
        match self.backend.devices() {
            Ok(devices) => devices,
            Err(PrintError::PlatformUnsupported(reason)) => {
                debug!(reason = %reason, "USB unsupported, no authorized printers");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "USB enumeration failed");
                Vec::new()
            }
        }
    }

    /// Offer the printer-class devices to `chooser`, then remember and
    /// activate the selection
    pub fn request_new_device(&self, chooser: &dyn DeviceChooser) -> PrintResult<UsbDevice> {
        let candidates = self.backend.devices()?;
        let device = chooser
            .choose(&candidates)
            .ok_or(PrintError::NoDeviceSelected)?;
        self.remember(&device.identity)?;
        info!(key = %device.identity.key(), name = %device.identity.display_name, "Printer authorized");
        Ok(device)
    }

    /// Pick the device a session should open: active key, then saved order,
    /// then the first reachable device
    pub fn resolve(&self, devices: &[UsbDevice]) -> Option<UsbDevice> {
        if let Some(active) = self.active_key()
            && let Some(d) = devices.iter().find(|d| d.identity.key() == active)
        {
            return Some(d.clone());
        }
        for saved in self.saved() {
            let key = saved.key();
            if let Some(d) = devices.iter().find(|d| d.identity.key() == key) {
                return Some(d.clone());
            }
        }
        devices.first().cloned()
    }
}
