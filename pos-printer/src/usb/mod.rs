//! USB transport
//!
//! The platform is reached through two traits:
//! - [`UsbBackend`] enumerates printer-class devices and opens them
//! - [`UsbHandle`] is one opened device (configuration, interfaces, bulk OUT)
//!
//! [`UsbSession`] owns the single open handle and serializes writes.
//! Backend calls block and are run on the tokio blocking pool.

mod session;

#[cfg(feature = "usb")]
mod rusb_backend;

#[cfg(test)]
pub(crate) mod fake;

pub use session::{UsbSession, WritePlan};

#[cfg(feature = "usb")]
pub use rusb_backend::{HotplugWatcher, RusbBackend};

use crate::error::{PrintError, PrintResult};
use crate::registry::PrinterIdentity;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Hotplug queue depth
#[cfg(feature = "usb")]
const EVENT_BUFFER: usize = 32;

/// USB class codes offered to the device chooser: printer, vendor-specific
///
/// Many thermal printers report vendor-specific instead of printer class.
pub const PRINTER_CLASS_FILTER: [u8; 2] = [0x07, 0xFF];

/// Hint attached to [`PrintError::AccessDenied`]
pub const ACCESS_DENIED_HINT: &str = "close other printing software and bind a generic USB driver \
     (WinUSB via Zadig on Windows, a udev rule on Linux)";

/// Where a device is attached right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLocation {
    pub bus: u8,
    pub address: u8,
}

/// An enumerated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub identity: PrinterIdentity,
    pub location: DeviceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: u8,
    pub direction: Direction,
    pub kind: TransferKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltSetting {
    pub setting: u8,
    pub endpoints: Vec<EndpointInfo>,
}

impl AltSetting {
    pub fn bulk_out(&self) -> Option<&EndpointInfo> {
        self.endpoints
            .iter()
            .find(|e| e.direction == Direction::Out && e.kind == TransferKind::Bulk)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alternates: Vec<AltSetting>,
}

/// Platform device access
pub trait UsbBackend: Send + Sync {
    /// Printer-class devices ([`PRINTER_CLASS_FILTER`]) currently reachable
    fn devices(&self) -> PrintResult<Vec<UsbDevice>>;

    /// Open a device; permission failures map to [`PrintError::AccessDenied`]
    fn open(&self, device: &UsbDevice) -> PrintResult<Box<dyn UsbHandle>>;
}

/// One opened device. Dropping it closes the device.
pub trait UsbHandle: Send {
    /// `bConfigurationValue` of the active configuration, if any
    fn active_configuration(&self) -> Option<u8>;

    /// Configuration values the device advertises
    fn configuration_values(&self) -> Vec<u8>;

    fn select_configuration(&mut self, value: u8) -> PrintResult<()>;

    /// Interfaces of the active configuration
    fn interfaces(&self) -> PrintResult<Vec<InterfaceInfo>>;

    fn claim_interface(&mut self, number: u8) -> PrintResult<()>;

    fn release_interface(&mut self, number: u8) -> PrintResult<()>;

    fn select_alternate(&mut self, interface: u8, setting: u8) -> PrintResult<()>;

    /// Transfer `data` completely to a bulk OUT endpoint
    fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()>;
}

/// Device arrival/departure notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    Connected(UsbDevice),
    Disconnected(UsbDevice),
}

/// Hotplug notifications for [`UsbSession::spawn_events`]
///
/// Owns the platform watcher, which stops once the feed is dropped.
pub struct EventFeed {
    events: mpsc::Receiver<UsbEvent>,
    watcher: Option<Box<dyn Any + Send>>,
}

impl EventFeed {
    /// Feed driven by the caller through the matching sender
    pub fn new(events: mpsc::Receiver<UsbEvent>) -> Self {
        Self {
            events,
            watcher: None,
        }
    }
}

/// Backend for builds or hosts without USB access
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl UsbBackend for UnsupportedBackend {
    fn devices(&self) -> PrintResult<Vec<UsbDevice>> {
        Err(PrintError::PlatformUnsupported(
            "built without USB support".to_string(),
        ))
    }

    fn open(&self, _device: &UsbDevice) -> PrintResult<Box<dyn UsbHandle>> {
        Err(PrintError::PlatformUnsupported(
            "built without USB support".to_string(),
        ))
    }
}

/// libusb backend when available, otherwise [`UnsupportedBackend`]
pub fn default_backend() -> Arc<dyn UsbBackend> {
    #[cfg(feature = "usb")]
    {
        match RusbBackend::new() {
            Ok(backend) => return Arc::new(backend),
            Err(e) => tracing::warn!(error = %e, "libusb unavailable, USB printing disabled"),
        }
    }
    Arc::new(UnsupportedBackend)
}

/// [`default_backend`] plus its hotplug feed
///
/// The feed is `None` without USB support or when libusb lacks hotplug;
/// sessions then only notice a replugged printer on the next write.
pub fn default_backend_with_events() -> (Arc<dyn UsbBackend>, Option<EventFeed>) {
    #[cfg(feature = "usb")]
    {
        match RusbBackend::new() {
            Ok(backend) => {
                let (tx, rx) = mpsc::channel(EVENT_BUFFER);
                let feed = match backend.watch(tx) {
                    Ok(watcher) => Some(EventFeed {
                        events: rx,
                        watcher: Some(Box::new(watcher)),
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "USB hotplug unavailable");
                        None
                    }
                };
                return (Arc::new(backend), feed);
            }
            Err(e) => tracing::warn!(error = %e, "libusb unavailable, USB printing disabled"),
        }
    }
    (Arc::new(UnsupportedBackend), None)
}
