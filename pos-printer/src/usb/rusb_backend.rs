//! libusb backend (via `rusb`)

use super::{
    ACCESS_DENIED_HINT, AltSetting, DeviceLocation, Direction, EndpointInfo, InterfaceInfo,
    PRINTER_CLASS_FILTER, TransferKind, UsbBackend, UsbDevice, UsbEvent, UsbHandle,
};
use crate::error::{PrintError, PrintResult};
use crate::registry::PrinterIdentity;
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-chunk bulk write timeout
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Descriptor string reads
const STRING_TIMEOUT: Duration = Duration::from_millis(200);

fn map_err(e: rusb::Error) -> PrintError {
    match e {
        rusb::Error::Access => PrintError::AccessDenied {
            hint: ACCESS_DENIED_HINT.to_string(),
        },
        rusb::Error::NoDevice | rusb::Error::NotFound => PrintError::NoDeviceAvailable,
        rusb::Error::NotSupported => PrintError::PlatformUnsupported(e.to_string()),
        rusb::Error::Timeout => PrintError::Timeout(e.to_string()),
        other => PrintError::Transfer(other.to_string()),
    }
}

fn location_of<T: UsbContext>(device: &Device<T>) -> DeviceLocation {
    DeviceLocation {
        bus: device.bus_number(),
        address: device.address(),
    }
}

fn is_printer_class<T: UsbContext>(device: &Device<T>) -> bool {
    let Ok(desc) = device.device_descriptor() else {
        return false;
    };
    if PRINTER_CLASS_FILTER.contains(&desc.class_code()) {
        return true;
    }
    let Ok(config) = device.active_config_descriptor().or_else(|_| device.config_descriptor(0))
    else {
        return false;
    };
    config
        .interfaces()
        .flat_map(|i| i.descriptors())
        .any(|d| PRINTER_CLASS_FILTER.contains(&d.class_code()))
}

/// Read vendor/product/serial/name; strings need the device opened
fn identify<T: UsbContext>(device: &Device<T>) -> PrintResult<PrinterIdentity> {
    let desc = device.device_descriptor().map_err(map_err)?;
    let (serial, name) = match device.open() {
        Ok(handle) => {
            let language = handle
                .read_languages(STRING_TIMEOUT)
                .ok()
                .and_then(|l| l.first().copied());
            let read = |index: Option<u8>| {
                let (index, language) = (index?, language?);
                handle
                    .read_string_descriptor(language, index, STRING_TIMEOUT)
                    .ok()
            };
            (
                read(desc.serial_number_string_index()),
                read(desc.product_string_index()),
            )
        }
        Err(e) => {
            debug!(error = %e, "Cannot read descriptor strings");
            (None, None)
        }
    };
    Ok(PrinterIdentity::new(
        desc.vendor_id(),
        desc.product_id(),
        serial.as_deref(),
        name.as_deref(),
    ))
}

/// libusb-backed device access
pub struct RusbBackend {
    context: Context,
    // identities of devices seen so far; departed devices can no longer be read
    known: Arc<Mutex<HashMap<DeviceLocation, UsbDevice>>>,
}

impl RusbBackend {
    pub fn new() -> PrintResult<Self> {
        let context = Context::new().map_err(|e| PrintError::PlatformUnsupported(e.to_string()))?;
        Ok(Self {
            context,
            known: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn find(&self, location: DeviceLocation) -> PrintResult<Device<Context>> {
        let list = self.context.devices().map_err(map_err)?;
        list.iter()
            .find(|d| location_of(d) == location)
            .ok_or(PrintError::NoDeviceAvailable)
    }

    /// Watch for printer arrivals and departures on a background thread
    pub fn watch(&self, events: mpsc::Sender<UsbEvent>) -> PrintResult<HotplugWatcher> {
        HotplugWatcher::start(self.context.clone(), self.known.clone(), events)
    }
}

impl UsbBackend for RusbBackend {
    fn devices(&self) -> PrintResult<Vec<UsbDevice>> {
        let list = self.context.devices().map_err(map_err)?;
        let mut found = Vec::new();
        for device in list.iter().filter(|d| is_printer_class(d)) {
            match identify(&device) {
                Ok(identity) => found.push(UsbDevice {
                    identity,
                    location: location_of(&device),
                }),
                Err(e) => debug!(error = %e, "Skipping unreadable device"),
            }
        }

        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        for device in &found {
            known.insert(device.location, device.clone());
        }
        debug!(count = found.len(), "USB printers enumerated");
        Ok(found)
    }

    fn open(&self, device: &UsbDevice) -> PrintResult<Box<dyn UsbHandle>> {
        let raw = self.find(device.location)?;
        let mut handle = raw.open().map_err(map_err)?;
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            // unsupported on Windows and macOS
            debug!(error = %e, "Kernel driver auto-detach unavailable");
        }
        Ok(Box::new(RusbHandle {
            device: raw,
            handle,
        }))
    }
}

struct RusbHandle {
    device: Device<Context>,
    handle: DeviceHandle<Context>,
}

impl UsbHandle for RusbHandle {
    fn active_configuration(&self) -> Option<u8> {
        self.handle.active_configuration().ok().filter(|c| *c != 0)
    }

    fn configuration_values(&self) -> Vec<u8> {
        let Ok(desc) = self.device.device_descriptor() else {
            return Vec::new();
        };
        (0..desc.num_configurations())
            .filter_map(|i| self.device.config_descriptor(i).ok())
            .map(|c| c.number())
            .collect()
    }

    fn select_configuration(&mut self, value: u8) -> PrintResult<()> {
        self.handle.set_active_configuration(value).map_err(map_err)
    }

    fn interfaces(&self) -> PrintResult<Vec<InterfaceInfo>> {
        let config = self.device.active_config_descriptor().map_err(map_err)?;
        Ok(config
            .interfaces()
            .map(|iface| InterfaceInfo {
                number: iface.number(),
                alternates: iface
                    .descriptors()
                    .map(|alt| AltSetting {
                        setting: alt.setting_number(),
                        endpoints: alt
                            .endpoint_descriptors()
                            .map(|ep| EndpointInfo {
                                address: ep.address(),
                                direction: match ep.direction() {
                                    rusb::Direction::In => Direction::In,
                                    rusb::Direction::Out => Direction::Out,
                                },
                                kind: match ep.transfer_type() {
                                    rusb::TransferType::Control => TransferKind::Control,
                                    rusb::TransferType::Isochronous => TransferKind::Isochronous,
                                    rusb::TransferType::Bulk => TransferKind::Bulk,
                                    rusb::TransferType::Interrupt => TransferKind::Interrupt,
                                },
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect())
    }

    fn claim_interface(&mut self, number: u8) -> PrintResult<()> {
        self.handle.claim_interface(number).map_err(map_err)
    }

    fn release_interface(&mut self, number: u8) -> PrintResult<()> {
        self.handle.release_interface(number).map_err(map_err)
    }

    fn select_alternate(&mut self, interface: u8, setting: u8) -> PrintResult<()> {
        self.handle
            .set_alternate_setting(interface, setting)
            .map_err(map_err)
    }

    fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()> {
        let mut sent = 0;
        while sent < data.len() {
            let n = self
                .handle
                .write_bulk(endpoint, &data[sent..], WRITE_TIMEOUT)
                .map_err(map_err)?;
            if n == 0 {
                return Err(PrintError::Transfer(format!(
                    "endpoint {:#04x} accepted 0 bytes",
                    endpoint
                )));
            }
            sent += n;
        }
        Ok(())
    }
}

struct HotplugForwarder {
    raw: std::sync::mpsc::Sender<(bool, Device<Context>)>,
}

impl rusb::Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        let _ = self.raw.send((true, device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        let _ = self.raw.send((false, device));
    }
}

/// Background libusb event thread translating hotplug callbacks into
/// [`UsbEvent`]s
///
/// Stops when dropped.
pub struct HotplugWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugWatcher {
    fn start(
        context: Context,
        known: Arc<Mutex<HashMap<DeviceLocation, UsbDevice>>>,
        events: mpsc::Sender<UsbEvent>,
    ) -> PrintResult<Self> {
        if !rusb::has_hotplug() {
            return Err(PrintError::PlatformUnsupported(
                "libusb built without hotplug support".to_string(),
            ));
        }

        let (raw_tx, raw_rx) = std::sync::mpsc::channel();
        let forwarder: Box<dyn rusb::Hotplug<Context>> = Box::new(HotplugForwarder { raw: raw_tx });
        let registration = rusb::HotplugBuilder::new()
            .enumerate(false)
            .register(&context, forwarder)
            .map_err(map_err)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("usb-hotplug".to_string())
                .spawn(move || {
                    let _registration = registration;
                    info!("USB hotplug watcher started");
                    while !stop.load(Ordering::Relaxed) {
                        if let Err(e) = context.handle_events(Some(Duration::from_millis(200))) {
                            warn!(error = %e, "libusb event handling failed");
                        }
                        while let Ok((arrived, device)) = raw_rx.try_recv() {
                            let Some(event) = translate(arrived, &device, &known) else {
                                continue;
                            };
                            if events.blocking_send(event).is_err() {
                                debug!("USB event receiver gone, stopping watcher");
                                return;
                            }
                        }
                    }
                    info!("USB hotplug watcher stopped");
                })?
        };

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("USB hotplug thread panicked");
        }
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn translate(
    arrived: bool,
    device: &Device<Context>,
    known: &Mutex<HashMap<DeviceLocation, UsbDevice>>,
) -> Option<UsbEvent> {
    let location = location_of(device);
    let mut known = known.lock().unwrap_or_else(|e| e.into_inner());
    if arrived {
        if !is_printer_class(device) {
            return None;
        }
        let identity = identify(device).ok()?;
        let device = UsbDevice { identity, location };
        known.insert(location, device.clone());
        Some(UsbEvent::Connected(device))
    } else {
        known.remove(&location).map(UsbEvent::Disconnected)
    }
}
