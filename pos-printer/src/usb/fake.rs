//! In-memory USB backend for tests

use super::{
    AltSetting, DeviceLocation, Direction, EndpointInfo, InterfaceInfo, TransferKind, UsbBackend,
    UsbDevice, UsbHandle, ACCESS_DENIED_HINT,
};
use crate::error::{PrintError, PrintResult};
use crate::registry::PrinterIdentity;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
struct FakeDevice {
    device: UsbDevice,
    interfaces: Vec<InterfaceInfo>,
    configured: bool,
}

#[derive(Default)]
struct FakeState {
    devices: Vec<FakeDevice>,
    opens: usize,
    deny_open: bool,
    open_delay: Duration,
    transfer_delay: Duration,
    fail_transfers: bool,
    refuse_claim: HashSet<u8>,
    refuse_alternate: HashSet<u8>,
    transfers: Vec<Vec<u8>>,
    log: Vec<String>,
}

pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

pub(crate) fn printer_interface(number: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternates: vec![AltSetting {
            setting: 0,
            endpoints: vec![
                EndpointInfo {
                    address: 0x81,
                    direction: Direction::In,
                    kind: TransferKind::Bulk,
                },
                EndpointInfo {
                    address: 0x02,
                    direction: Direction::Out,
                    kind: TransferKind::Bulk,
                },
            ],
        }],
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(FakeState::default())),
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Device with one interface exposing bulk IN 0x81 / bulk OUT 0x02
    pub fn add_printer(&self, identity: PrinterIdentity, location: DeviceLocation) -> UsbDevice {
        self.add_device(identity, location, vec![printer_interface(0)], true)
    }

    pub fn add_device(
        &self,
        identity: PrinterIdentity,
        location: DeviceLocation,
        interfaces: Vec<InterfaceInfo>,
        configured: bool,
    ) -> UsbDevice {
        let device = UsbDevice { identity, location };
        self.with(|s| {
            s.devices.push(FakeDevice {
                device: device.clone(),
                interfaces,
                configured,
            })
        });
        device
    }

    pub fn unplug(&self, location: DeviceLocation) {
        self.with(|s| s.devices.retain(|d| d.device.location != location));
    }

    pub fn deny_open(&self, deny: bool) {
        self.with(|s| s.deny_open = deny);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.with(|s| s.open_delay = delay);
    }

    pub fn set_transfer_delay(&self, delay: Duration) {
        self.with(|s| s.transfer_delay = delay);
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.with(|s| s.fail_transfers = fail);
    }

    pub fn refuse_claim(&self, interface: u8) {
        self.with(|s| {
            s.refuse_claim.insert(interface);
        });
    }

    pub fn refuse_alternate(&self, interface: u8) {
        self.with(|s| {
            s.refuse_alternate.insert(interface);
        });
    }

    /// Open attempts, including refused ones
    pub fn open_count(&self) -> usize {
        self.with(|s| s.opens)
    }

    pub fn transfers(&self) -> Vec<Vec<u8>> {
        self.with(|s| s.transfers.clone())
    }

    pub fn written(&self) -> Vec<u8> {
        self.with(|s| s.transfers.concat())
    }

    pub fn log(&self) -> Vec<String> {
        self.with(|s| s.log.clone())
    }
}

impl UsbBackend for FakeBackend {
    fn devices(&self) -> PrintResult<Vec<UsbDevice>> {
        Ok(self.with(|s| s.devices.iter().map(|d| d.device.clone()).collect()))
    }

    fn open(&self, device: &UsbDevice) -> PrintResult<Box<dyn UsbHandle>> {
        let delay = self.with(|s| s.open_delay);
        std::thread::sleep(delay);

        self.with(|s| {
            s.opens += 1;
            if s.deny_open {
                return Err(PrintError::AccessDenied {
                    hint: ACCESS_DENIED_HINT.to_string(),
                });
            }
            let found = s
                .devices
                .iter()
                .find(|d| d.device.location == device.location)
                .cloned()
                .ok_or(PrintError::NoDeviceAvailable)?;
            s.log.push(format!("open {}", found.device.identity.key()));
            Ok(Box::new(FakeHandle {
                state: self.state.clone(),
                key: found.device.identity.key(),
                interfaces: found.interfaces,
                active: found.configured.then_some(1),
            }) as Box<dyn UsbHandle>)
        })
    }
}

struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
    key: String,
    interfaces: Vec<InterfaceInfo>,
    active: Option<u8>,
}

impl FakeHandle {
    fn log(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

impl UsbHandle for FakeHandle {
    fn active_configuration(&self) -> Option<u8> {
        self.active
    }

    fn configuration_values(&self) -> Vec<u8> {
        vec![1]
    }

    fn select_configuration(&mut self, value: u8) -> PrintResult<()> {
        self.log(format!("config {value}"));
        if value == 1 {
            self.active = Some(1);
            Ok(())
        } else {
            Err(PrintError::Transfer(format!("no configuration {value}")))
        }
    }

    fn interfaces(&self) -> PrintResult<Vec<InterfaceInfo>> {
        Ok(self.interfaces.clone())
    }

    fn claim_interface(&mut self, number: u8) -> PrintResult<()> {
        if self.state.lock().unwrap().refuse_claim.contains(&number) {
            self.log(format!("claim {number} refused"));
            return Err(PrintError::Transfer("busy".into()));
        }
        self.log(format!("claim {number}"));
        Ok(())
    }

    fn release_interface(&mut self, number: u8) -> PrintResult<()> {
        self.log(format!("release {number}"));
        Ok(())
    }

    fn select_alternate(&mut self, interface: u8, setting: u8) -> PrintResult<()> {
        if self.state.lock().unwrap().refuse_alternate.contains(&interface) {
            self.log(format!("alt {interface}/{setting} refused"));
            return Err(PrintError::Transfer("alt".into()));
        }
        self.log(format!("alt {interface}/{setting}"));
        Ok(())
    }

    fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> PrintResult<()> {
        let (delay, fail) = {
            let s = self.state.lock().unwrap();
            (s.transfer_delay, s.fail_transfers)
        };
        std::thread::sleep(delay);
        if fail {
            return Err(PrintError::Transfer(format!("endpoint {endpoint:#04x} stalled")));
        }
        self.log(format!("write {} {}", self.key, String::from_utf8_lossy(data)));
        self.state.lock().unwrap().transfers.push(data.to_vec());
        Ok(())
    }
}
