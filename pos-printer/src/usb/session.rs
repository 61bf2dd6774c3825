//! USB print session
//!
//! State machine: `Closed -> Opening -> Open -> Closed`.
//!
//! - at most one device is open; opening another drops the previous handle
//! - concurrent `ensure_open` callers share one in-flight attempt
//! - writes go through a single FIFO queue, so one job's chunks are never
//!   interleaved with another's

use super::{EventFeed, UsbDevice, UsbEvent, UsbHandle};
use crate::error::{PrintError, PrintResult};
use crate::printer::Printer;
use crate::registry::{DeviceChooser, DeviceRegistry, normalize_key};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How a payload is split on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl WritePlan {
    /// ESC/POS receipts: 12 KiB chunks
    pub const RECEIPT: WritePlan = WritePlan {
        chunk_size: 12 * 1024,
        chunk_delay: Duration::from_millis(5),
    };

    /// TSPL labels: small chunks, label printers have tiny input buffers
    pub const LABEL: WritePlan = WritePlan {
        chunk_size: 4096,
        chunk_delay: Duration::from_millis(5),
    };
}

impl Default for WritePlan {
    fn default() -> Self {
        Self::RECEIPT
    }
}

/// A claimed device ready for bulk OUT transfers
pub struct OpenDevice {
    device: UsbDevice,
    interface: u8,
    endpoint: u8,
    handle: Arc<Mutex<Box<dyn UsbHandle>>>,
}

impl OpenDevice {
    pub fn device(&self) -> &UsbDevice {
        &self.device
    }

    pub fn interface(&self) -> u8 {
        self.interface
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    async fn transfer(&self, chunk: Vec<u8>) -> PrintResult<()> {
        let handle = self.handle.clone();
        let endpoint = self.endpoint;
        tokio::task::spawn_blocking(move || {
            let mut handle = handle.lock().unwrap_or_else(|e| e.into_inner());
            handle.transfer_out(endpoint, &chunk)
        })
        .await
        .map_err(|e| PrintError::Transfer(format!("Transfer task failed: {}", e)))?
    }
}

impl Drop for OpenDevice {
    fn drop(&mut self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = handle.release_interface(self.interface) {
            debug!(error = %e, "Release on close failed");
        }
        debug!(key = %self.device.identity.key(), "USB device closed");
    }
}

type OpenFuture = Shared<BoxFuture<'static, PrintResult<Arc<OpenDevice>>>>;

enum SessionState {
    Closed,
    Opening {
        attempt: u64,
        target: Option<String>,
        future: OpenFuture,
    },
    Open(Arc<OpenDevice>),
}

/// Owner of the process-wide USB printer handle
pub struct UsbSession {
    registry: Arc<DeviceRegistry>,
    state: Mutex<SessionState>,
    attempts: AtomicU64,
    write_queue: tokio::sync::Mutex<()>,
    plan: WritePlan,
}

impl UsbSession {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(SessionState::Closed),
            attempts: AtomicU64::new(0),
            write_queue: tokio::sync::Mutex::new(()),
            plan: WritePlan::default(),
        }
    }

    /// Override the default write plan used by [`UsbSession::write`]
    pub fn with_plan(mut self, plan: WritePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), SessionState::Open(_))
    }

    /// Device currently open, if any
    pub fn current_device(&self) -> Option<UsbDevice> {
        match &*self.lock_state() {
            SessionState::Open(open) => Some(open.device.clone()),
            _ => None,
        }
    }

    /// Open (or reuse) the session for the active printer
    ///
    /// Falls back to saved and then authorized devices when the active one is
    /// not attached.
    pub async fn ensure_open(&self) -> PrintResult<Arc<OpenDevice>> {
        self.open_target(None).await
    }

    /// Open exactly the printer identified by `key`
    async fn open_exact(&self, key: &str) -> PrintResult<Arc<OpenDevice>> {
        for _ in 0..2 {
            let device = self.open_target(Some(key.to_string())).await?;
            if device.device.identity.key() == key {
                return Ok(device);
            }
            warn!(
                wanted = %key,
                opened = %device.device.identity.key(),
                "Open session belongs to another printer, reopening"
            );
            self.invalidate(&device);
        }
        Err(PrintError::NoDeviceAvailable)
    }

    /// `exact`: open only this key, no fallback
    async fn open_target(&self, exact: Option<String>) -> PrintResult<Arc<OpenDevice>> {
        let wanted = exact.clone().or_else(|| self.registry.active_key());

        let (attempt, future) = {
            let mut state = self.lock_state();
            match &*state {
                SessionState::Open(open)
                    if wanted
                        .as_deref()
                        .is_none_or(|key| key == open.device.identity.key()) =>
                {
                    return Ok(open.clone());
                }
                SessionState::Opening {
                    attempt,
                    target,
                    future,
                } if exact.is_none() || *target == exact => (*attempt, future.clone()),
                _ => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
                    let future = open_device(self.registry.clone(), exact.clone())
                        .boxed()
                        .shared();
                    // replaces (and closes) a session bound to another printer
                    *state = SessionState::Opening {
                        attempt,
                        target: exact,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let result = future.await;

        let mut state = self.lock_state();
        let current = matches!(&*state, SessionState::Opening { attempt: a, .. } if *a == attempt);
        if current {
            *state = match &result {
                Ok(open) => SessionState::Open(open.clone()),
                Err(_) => SessionState::Closed,
            };
        }
        result
    }

    /// Close the open session (no-op when closed)
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), SessionState::Closed);
        if let SessionState::Open(open) = previous {
            info!(key = %open.device.identity.key(), "USB session closed");
        }
    }

    fn invalidate(&self, device: &Arc<OpenDevice>) {
        let mut state = self.lock_state();
        let same = matches!(&*state, SessionState::Open(open) if Arc::ptr_eq(open, device));
        if same {
            *state = SessionState::Closed;
        }
    }

    /// Make `key` the active printer; a session on another device is closed
    pub fn activate(&self, key: &str) -> PrintResult<()> {
        self.registry.set_active(key)?;
        if let Some(open) = self.current_device()
            && open.identity.key() != key
        {
            debug!(from = %open.identity.key(), to = %key, "Switching active printer");
            self.close();
        }
        Ok(())
    }

    /// Run the device chooser, remember the choice and make it active
    ///
    /// Enumerates devices on the calling thread.
    pub fn select_device(&self, chooser: &dyn DeviceChooser) -> PrintResult<UsbDevice> {
        let device = self.registry.request_new_device(chooser)?;
        if let Some(open) = self.current_device()
            && open.location != device.location
        {
            self.close();
        }
        Ok(device)
    }

    /// Best-effort connectivity check: can the active printer be opened
    pub async fn is_connected(&self) -> bool {
        match self.ensure_open().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "USB printer not connected");
                false
            }
        }
    }

    /// Write with the session's default plan
    pub async fn write(&self, data: &[u8]) -> PrintResult<()> {
        self.write_with(data, self.plan).await
    }

    /// Queue `data` behind any in-flight job, then transfer it chunk by chunk
    /// to whichever printer the session resolves
    ///
    /// A failure after some chunks were sent leaves the printer in an
    /// unknown state; reprint the whole job.
    #[instrument(skip(self, data), fields(data_len = data.len(), chunk_size = plan.chunk_size))]
    pub async fn write_with(&self, data: &[u8], plan: WritePlan) -> PrintResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let _turn = self.write_queue.lock().await;
        let device = self.ensure_open().await?;
        self.transfer_all(&device, data, plan).await
    }

    /// Make `key` active and write `data` to that printer only
    ///
    /// Activation, open and transfer all happen in the job's turn, so jobs
    /// bound to different printers never cross.
    #[instrument(skip(self, data), fields(data_len = data.len(), chunk_size = plan.chunk_size))]
    pub async fn write_to(&self, key: &str, data: &[u8], plan: WritePlan) -> PrintResult<()> {
        let key = normalize_key(key.trim());
        let _turn = self.write_queue.lock().await;
        self.activate(&key)?;
        if data.is_empty() {
            return Ok(());
        }

        let device = self.open_exact(&key).await?;
        self.transfer_all(&device, data, plan).await
    }

    async fn transfer_all(
        &self,
        device: &Arc<OpenDevice>,
        data: &[u8],
        plan: WritePlan,
    ) -> PrintResult<()> {
        let mut chunks = 0usize;
        for (i, chunk) in data.chunks(plan.chunk_size.max(1)).enumerate() {
            if i > 0 && !plan.chunk_delay.is_zero() {
                tokio::time::sleep(plan.chunk_delay).await;
            }
            if let Err(e) = device.transfer(chunk.to_vec()).await {
                warn!(error = %e, chunk = i, "USB transfer failed, session dropped");
                self.invalidate(device);
                return Err(e);
            }
            chunks += 1;
        }

        debug!(chunks, key = %device.device.identity.key(), "USB write complete");
        Ok(())
    }

    /// React to a hotplug notification
    pub async fn handle_event(&self, event: UsbEvent) {
        match event {
            UsbEvent::Disconnected(device) => {
                let mut state = self.lock_state();
                let ours = matches!(&*state, SessionState::Open(open) if open.device.location == device.location);
                if ours {
                    info!(key = %device.identity.key(), "Open printer disconnected");
                    *state = SessionState::Closed;
                }
            }
            UsbEvent::Connected(device) => {
                let Some(active) = self.registry.active_key() else {
                    return;
                };
                if device.identity.key() != active {
                    return;
                }
                match self.ensure_open().await {
                    Ok(_) => info!(key = %active, "Active printer reconnected"),
                    Err(e) => warn!(key = %active, error = %e, "Reopen after reconnect failed"),
                }
            }
        }
    }

    /// Consume hotplug events until `shutdown` fires or the channel closes
    pub async fn run_events(
        &self,
        mut events: mpsc::Receiver<UsbEvent>,
        shutdown: CancellationToken,
    ) {
        info!("USB event loop started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("USB event loop shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("USB event channel closed");
                        break;
                    }
                }
            }
        }
    }
}

impl UsbSession {
    /// Pump `feed` into [`UsbSession::handle_event`] on the runtime until
    /// `shutdown` fires
    pub fn spawn_events(
        self: &Arc<Self>,
        feed: EventFeed,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            let EventFeed { events, watcher } = feed;
            session.run_events(events, shutdown).await;
            // stopping the watcher joins its thread
            if let Some(watcher) = watcher
                && let Err(e) = tokio::task::spawn_blocking(move || drop(watcher)).await
            {
                warn!(error = %e, "USB watcher shutdown failed");
            }
        })
    }
}

impl Printer for UsbSession {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        self.write(data).await
    }

    async fn is_online(&self) -> bool {
        self.is_connected().await
    }
}

async fn open_device(
    registry: Arc<DeviceRegistry>,
    exact: Option<String>,
) -> PrintResult<Arc<OpenDevice>> {
    tokio::task::spawn_blocking(move || {
        let devices = registry.backend().devices()?;
        let device = match &exact {
            Some(key) => devices.into_iter().find(|d| d.identity.key() == *key),
            None => registry.resolve(&devices),
        }
        .ok_or(PrintError::NoDeviceAvailable)?;

        let mut handle = registry.backend().open(&device)?;
        let (interface, endpoint) = negotiate(handle.as_mut())?;

        info!(
            key = %device.identity.key(),
            name = %device.identity.display_name,
            interface,
            endpoint,
            "USB printer opened"
        );
        Ok(Arc::new(OpenDevice {
            device,
            interface,
            endpoint,
            handle: Arc::new(Mutex::new(handle)),
        }))
    })
    .await
    .map_err(|e| PrintError::Transfer(format!("Open task failed: {}", e)))?
}

/// Select a configuration if none is active, then claim the first
/// interface/alternate exposing a bulk OUT endpoint
///
/// Returns `(interface number, endpoint address)`.
pub(crate) fn negotiate(handle: &mut dyn UsbHandle) -> PrintResult<(u8, u8)> {
    if handle.active_configuration().is_none() {
        if let Err(e) = handle.select_configuration(1) {
            debug!(error = %e, "Configuration 1 rejected");
        }
        if handle.active_configuration().is_none()
            && let Some(first) = handle.configuration_values().first().copied()
            && let Err(e) = handle.select_configuration(first)
        {
            debug!(error = %e, value = first, "Configuration rejected");
        }
    }
    if handle.active_configuration().is_none() {
        return Err(PrintError::NoBulkEndpoint(
            "device has no active configuration".to_string(),
        ));
    }

    for iface in handle.interfaces()? {
        for alt in &iface.alternates {
            let Some(endpoint) = alt.bulk_out() else {
                continue;
            };
            if let Err(e) = handle.claim_interface(iface.number) {
                debug!(interface = iface.number, error = %e, "Claim failed, trying next");
                continue;
            }
            if let Err(e) = handle.select_alternate(iface.number, alt.setting) {
                debug!(interface = iface.number, setting = alt.setting, error = %e, "Alternate failed");
                let _ = handle.release_interface(iface.number);
                continue;
            }
            return Ok((iface.number, endpoint.address));
        }
    }

    Err(PrintError::NoBulkEndpoint(
        "no interface could be claimed; check the driver binding (WinUSB/libusb)".to_string(),
    ))
}
