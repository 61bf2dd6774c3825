//! # pos-printer
//!
//! Receipt and label printing for Cyrillic point-of-sale setups.
//!
//! ## Scope
//!
//! - ESC/POS receipts (CP866 / CP1251 text, raster images)
//! - TSPL product labels, vector or host-rendered bitmap
//! - USB printers through one serialized session (libusb)
//! - Network printers through the printer bridge, with raw TCP fallback
//! - Per-sink printer bindings and settings in a key-value store
//!
//! ## Example
//!
//! ```ignore
//! use pos_printer::{
//!     DeviceRegistry, FileStore, LabelSpec, PrintService, PrinterBinding, UsbSession,
//!     default_backend_with_events,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(FileStore::open("printers.json")?);
//! let (backend, feed) = default_backend_with_events();
//! let registry = Arc::new(DeviceRegistry::new(store.clone(), backend));
//! let usb = Arc::new(UsbSession::new(registry));
//! let shutdown = CancellationToken::new();
//! if let Some(feed) = feed {
//!     usb.spawn_events(feed, shutdown.clone());
//! }
//! let service = PrintService::new(store, usb);
//!
//! let label = LabelSpec {
//!     title: "Молоко 3.2%".into(),
//!     barcode: "460123456789".into(),
//!     price: Some("89.90".into()),
//!     ..Default::default()
//! };
//! service
//!     .print_label(&PrinterBinding::parse("usb/1fc9:2016:L1")?, &label)
//!     .await?;
//! ```

pub mod barcode;
mod binding;
mod bitmap;
pub mod codepage;
mod error;
pub mod escpos;
pub mod label;
mod network;
mod printer;
pub mod receipt;
mod registry;
mod service;
pub mod settings;
mod store;
pub mod usb;

// Re-exports
pub use binding::{DEFAULT_RAW_PORT, PrinterBinding, SinkBindings};
pub use bitmap::{DEFAULT_THRESHOLD, MonoBitmap};
pub use codepage::Codepage;
pub use error::{PrintError, PrintResult};
pub use escpos::{EscPosBuilder, load_logo, lr_safe};
pub use label::{FontMetrics, LabelSpec, RasterOptions, build_label, build_raster_label};
pub use network::{
    BridgePrintRequest, BridgeResponse, Delivery, NetworkConfig, NetworkTransport,
    DEFAULT_BRIDGE_TIMEOUT_MS, DEFAULT_BRIDGE_URL,
};
pub use printer::{NetworkPrinter, Printer};
pub use receipt::{ReceiptItem, ReceiptPayload, build_receipt};
pub use registry::{DeviceChooser, DeviceRegistry, PrinterIdentity};
pub use service::{PrintService, RECEIPT_SINK, sink_for};
pub use settings::{LabelMode, PrinterSettings};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use usb::{EventFeed, UsbSession, WritePlan, default_backend, default_backend_with_events};
