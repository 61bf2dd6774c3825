//! Printer binding strings
//!
//! A binding names the physical target of a logical print sink:
//!
//! ```text
//! usb/04b8:0202:ABC123     USB printer by registry key
//! ip/192.168.1.200         network printer, raw port 9100
//! ip/192.168.1.200:9200    network printer, explicit port
//! ```

use crate::error::{PrintError, PrintResult};
use crate::store::KeyValueStore;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Raw TCP port used by nearly every network thermal printer
pub const DEFAULT_RAW_PORT: u16 = 9100;

/// Resolved print target for one sink
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrinterBinding {
    Usb {
        usb_key: String,
    },
    Ip {
        host: Ipv4Addr,
        port: u16,
    },
    /// Sink not configured
    #[default]
    None,
}

impl PrinterBinding {
    /// Surrounding whitespace is trimmed; a blank key is `None`
    pub fn usb(key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return PrinterBinding::None;
        }
        PrinterBinding::Usb {
            usb_key: key.to_string(),
        }
    }

    /// Port 0 means the raw default
    pub fn ip(host: Ipv4Addr, port: u16) -> Self {
        let port = if port == 0 { DEFAULT_RAW_PORT } else { port };
        PrinterBinding::Ip { host, port }
    }

    /// Parse a binding string; the empty string is `None`
    pub fn parse(s: &str) -> PrintResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(PrinterBinding::None);
        }

        if let Some(key) = s.strip_prefix("usb/") {
            if key.trim().is_empty() {
                return Err(PrintError::InvalidConfig(format!("Empty USB key: {}", s)));
            }
            return Ok(PrinterBinding::usb(key));
        }

        if let Some(target) = s.strip_prefix("ip/") {
            let (host, port) = match target.split_once(':') {
                Some((host, port)) => {
                    let port: u16 = port
                        .parse()
                        .map_err(|_| PrintError::InvalidConfig(format!("Invalid port: {}", s)))?;
                    (host, port)
                }
                None => (target, DEFAULT_RAW_PORT),
            };
            if port == 0 {
                return Err(PrintError::InvalidConfig(format!("Invalid port: {}", s)));
            }
            let host: Ipv4Addr = host
                .parse()
                .map_err(|_| PrintError::InvalidConfig(format!("Invalid IPv4 host: {}", s)))?;
            return Ok(PrinterBinding::ip(host, port));
        }

        Err(PrintError::InvalidConfig(format!(
            "Unknown printer binding: {}",
            s
        )))
    }
}

impl fmt::Display for PrinterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterBinding::Usb { usb_key } => write!(f, "usb/{}", usb_key),
            PrinterBinding::Ip { host, port } if *port == DEFAULT_RAW_PORT => {
                write!(f, "ip/{}", host)
            }
            PrinterBinding::Ip { host, port } => write!(f, "ip/{}:{}", host, port),
            PrinterBinding::None => Ok(()),
        }
    }
}

impl FromStr for PrinterBinding {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Per-sink binding storage ("receipt", "kitchen:3", ...)
pub struct SinkBindings<'a> {
    store: &'a dyn KeyValueStore,
}

/// Key the register binding lived under before sinks were namespaced
const LEGACY_RECEIPT_KEY: &str = "cafe_receipt_printer";

impl<'a> SinkBindings<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    fn key(sink: &str) -> String {
        format!("printer_binding:{}", sink)
    }

    /// Binding for a sink; unset sinks resolve to `None`
    pub fn get(&self, sink: &str) -> PrintResult<PrinterBinding> {
        let raw = self.store.get(&Self::key(sink)).or_else(|| {
            (sink == "receipt")
                .then(|| self.store.get(LEGACY_RECEIPT_KEY))
                .flatten()
        });
        match raw {
            Some(raw) => PrinterBinding::parse(&raw),
            None => Ok(PrinterBinding::None),
        }
    }

    pub fn set(&self, sink: &str, binding: &PrinterBinding) -> PrintResult<()> {
        match binding {
            PrinterBinding::None => self.store.remove(&Self::key(sink)),
            other => self.store.set(&Self::key(sink), &other.to_string()),
        }
    }
}
