//! Error types for the printer library

use std::sync::Arc;
use thiserror::Error;

/// Printer error types
///
/// `Clone` so that one failed USB open attempt can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum PrintError {
    /// No USB host API on this platform (or libusb failed to initialize)
    #[error("USB is not supported on this platform: {0}")]
    PlatformUnsupported(String),

    /// The device chooser was dismissed without a selection
    #[error("No printer selected")]
    NoDeviceSelected,

    /// Nothing resolvable from the active key, the saved list or the authorized devices
    #[error("No USB printer available")]
    NoDeviceAvailable,

    /// The host denied opening the device
    #[error("USB access denied: {hint}")]
    AccessDenied { hint: String },

    /// No interface exposes a claimable bulk OUT endpoint
    #[error("No bulk OUT endpoint could be claimed: {0}")]
    NoBulkEndpoint(String),

    /// Barcode does not reduce to 12 or 13 digits
    #[error("Invalid barcode: {0}")]
    InvalidBarcode(String),

    /// Bridge unreachable and no raw fallback allowed
    #[error("Printer bridge unavailable: {0}")]
    BridgeUnavailable(String),

    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A USB transfer failed part-way through a job
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Key-value storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Label rendering failure (fonts, images)
    #[error("Render error: {0}")]
    Render(String),
}

impl PrintError {
    /// Whether retrying the same operation may succeed without user intervention
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PrintError::NoDeviceSelected
                | PrintError::Timeout(_)
                | PrintError::BridgeUnavailable(_)
                | PrintError::Connection(_)
                | PrintError::Transfer(_)
        )
    }
}

impl From<std::io::Error> for PrintError {
    fn from(err: std::io::Error) -> Self {
        PrintError::Io(Arc::new(err))
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
