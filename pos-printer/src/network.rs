//! Network transport: printer bridge with raw TCP fallback
//!
//! Browsers and sandboxed frontends cannot open raw sockets, so network
//! printers are reached through a small local HTTP bridge (`printer-bridge`)
//! that relays a base64 payload to `ip:port`. When the bridge is down the
//! payload may be written directly over TCP; that path cannot confirm
//! delivery and is reported as [`Delivery::RawBestEffort`].

use crate::binding::DEFAULT_RAW_PORT;
use crate::error::{PrintError, PrintResult};
use crate::printer::{NetworkPrinter, Printer};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default bridge endpoint
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:5179/print";

/// Default printer-side timeout forwarded to the bridge
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 2000;

const HEALTH_TIMEOUT: Duration = Duration::from_millis(800);
const HEALTH_TTL_OK: Duration = Duration::from_secs(30);
const HEALTH_TTL_DOWN: Duration = Duration::from_secs(10);

/// `POST /print` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgePrintRequest {
    pub ip: String,
    pub port: u16,
    /// Base64 payload
    pub data: String,
    pub timeout_ms: u64,
}

/// Bridge reply for every route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

/// How a network job left this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the bridge (the bridge reached the printer)
    Bridge,
    /// Written straight to the socket; delivery unknown
    RawBestEffort,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub bridge_url: String,
    /// Allow the direct TCP path when the bridge fails
    pub raw_fallback: bool,
    /// Secure (https) origins may not open plain sockets
    pub secure_origin: bool,
    pub timeout: Duration,
    pub raw_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            raw_fallback: false,
            secure_origin: false,
            timeout: Duration::from_millis(DEFAULT_BRIDGE_TIMEOUT_MS),
            raw_timeout: Duration::from_millis(1500),
        }
    }
}

/// Bridge URL with its trailing `/print` replaced by `/health`
pub fn health_url(bridge_url: &str) -> String {
    let trimmed = bridge_url.trim().trim_end_matches('/');
    let cut = trimmed.len().saturating_sub("/print".len());
    match trimmed.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case("/print") => format!("{}/health", &trimmed[..cut]),
        _ => format!("{}/health", trimmed),
    }
}

#[derive(Debug, Clone, Copy)]
struct HealthCheck {
    checked_at: Instant,
    ok: bool,
}

impl HealthCheck {
    fn fresh(&self) -> bool {
        let ttl = if self.ok { HEALTH_TTL_OK } else { HEALTH_TTL_DOWN };
        self.checked_at.elapsed() < ttl
    }
}

/// Sends payloads to network printers
pub struct NetworkTransport {
    client: reqwest::Client,
    config: NetworkConfig,
    health: Mutex<Option<HealthCheck>>,
}

impl NetworkTransport {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            health: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Deliver `data` to `host:port`, preferring the bridge
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub async fn send(&self, data: &[u8], host: Ipv4Addr, port: u16) -> PrintResult<Delivery> {
        let port = if port == 0 { DEFAULT_RAW_PORT } else { port };

        let reason = match self.send_via_bridge(data, host, port).await {
            Ok(()) => {
                info!("Delivered via bridge");
                self.record_health(true);
                return Ok(Delivery::Bridge);
            }
            Err(reason) => reason,
        };

        if !self.config.raw_fallback || self.config.secure_origin {
            warn!(reason = %reason, "Bridge failed, raw fallback not permitted");
            return Err(PrintError::BridgeUnavailable(reason));
        }

        warn!(reason = %reason, "Bridge failed, writing raw TCP");
        let printer = NetworkPrinter::new(host, port).with_timeout(self.config.raw_timeout);
        if let Err(e) = printer.print(data).await {
            // the socket may have taken the bytes before timing out
            warn!(error = %e, "Raw fallback did not complete");
        }
        Ok(Delivery::RawBestEffort)
    }

    async fn send_via_bridge(&self, data: &[u8], host: Ipv4Addr, port: u16) -> Result<(), String> {
        let body = BridgePrintRequest {
            ip: host.to_string(),
            port,
            data: STANDARD.encode(data),
            timeout_ms: self.config.timeout.as_millis() as u64,
        };

        let response = self
            .client
            .post(&self.config.bridge_url)
            .json(&body)
            // leave the bridge room to report its own printer timeout
            .timeout(self.config.timeout + Duration::from_secs(1))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response
            .json::<BridgeResponse>()
            .await
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| status.to_string());
        Err(format!("bridge returned {}: {}", status.as_u16(), detail))
    }

    fn record_health(&self, ok: bool) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        *health = Some(HealthCheck {
            checked_at: Instant::now(),
            ok,
        });
    }

    /// Whether the bridge answers its health check (cached)
    pub async fn bridge_online(&self) -> bool {
        let cached = *self.health.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(check) = cached
            && check.fresh()
        {
            return check.ok;
        }

        let url = health_url(&self.config.bridge_url);
        let ok = match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<BridgeResponse>()
                .await
                .map(|r| r.ok)
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Bridge health check rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "Bridge health check failed");
                false
            }
        };
        self.record_health(ok);
        ok
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}
