/// Bridge configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | PRINTER_BRIDGE_HOST | 127.0.0.1 | Listen address |
/// | PRINTER_BRIDGE_PORT | 5179 | Listen port |
/// | PRINTER_BRIDGE_TIMEOUT_MS | 2000 | Printer timeout when a request sets none |
/// | PRINTER_BRIDGE_MAX_BODY | 2097152 | Request body limit in bytes |
/// | LOG_LEVEL | info | Log filter |
/// | LOG_JSON | false | JSON console output |
/// | LOG_DIR | (unset) | Daily rotating log files |
/// | ENVIRONMENT | development | Runtime environment |
///
/// # Example
///
/// ```ignore
/// PRINTER_BRIDGE_HOST=0.0.0.0 PRINTER_BRIDGE_PORT=5180 cargo run -p printer-bridge
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_timeout_ms: u64,
    pub max_body: usize,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// development | production
    pub environment: String,
}

pub const DEFAULT_PORT: u16 = 5179;
pub const DEFAULT_MAX_BODY: usize = 2 * 1024 * 1024;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load from the environment; unset or unparsable values use defaults
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("PRINTER_BRIDGE_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env_or("PRINTER_BRIDGE_PORT", DEFAULT_PORT),
            default_timeout_ms: env_or(
                "PRINTER_BRIDGE_TIMEOUT_MS",
                pos_printer::DEFAULT_BRIDGE_TIMEOUT_MS,
            ),
            max_body: env_or("PRINTER_BRIDGE_MAX_BODY", DEFAULT_MAX_BODY),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            default_timeout_ms: pos_printer::DEFAULT_BRIDGE_TIMEOUT_MS,
            max_body: DEFAULT_MAX_BODY,
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            environment: "development".into(),
        }
    }
}
