//! Printer adapters for sending raw command streams
//!
//! Supports:
//! - USB printers (see [`crate::usb::UsbSession`])
//! - Network printers (raw TCP, port 9100)

use crate::binding::DEFAULT_RAW_PORT;
use crate::error::{PrintError, PrintResult};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Trait for printer adapters
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send a raw ESC/POS or TSPL byte stream
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Raw TCP printer (JetDirect, port 9100)
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self {
            addr: SocketAddr::V4(SocketAddrV4::new(host, port)),
            timeout: Duration::from_secs(5),
        }
    }

    /// Parse `a.b.c.d[:port]`; the port defaults to 9100
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr = addr.trim();
        let (host, port) = match addr.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| PrintError::InvalidConfig(format!("Invalid port: {}", addr)))?;
                (host, port)
            }
            None => (addr, DEFAULT_RAW_PORT),
        };
        let host: Ipv4Addr = host
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;
        Ok(Self::new(host, port))
    }

    /// Set connect and write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&self, data: &[u8]) -> PrintResult<()> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        debug!("Connected, sending {} bytes", data.len());

        stream.write_all(data).await.map_err(|e| {
            PrintError::from(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        stream.flush().await?;
        stream.shutdown().await?;
        Ok(())
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        // bounds the write as well as the connect
        tokio::time::timeout(self.timeout, self.send(data))
            .await
            .map_err(|_| PrintError::Timeout(format!("Write timeout: {}", self.addr)))??;

        info!("Print job sent");
        Ok(())
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => {
                debug!("Printer online");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_network_printer_from_addr() {
        let printer = NetworkPrinter::from_addr("192.168.1.100:9101").unwrap();
        assert_eq!(printer.addr().port(), 9101);

        let printer = NetworkPrinter::from_addr("192.168.1.100").unwrap();
        assert_eq!(printer.addr().port(), DEFAULT_RAW_PORT);
    }

    #[test]
    fn test_invalid_addr() {
        assert!(NetworkPrinter::from_addr("invalid").is_err());
        assert!(NetworkPrinter::from_addr("printer.local:9100").is_err());
        assert!(NetworkPrinter::from_addr("10.0.0.1:0").is_err());
        assert!(NetworkPrinter::from_addr("10.0.0.1:70000").is_err());
    }

    #[tokio::test]
    async fn test_print_delivers_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let printer = NetworkPrinter::new(Ipv4Addr::LOCALHOST, port);
        printer.print(b"\x1b@hello").await.unwrap();
        assert_eq!(server.await.unwrap(), b"\x1b@hello");
    }

    #[tokio::test]
    async fn test_unreachable_printer() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let printer = NetworkPrinter::new(Ipv4Addr::LOCALHOST, port)
            .with_timeout(Duration::from_millis(500));
        assert!(printer.print(b"x").await.is_err());
        assert!(!printer.is_online().await);
    }
}
