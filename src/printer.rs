use crate::errors::{DaemonError, Result};
use crate::escpos::{ends_with_cut, CUT};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(20);
/// How long to keep listening for printer output after the last write
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Sends rendered documents to a printer as one job
#[async_trait]
pub trait PrintTransport: Send + Sync {
    /// Write `documents` in order over a single connection.
    ///
    /// Stops at the first failure; bytes already written stay printed.
    async fn send(&self, host: &str, port: u16, documents: &[Vec<u8>]) -> Result<()>;
}

/// Raw TCP printing (port 9100 style). One connection per job, never pooled.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PrintTransport for TcpTransport {
    #[tracing::instrument(skip(self, documents), fields(documents = documents.len()))]
    async fn send(&self, host: &str, port: u16, documents: &[Vec<u8>]) -> Result<()> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| DaemonError::Transport(format!("Connect to {}:{} timed out", host, port)))?
            .map_err(|e| DaemonError::Transport(format!("Connect to {}:{} failed: {}", host, port, e)))?;

        info!("Connected to printer {}:{}", host, port);

        let (mut reader, mut writer) = stream.into_split();

        // Printers may push status bytes unprompted; they are diagnostics only
        let peer = format!("{}:{}", host, port);
        let listener = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => info!(
                        "Received data from printer {}: {}",
                        peer,
                        String::from_utf8_lossy(&buf[..n])
                    ),
                    Err(e) => {
                        debug!("Printer read on {} ended: {}", peer, e);
                        break;
                    }
                }
            }
        });

        let result = async {
            for (index, document) in documents.iter().enumerate() {
                write_with_timeout(&mut writer, document).await?;
                if !ends_with_cut(document) {
                    write_with_timeout(&mut writer, b"\n").await?;
                    write_with_timeout(&mut writer, &CUT).await?;
                }
                debug!("Wrote document {} ({} bytes)", index + 1, document.len());
            }
            writer
                .shutdown()
                .await
                .map_err(|e| DaemonError::Transport(format!("Close failed: {}", e)))
        }
        .await;

        match &result {
            Ok(()) => {
                if tokio::time::timeout(DRAIN_TIMEOUT, listener).await.is_err() {
                    debug!("Printer kept the connection open; closing");
                }
                info!("Connection to printer {}:{} closed", host, port);
            }
            Err(e) => {
                listener.abort();
                error!("Error printing to printer {}:{}: {}", host, port, e);
            }
        }

        result
    }
}

async fn write_with_timeout(writer: &mut tokio::net::tcp::OwnedWriteHalf, data: &[u8]) -> Result<()> {
    match tokio::time::timeout(WRITE_TIMEOUT, writer.write_all(data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DaemonError::Transport(format!("Write failed: {}", e))),
        Err(_) => {
            warn!("Printer write stalled for {:?}", WRITE_TIMEOUT);
            Err(DaemonError::Transport("Write timed out".to_string()))
        }
    }
}
