//! Printer reachability probe cascade.
//!
//! Three checks run in order and stop at the first definitive answer:
//! ICMP ping, TCP connect to each candidate port, then one SNMP GET.
//! A host that does not answer ping is never port-scanned or queried.

use crate::errors::{DaemonError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// prtMarkerLifeCount (RFC 3805 Printer MIB), answered by most network printers
pub const PRINTER_STATUS_OID: &[u64] = &[1, 3, 6, 1, 2, 1, 43, 10, 2, 1, 4, 1, 1];

/// Printer host plus the ports that indicate a print service, in probe order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterTarget {
    pub host: String,
    pub candidate_ports: Vec<u16>,
}

impl Default for PrinterTarget {
    fn default() -> Self {
        Self {
            host: "192.168.1.106".to_string(),
            candidate_ports: vec![631, 9100, 515],
        }
    }
}

/// Outcome of one probe. Negative verdicts are answers, not faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Unreachable,
    ReachableOnPort(u16),
    ReachableViaSnmp(String),
    ReachableNoKnownPort,
    ProbeError(String),
}

impl ProbeVerdict {
    /// True for every verdict that allows printing
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ProbeVerdict::Unreachable | ProbeVerdict::ProbeError(_))
    }
}

/// Individual network checks the cascade is built from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeBackend: Send + Sync {
    /// ICMP echo. `Ok(false)` means no reply; `Err` means the check itself failed.
    async fn ping(&self, host: &str) -> Result<bool>;

    /// TCP connect; timeouts and refusals are reported as closed
    async fn port_open(&self, host: &str, port: u16) -> bool;

    /// Printer status over SNMP, `None` on error or timeout
    async fn snmp_status(&self, host: &str) -> Option<String>;
}

/// Run the cascade against `target`
#[tracing::instrument(skip(backend), fields(host = %target.host))]
pub async fn probe<B: ProbeBackend + ?Sized>(backend: &B, target: &PrinterTarget) -> ProbeVerdict {
    match backend.ping(&target.host).await {
        Ok(true) => debug!("Ping reply from {}", target.host),
        Ok(false) => {
            info!("Printer {} is not responding to ping", target.host);
            return ProbeVerdict::Unreachable;
        }
        Err(e) => {
            warn!("Ping check failed for {}: {}", target.host, e);
            return ProbeVerdict::ProbeError(e.to_string());
        }
    }

    for &port in &target.candidate_ports {
        if backend.port_open(&target.host, port).await {
            info!("Printer {} is reachable on port {}", target.host, port);
            return ProbeVerdict::ReachableOnPort(port);
        }
        debug!("Port {} closed on {}", port, target.host);
    }

    if let Some(status) = backend.snmp_status(&target.host).await {
        info!("Printer {} answered SNMP: {}", target.host, status);
        return ProbeVerdict::ReachableViaSnmp(status);
    }

    info!("Printer {} answers ping but no printing service responded", target.host);
    ProbeVerdict::ReachableNoKnownPort
}

/// Per-stage timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeTimeouts {
    pub ping_secs: u64,
    pub port_millis: u64,
    pub snmp_secs: u64,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            ping_secs: 2,
            port_millis: 1000,
            snmp_secs: 5,
        }
    }
}

/// Production backend: system `ping`, tokio TCP, SNMP v1
pub struct NetworkProbe {
    timeouts: ProbeTimeouts,
    community: String,
}

impl NetworkProbe {
    pub fn new(timeouts: ProbeTimeouts, community: impl Into<String>) -> Self {
        Self {
            timeouts,
            community: community.into(),
        }
    }

    fn ping_command(&self, host: &str) -> Command {
        let secs = self.timeouts.ping_secs.max(1);
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            cmd.args(["-n", "1", "-w", &(secs * 1000).to_string(), host]);
        } else if cfg!(target_os = "macos") {
            cmd.args(["-c", "1", "-t", &secs.to_string(), host]);
        } else {
            cmd.args(["-c", "1", "-W", &secs.to_string(), host]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProbeBackend for NetworkProbe {
    async fn ping(&self, host: &str) -> Result<bool> {
        let mut cmd = self.ping_command(host);
        // The command enforces its own timeout; this bounds a hung process
        let limit = Duration::from_secs(self.timeouts.ping_secs.max(1) + 1);

        match tokio::time::timeout(limit, cmd.status()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(e)) => Err(DaemonError::Probe(format!("Failed to run ping: {}", e))),
            Err(_) => Ok(false),
        }
    }

    async fn port_open(&self, host: &str, port: u16) -> bool {
        let limit = Duration::from_millis(self.timeouts.port_millis);
        match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                debug!("Connect to {}:{} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!("Connect to {}:{} timed out", host, port);
                false
            }
        }
    }

    async fn snmp_status(&self, host: &str) -> Option<String> {
        let limit = Duration::from_secs(self.timeouts.snmp_secs);
        let address = format!("{}:161", host);
        let community = self.community.clone();

        // snmp2's session is blocking; the outer timeout fires even if it never returns
        let query = tokio::task::spawn_blocking(move || snmp_get(&address, &community, limit));

        match tokio::time::timeout(limit, query).await {
            Ok(Ok(Ok(value))) => value,
            Ok(Ok(Err(e))) => {
                debug!("SNMP query to {} failed: {}", host, e);
                None
            }
            Ok(Err(e)) => {
                warn!("SNMP worker for {} panicked: {}", host, e);
                None
            }
            Err(_) => {
                debug!("SNMP query to {} timed out", host);
                None
            }
        }
    }
}

/// Blocking SNMP v1 GET of [`PRINTER_STATUS_OID`]
fn snmp_get(address: &str, community: &str, timeout: Duration) -> Result<Option<String>> {
    let oid = snmp2::Oid::from(PRINTER_STATUS_OID)
        .map_err(|e| DaemonError::Probe(format!("Invalid OID: {:?}", e)))?;

    let mut session = snmp2::SyncSession::new_v1(address, community.as_bytes(), Some(timeout), 0)
        .map_err(|e| DaemonError::Probe(format!("SNMP session: {}", e)))?;

    let mut response = session
        .get(&oid)
        .map_err(|e| DaemonError::Probe(format!("SNMP get: {:?}", e)))?;

    Ok(response
        .varbinds
        .next()
        .and_then(|(_, value)| describe_value(&value)))
}

/// Display form of a varbind value; varbind errors yield `None`
fn describe_value(value: &snmp2::Value) -> Option<String> {
    use snmp2::Value;

    match value {
        Value::Integer(n) => Some(n.to_string()),
        Value::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Counter32(n) | Value::Unsigned32(n) | Value::Timeticks(n) => Some(n.to_string()),
        Value::Counter64(n) => Some(n.to_string()),
        Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView | Value::Null => None,
        other => Some(format!("{:?}", other)),
    }
}
