// Common test utilities and fixtures

use async_trait::async_trait;
use pos_print_relay::config::AgentConfig;
use pos_print_relay::errors::{DaemonError, Result};
use pos_print_relay::printer::PrintTransport;
use pos_print_relay::probe::{PrinterTarget, ProbeBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub const PRINTER_HOST: &str = "10.0.0.50";

/// Ordered record of backend calls, shared between mocks
pub type Journal = Arc<RwLock<Vec<String>>>;

/// Scripted probe backend that records every check it is asked to run
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockProbe {
    /// `None` makes the ping check itself fail
    pub ping_reply: Arc<RwLock<Option<bool>>>,
    pub open_ports: Arc<RwLock<Vec<u16>>>,
    pub snmp_value: Arc<RwLock<Option<String>>>,
    pub ping_count: Arc<RwLock<u32>>,
    pub ports_tried: Arc<RwLock<Vec<u16>>>,
    pub snmp_count: Arc<RwLock<u32>>,
    /// The next ping panics instead of answering
    pub panic_next_ping: Arc<RwLock<bool>>,
    pub journal: Journal,
}

#[allow(dead_code)]
impl MockProbe {
    pub fn scripted(ping: Option<bool>, open_ports: &[u16], snmp: Option<&str>) -> Self {
        Self {
            ping_reply: Arc::new(RwLock::new(ping)),
            open_ports: Arc::new(RwLock::new(open_ports.to_vec())),
            snmp_value: Arc::new(RwLock::new(snmp.map(str::to_string))),
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::scripted(Some(false), &[], None)
    }

    pub fn open_on(ports: &[u16]) -> Self {
        Self::scripted(Some(true), ports, None)
    }

    pub fn snmp_only(value: &str) -> Self {
        Self::scripted(Some(true), &[], Some(value))
    }

    pub fn failing() -> Self {
        Self::scripted(None, &[], None)
    }

    pub fn with_journal(self, journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..self
        }
    }

    pub async fn panic_on_next_ping(&self) {
        *self.panic_next_ping.write().await = true;
    }

    pub async fn ping_count(&self) -> u32 {
        *self.ping_count.read().await
    }

    pub async fn ports_tried(&self) -> Vec<u16> {
        self.ports_tried.read().await.clone()
    }

    pub async fn snmp_count(&self) -> u32 {
        *self.snmp_count.read().await
    }
}

#[async_trait]
impl ProbeBackend for MockProbe {
    async fn ping(&self, _host: &str) -> Result<bool> {
        if std::mem::take(&mut *self.panic_next_ping.write().await) {
            panic!("Simulated probe panic");
        }
        *self.ping_count.write().await += 1;
        self.journal.write().await.push("ping".to_string());
        match *self.ping_reply.read().await {
            Some(reply) => Ok(reply),
            None => Err(DaemonError::Probe("Simulated ping failure".to_string())),
        }
    }

    async fn port_open(&self, _host: &str, port: u16) -> bool {
        self.ports_tried.write().await.push(port);
        self.open_ports.read().await.contains(&port)
    }

    async fn snmp_status(&self, _host: &str) -> Option<String> {
        *self.snmp_count.write().await += 1;
        self.snmp_value.read().await.clone()
    }
}

/// One recorded print job
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct SentJob {
    pub host: String,
    pub port: u16,
    pub documents: Vec<Vec<u8>>,
}

/// Print transport that keeps every job in memory
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct MockTransport {
    pub jobs: Arc<RwLock<Vec<SentJob>>>,
    pub should_fail: Arc<RwLock<bool>>,
    /// How long each job takes to "print"
    pub delay: Arc<RwLock<Duration>>,
    pub journal: Journal,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: Arc::new(RwLock::new(true)),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration, journal: &Journal) -> Self {
        Self {
            delay: Arc::new(RwLock::new(delay)),
            journal: journal.clone(),
            ..Self::default()
        }
    }

    pub async fn jobs(&self) -> Vec<SentJob> {
        self.jobs.read().await.clone()
    }
}

#[async_trait]
impl PrintTransport for MockTransport {
    async fn send(&self, host: &str, port: u16, documents: &[Vec<u8>]) -> Result<()> {
        if *self.should_fail.read().await {
            return Err(DaemonError::Transport("Simulated printer failure".to_string()));
        }

        self.journal.write().await.push("send start".to_string());
        let delay = *self.delay.read().await;
        tokio::time::sleep(delay).await;

        self.jobs.write().await.push(SentJob {
            host: host.to_string(),
            port,
            documents: documents.to_vec(),
        });
        self.journal.write().await.push("send end".to_string());
        Ok(())
    }
}

/// Agent config pointed at the test printer host
#[allow(dead_code)]
pub fn create_test_agent_config() -> AgentConfig {
    AgentConfig {
        printer: PrinterTarget {
            host: PRINTER_HOST.to_string(),
            candidate_ports: vec![631, 9100, 515],
        },
        reconnect_delay_secs: 1,
        ..AgentConfig::default()
    }
}
