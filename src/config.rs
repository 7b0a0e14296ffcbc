use crate::errors::{DaemonError, Result};
use crate::escpos::PaperWidth;
use crate::probe::{PrinterTarget, ProbeTimeouts};
use crate::receipt::{DocumentPlan, StoreProfile};
use crate::trigger::{PrintSettings, TriggerMatch};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub relay_url: String,
    pub printer: PrinterTarget,
    /// Raw print port documents are sent to
    pub print_port: u16,
    pub probe_timeouts: ProbeTimeouts,
    pub snmp_community: String,
    pub reconnect_delay_secs: u64,
    /// Sent once each time the relay channel opens
    pub greeting: Option<String>,
    pub trigger: TriggerMatch,
    pub documents: DocumentPlan,
    pub paper_width: PaperWidth,
    pub store: StoreProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// Origin header value identifying the frontend
    pub frontend_origin: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:8086".to_string(),
            printer: PrinterTarget::default(),
            print_port: 9100,
            probe_timeouts: ProbeTimeouts::default(),
            snmp_community: "public".to_string(),
            reconnect_delay_secs: 5,
            greeting: Some("Hello from the print agent!".to_string()),
            trigger: TriggerMatch::default(),
            documents: DocumentPlan::default(),
            paper_width: PaperWidth::default(),
            store: StoreProfile::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8086".to_string(),
            frontend_origin: "https://g-pos.vercel.app".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn print_settings(&self) -> PrintSettings {
        PrintSettings {
            target: self.printer.clone(),
            print_port: self.print_port,
            plan: self.documents.clone(),
            store: self.store.clone(),
            paper_width: self.paper_width,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.printer.host.trim().is_empty() {
            return Err(DaemonError::Config("printer.host must not be empty".to_string()));
        }
        url::Url::parse(&self.relay_url)
            .map_err(|e| DaemonError::Config(format!("Invalid relay_url {}: {}", self.relay_url, e)))
            .and_then(|url| match url.scheme() {
                "ws" | "wss" => Ok(()),
                other => Err(DaemonError::Config(format!(
                    "relay_url must use ws or wss, got {}",
                    other
                ))),
            })
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::config_dir()
                .map(|p| p.join("POS Print Relay"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            dirs::config_dir()
                .map(|p| p.join("pos-print-relay"))
                .unwrap_or_else(|| PathBuf::from("."))
        };

        config_dir.join("config.json")
    }

    /// Load from an explicit file, or from the default location if present.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !path.exists() {
            if required {
                return Err(DaemonError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| DaemonError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }
}
