//! Cloud POS receipt printing: a WebSocket relay reachable by the browser
//! frontend, and a LAN print agent that probes a thermal printer and sends it
//! ESC/POS jobs when the frontend asks.

pub mod agent;
pub mod api;
pub mod config;
pub mod devices;
pub mod errors;
pub mod escpos;
pub mod printer;
pub mod probe;
pub mod receipt;
pub mod relay;
pub mod sentry_init;
pub mod status;
pub mod trigger;

pub use agent::{ChannelState, LocalAgent};
pub use config::{AgentConfig, AppConfig, RelayConfig};
pub use errors::{DaemonError, Result};
pub use printer::{PrintTransport, TcpTransport};
pub use probe::{probe, NetworkProbe, PrinterTarget, ProbeBackend, ProbeVerdict};
pub use relay::{recipients, FrontendOrigin, HubHandle, OriginClass, OriginClassifier};
pub use trigger::{PrintSettings, TriggerHandler, TriggerMatch, TriggerPayload};
