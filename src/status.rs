/// Status text sent back to the frontend - single source of truth.
/// The frontend only displays messages starting with this prefix.
pub const STATUS_PREFIX: &str = "Printer status: ";

pub const NOT_RESPONDING: &str = "Printer is not responding to ping";
pub const NO_KNOWN_PORT: &str = "Printer is reachable but no standard printing ports are open";
pub const PROBE_FAILED: &str = "Error checking printer status";

use crate::probe::ProbeVerdict;

/// Human-readable reachability description for a verdict
pub fn describe(verdict: &ProbeVerdict) -> String {
    match verdict {
        ProbeVerdict::Unreachable => NOT_RESPONDING.to_string(),
        ProbeVerdict::ReachableOnPort(port) => format!("Printer is reachable on port {}", port),
        ProbeVerdict::ReachableViaSnmp(value) => format!("Printer status via SNMP: {}", value),
        ProbeVerdict::ReachableNoKnownPort => NO_KNOWN_PORT.to_string(),
        ProbeVerdict::ProbeError(_) => PROBE_FAILED.to_string(),
    }
}

/// Full status message for a verdict
pub fn status_message(verdict: &ProbeVerdict) -> String {
    format!("{}{}", STATUS_PREFIX, describe(verdict))
}

/// Status message for a print job that failed after a positive probe
pub fn print_failed(detail: &str) -> String {
    format!("{}Print job failed: {}", STATUS_PREFIX, detail)
}

/// Status message for a fault caught at the trigger boundary
pub fn trigger_failed() -> String {
    format!("{}{}", STATUS_PREFIX, PROBE_FAILED)
}
