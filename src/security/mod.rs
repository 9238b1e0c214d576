//! Security monitor (spec §4.7): threshold-based alerting over the
//! security-relevant events every other subsystem reports into it.

pub mod monitor;

pub use monitor::{Alert, AlertHandler, AlertSeverity, NoopHandler, SecurityEvent, SecurityMonitor};
