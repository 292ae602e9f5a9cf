pub mod cli;
pub mod controller;
pub mod error;
pub mod events;
pub mod health;
pub mod report;
pub mod transport;

#[cfg(test)]
mod testing;

pub use controller::{ControllerState, JobController, PollPolicy};
pub use events::{AuditEvent, JobObserver, NoopObserver};
pub use health::{HealthMonitor, HealthReading};
pub use report::ReportAssembler;
pub use transport::{AuditApi, AuditClient, ClientConfig};
