use std::time::Instant;
use tracing::{info, Level};

use crate::error::{ConnectorError, ConnectorResult};

pub fn parse_level(level: &str) -> ConnectorResult<Level> {
    level
        .parse::<Level>()
        .map_err(|_| ConnectorError::Configuration(format!("Unknown log level: {}", level)))
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(level: &str) -> ConnectorResult<()> {
    let level = parse_level(level)?;
    // A second call finds a subscriber already installed, which is fine
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init();
    Ok(())
}

/// Logs the start of a connector operation and, when dropped, its duration.
pub struct OperationLog {
    operation: &'static str,
    subject: String,
    start: Instant,
}

impl OperationLog {
    pub fn start(operation: &'static str, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        info!(target: "connector_ops", "{}::start {}", operation, subject);
        Self {
            operation,
            subject,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationLog {
    fn drop(&mut self) {
        info!(
            target: "connector_ops",
            "{}::finish {} {}ms",
            self.operation,
            self.subject,
            self.start.elapsed().as_millis()
        );
    }
}
