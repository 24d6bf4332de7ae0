use tracing::{error, warn};

/// Collects user-visible warnings and errors raised while processing.
///
/// Messages are mirrored to `tracing` as they arrive and kept in arrival
/// order until drained by the caller.
#[derive(Debug, Default)]
pub struct MessagesAggregator {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl MessagesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{msg}");
        self.warnings.push(msg);
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("{msg}");
        self.errors.push(msg);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn drain_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn drain_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }
}
