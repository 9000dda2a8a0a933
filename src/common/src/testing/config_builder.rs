//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, NonNumericPolicy, Precision};

/// Builder for creating test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .with_precision(Precision::Seconds)
///     .rejecting_non_numeric()
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Defaults with in-memory storage and a loopback listen address.
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.http.listen = "127.0.0.1:0".to_string();
        config.storage.dsn = "memory://".to_string();
        Self { config }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.config.ingest.precision = precision;
        self
    }

    pub fn rejecting_non_numeric(mut self) -> Self {
        self.config.ingest.non_numeric = NonNumericPolicy::Reject;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.request_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.config.http.max_body_size = bytes;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
