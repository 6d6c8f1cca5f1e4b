use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use guidance_bus::{EventRecord, Message, Publisher};
use guidance_logging::{JsonLogger, LogLevel, LogRecord};
use serde_json::Value;
use tokio::runtime::Handle;

/// Builder for delegator telemetry sinks.
pub struct DelegatorTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn Publisher<Value>>>,
}

impl DelegatorTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the minimum level written to the log file.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn Publisher<Value>>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<DelegatorTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(DelegatorTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by the loop and the runtime tasks.
#[derive(Clone)]
pub struct DelegatorTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for DelegatorTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatorTelemetry")
            .field("module", &self.inner.module)
            .field("log_path", &self.inner.logger.as_ref().map(JsonLogger::path))
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn Publisher<Value>>>,
}

impl DelegatorTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> DelegatorTelemetryBuilder {
        DelegatorTelemetryBuilder::new(module)
    }

    /// Module name stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Writes a structured record and mirrors it as a `tracing` event.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        let module = self.inner.module.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(module, %metadata, "{message}"),
            LogLevel::Info => tracing::info!(module, %metadata, "{message}"),
            LogLevel::Warn => tracing::warn!(module, %metadata, "{message}"),
            LogLevel::Error => tracing::error!(module, %metadata, "{message}"),
        }
        if let Some(logger) = &self.inner.logger {
            logger.log(&LogRecord::new(module, level, message).with_metadata(&metadata))?;
        }
        Ok(())
    }

    /// Publishes an event on the bus without waiting for delivery.
    ///
    /// Outside a tokio runtime the event is dropped.
    pub fn event(&self, event_type: &str, payload: Value) {
        let Some(publisher) = &self.inner.publisher else {
            return;
        };
        let record: EventRecord = Message::new(self.inner.module.clone(), event_type, payload);
        match Handle::try_current() {
            Ok(handle) => {
                let publisher = Arc::clone(publisher);
                handle.spawn(async move {
                    if let Err(err) = publisher.publish(record).await {
                        tracing::warn!(error = %err, "telemetry event publish failed");
                    }
                });
            }
            Err(_) => tracing::debug!(event_type, "no runtime; telemetry event dropped"),
        }
    }
}
