use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use phishguard_logging::{ConsoleLogger, JsonLogger, LogLevel, LogRecord};
use serde_json::Value;
use uuid::Uuid;

/// Builder for training telemetry sinks.
pub struct TrainingTelemetryBuilder {
    module: String,
    run_id: Option<Uuid>,
    log_path: Option<PathBuf>,
    console: Option<ConsoleLogger>,
}

impl TrainingTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            run_id: None,
            log_path: None,
            console: None,
        }
    }

    /// Uses a fixed run id instead of a random one.
    #[must_use]
    pub fn run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Appends JSON lines to this file.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Echoes records to a console logger.
    #[must_use]
    pub fn console(mut self, console: ConsoleLogger) -> Self {
        self.console = Some(console);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<TrainingTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?),
            None => None,
        };
        Ok(TrainingTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                run_id: self.run_id.unwrap_or_else(Uuid::new_v4),
                logger,
                console: self.console,
            }),
        })
    }
}

/// Telemetry handle passed through the pipeline stages. Every record carries
/// the run id.
#[derive(Clone)]
pub struct TrainingTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for TrainingTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingTelemetry")
            .field("module", &self.inner.module)
            .field("run_id", &self.inner.run_id)
            .finish_non_exhaustive()
    }
}

struct TelemetryInner {
    module: String,
    run_id: Uuid,
    logger: Option<JsonLogger>,
    console: Option<ConsoleLogger>,
}

impl TrainingTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> TrainingTelemetryBuilder {
        TrainingTelemetryBuilder::new(module)
    }

    /// Identifier stamped on every record of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Logs a structured record to every configured sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if self.inner.logger.is_none() && self.inner.console.is_none() {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message)
            .with_field("run_id", self.inner.run_id.to_string())
            .with_metadata(metadata);
        if let Some(logger) = &self.inner.logger {
            logger.log(&record)?;
        }
        if let Some(console) = &self.inner.console {
            console.log(&record)?;
        }
        Ok(())
    }
}

/// Logs through optional telemetry; sink failures are reported on stderr and
/// never abort training.
pub(crate) fn emit(
    telemetry: Option<&TrainingTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(tel) = telemetry {
        if let Err(err) = tel.log(level, message, metadata) {
            eprintln!("telemetry log failed: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_run_tagged_lines() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("train.log");
        let run_id = Uuid::new_v4();
        let telemetry = TrainingTelemetry::builder("learning")
            .run_id(run_id)
            .log_path(&path)
            .build()
            .unwrap();
        assert_eq!(telemetry.run_id(), run_id);
        telemetry
            .log(LogLevel::Info, "dataset_loaded", json!({ "rows": 100 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let record: LogRecord = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record.message, "dataset_loaded");
        assert_eq!(record.metadata["run_id"], json!(run_id.to_string()));
        assert_eq!(record.metadata["rows"], json!(100));
    }

    #[test]
    fn sinkless_telemetry_is_a_no_op() {
        let telemetry = TrainingTelemetry::builder("learning").build().unwrap();
        telemetry
            .log(LogLevel::Error, "ignored", json!({}))
            .unwrap();
        emit(Some(&telemetry), LogLevel::Info, "ignored", Value::Null);
        emit(None, LogLevel::Info, "ignored", Value::Null);
    }
}
