//! A [`tracing_subscriber::Layer`] ([`RouterLayer`]) routing [`tracing`] events through a
//! [`Logger`].

use std::fmt;

use serde_json::Value;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::{Caller, Logger, Severity};

const MESSAGE: &str = "message";

/// Converts each event into a record for its [`Logger`].
///
/// `TRACE` events are logged as `debug`. The event target names the record unless the logger
/// was [`named`][Logger::named], and the event's source location becomes the record's caller.
/// Span fields are not collected.
#[derive(Clone, Debug)]
pub struct RouterLayer {
    logger: Logger,
}

impl RouterLayer {
    /// Creates a new [`RouterLayer`] forwarding events to `logger`.
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl From<Logger> for RouterLayer {
    fn from(logger: Logger) -> Self {
        Self::new(logger)
    }
}

impl Logger {
    /// A [`RouterLayer`] forwarding events to this logger.
    pub fn layer(&self) -> RouterLayer {
        RouterLayer::new(self.clone())
    }
}

fn severity(level: Level) -> Severity {
    match level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warn,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

impl<S: Subscriber> Layer<S> for RouterLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let severity = severity(*metadata.level());
        if !self.logger.enabled(severity) {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);

        let caller = metadata
            .file()
            .zip(metadata.line())
            .map(|(file, line)| Caller { file, line });

        self.logger.emit(
            severity,
            fields.message.as_deref().unwrap_or_default(),
            &fields.values,
            caller,
            Some(metadata.target()),
        );
    }
}

/// The message and the other fields of one event, in recording order.
#[derive(Debug, Default)]
struct EventFields {
    message: Option<String>,
    values: Vec<(&'static str, Value)>,
}

impl EventFields {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            // Fields of events converted from `log` records.
            name if name.starts_with("log.") => (),
            name => {
                let name = name.strip_prefix("r#").unwrap_or(name);
                self.values.push((name, value));
            }
        }
    }
}

impl Visit for EventFields {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE {
            self.message = Some(value.to_string());
        } else {
            self.record_value(field, Value::from(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE {
            if self.message.is_none() {
                self.message = Some(format!("{value:?}"));
            }
        } else {
            self.record_value(field, Value::from(format!("{value:?}")));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;
    use crate::{ExactLevel, LoggerError, Record, Sink, Tee};

    #[derive(Debug)]
    struct Captured {
        severity: Severity,
        message: String,
        name: Option<String>,
        fields: Vec<(String, Value)>,
        caller: Option<String>,
    }

    #[derive(Debug, Default)]
    struct Capture(Mutex<Vec<Captured>>);

    impl Sink for Capture {
        fn write_record(&self, record: &Record<'_>) -> Result<(), LoggerError> {
            self.0.lock().push(Captured {
                severity: record.severity,
                message: record.message.to_string(),
                name: record.logger_name.map(str::to_string),
                fields: record
                    .attributes()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect(),
                caller: record.caller.map(|caller| caller.to_string()),
            });
            Ok(())
        }

        fn sync(&self) -> Result<(), LoggerError> {
            Ok(())
        }
    }

    fn capturing_logger(minimum: Severity) -> (Logger, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let mut tee = Tee::new();
        for severity in Severity::ARCHIVED {
            tee.push(capture.clone(), ExactLevel::new(severity, minimum));
        }
        (Logger::new(tee, None), capture)
    }

    #[test]
    fn events_become_records() {
        let (logger, capture) = capturing_logger(Severity::Debug);
        let subscriber = tracing_subscriber::registry().with(logger.layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(
                target: "billing",
                r#type = "card",
                attempts = 3_u64,
                "payment declined"
            );
        });

        let captured = capture.0.lock();
        let [event] = captured.as_slice() else {
            panic!("expected exactly one record, got {captured:?}");
        };
        assert_eq!(event.severity, Severity::Warn);
        assert_eq!(event.message, "payment declined");
        assert_eq!(event.name.as_deref(), Some("billing"));
        assert_eq!(
            event.fields,
            [
                ("type".to_string(), json!("card")),
                ("attempts".to_string(), json!(3))
            ]
        );
        assert!(event.caller.as_deref().is_some_and(|caller| caller.contains("layer.rs:")));
    }

    #[test]
    fn trace_is_logged_as_debug() {
        let (logger, capture) = capturing_logger(Severity::Debug);
        let subscriber = tracing_subscriber::registry().with(RouterLayer::from(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!("very detailed");
        });

        let severities: Vec<Severity> = capture.0.lock().iter().map(|c| c.severity).collect();
        assert_eq!(severities, [Severity::Debug]);
    }

    #[test]
    fn minimum_severity_applies_to_events() {
        let (logger, capture) = capturing_logger(Severity::Warn);
        let subscriber = tracing_subscriber::registry().with(logger.named("app").layer());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hidden");
            tracing::error!(code = 500, "shown");
        });

        let captured = capture.0.lock();
        let [event] = captured.as_slice() else {
            panic!("expected exactly one record, got {captured:?}");
        };
        assert_eq!(event.message, "shown");
        assert_eq!(event.name.as_deref(), Some("app"));
        assert_eq!(event.fields, [("code".to_string(), json!(500))]);
    }
}
