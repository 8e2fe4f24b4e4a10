use std::fmt;
use std::io::IsTerminal;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const COMPONENT_WIDTH: usize = 22;
const LEVEL_WIDTH: usize = 7;

/// Tag an info event with a `component` field
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Tag a warn event with a `component` field
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Tag a debug event with a `component` field
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Line formatter: `[timestamp] [component] [level] message`
pub struct StreamLogFormatter {
    app_name: String,
    color_enabled: bool,
}

impl StreamLogFormatter {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            color_enabled: std::io::stderr().is_terminal()
                && std::env::var("TERM").map_or(true, |term| term != "dumb"),
        }
    }

    fn component_column(&self, component: Option<&str>, target: &str) -> String {
        let name = match component {
            Some(component) => format!("{}/{}", self.app_name, component),
            // control_session::jitter -> stream-control/jitter
            None => match target.rsplit("::").next() {
                Some(module) if target.contains("::") => format!("{}/{}", self.app_name, module),
                _ => self.app_name.clone(),
            },
        };
        fit(&name, COMPONENT_WIDTH)
    }

    fn level_color(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

fn fit(name: &str, width: usize) -> String {
    if name.chars().count() > width {
        let cut: String = name.chars().take(width - 1).collect();
        format!("{}…", cut)
    } else {
        format!("{:<width$}", name, width = width)
    }
}

impl<S, N> FormatEvent<S, N> for StreamLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let metadata = event.metadata();

        let mut fields = EventFields::default();
        event.record(&mut fields);

        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}]{} [{}] [{}{:<width$}{}] {}",
            cyan,
            timestamp,
            reset,
            self.component_column(fields.component.as_deref(), metadata.target()),
            self.level_color(metadata.level()),
            metadata.level().as_str(),
            reset,
            fields.message,
            width = LEVEL_WIDTH,
        )?;
        for (name, value) in &fields.extra {
            write!(writer, " {}={}", name, value)?;
        }
        writeln!(writer)
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    component: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            // format_args! messages arrive here and print without quotes
            "message" => self.message = format!("{:?}", value),
            "component" => self.component = Some(format!("{:?}", value).trim_matches('"').to_string()),
            name => self.extra.push((name, format!("{:?}", value))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_column() {
        let formatter = StreamLogFormatter {
            app_name: "stream-control".to_string(),
            color_enabled: false,
        };

        let column = formatter.component_column(Some("events"), "stream_control");
        assert_eq!(column.trim_end(), "stream-control/events");
        assert_eq!(column.chars().count(), COMPONENT_WIDTH);

        let column = formatter.component_column(None, "control_session::jitter");
        assert_eq!(column.trim_end(), "stream-control/jitter");

        let column = formatter.component_column(None, "stream_control");
        assert_eq!(column.trim_end(), "stream-control");
    }

    #[test]
    fn test_long_names_truncated() {
        let fitted = fit("stream-control/a-very-long-component", 10);
        assert_eq!(fitted.chars().count(), 10);
        assert!(fitted.ends_with('…'));
    }
}
