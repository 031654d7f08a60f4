//! Colored logging infrastructure for component identification
//!
//! Provides a custom tracing formatter that prefixes every line with the
//! pipeline stage it came from (slideshow build, soundtrack merge, probing).

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{Writer, FormatEvent, FormatFields},
    FmtContext,
};
use tracing_subscriber::registry::LookupSpan;

/// Component identifier for prefixing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Main,
    Build,
    Merge,
    Probe,
}

impl Component {
    /// Get the string representation for logging prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Main => "MAIN",
            Component::Build => "BUILD",
            Component::Merge => "MERGE",
            Component::Probe => "PROBE",
        }
    }

    /// Get the color style for this component
    pub fn color_style(&self) -> Style {
        match self {
            Component::Main => Style::new().cyan().bold(),
            Component::Build => Style::new().green().bold(),
            Component::Merge => Style::new().magenta().bold(),
            Component::Probe => Style::new().yellow().bold(),
        }
    }

    /// Component owning an event from the given module path
    pub fn for_target(target: &str, fallback: Component) -> Component {
        let module = target.rsplit("::").next().unwrap_or(target);
        match module {
            "encoder" | "writer" | "compose" | "pixel" | "source" => Component::Build,
            "muxer" | "export" | "composition" => Component::Merge,
            "probe" => Component::Probe,
            _ => fallback,
        }
    }
}

/// Custom formatter with component prefixes and colors
pub struct ColoredFormatter {
    /// Prefix for events outside the library stages
    pub component: Component,
}

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        // Timestamp (HH:MM:SS format)
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S").dimmed())?;

        let component = Component::for_target(metadata.target(), self.component);
        let prefix = format!("[{:5}]", component.as_str());
        write!(writer, "{} ", prefix.style(component.color_style()))?;

        let level = metadata.level();
        match *level {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", "WARN ".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", "INFO ".green().bold())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue().bold())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".dimmed().bold())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Initialize colored logging
///
/// `RUST_LOG` directives still apply; `verbose` lowers the default level to DEBUG.
/// Should be called once per process.
pub fn init_component_logger(component: Component, verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(ColoredFormatter { component })
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(level.into()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_for_target() {
        assert_eq!(Component::for_target("montage_processing::encoder", Component::Main), Component::Build);
        assert_eq!(Component::for_target("montage_processing::export", Component::Main), Component::Merge);
        assert_eq!(Component::for_target("montage_processing::probe", Component::Main), Component::Probe);
        assert_eq!(Component::for_target("montage_source::source", Component::Main), Component::Build);
        assert_eq!(Component::for_target("montage", Component::Main), Component::Main);
    }

    #[test]
    fn test_prefixes() {
        let prefixes: Vec<_> = [Component::Main, Component::Build, Component::Merge, Component::Probe]
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(prefixes, vec!["MAIN", "BUILD", "MERGE", "PROBE"]);
    }
}
