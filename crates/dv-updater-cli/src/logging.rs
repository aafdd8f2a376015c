use std::fmt::Write as _;

use dv_updater_config::config::{LogConfig, LogFormat};
use nu_ansi_term::Color::{Blue, Cyan, Magenta, Red, Yellow};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        writer::MakeWriterExt,
        FmtContext, FormatEvent, FormatFields,
    },
    registry::LookupSpan,
};

use crate::{cli::Args, utils::Colored};

/// Collects the message and any structured fields of an event.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: String,
}

impl tracing::field::Visit for EventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

pub struct CustomFormatter;

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        match *event.metadata().level() {
            Level::TRACE => write!(writer, "{} ", Colored(Magenta, "[TRACE]")),
            Level::DEBUG => write!(writer, "{} ", Colored(Blue, "[DEBUG]")),
            Level::INFO => write!(writer, ""),
            Level::WARN => write!(writer, "{} ", Colored(Yellow, "[WARN]")),
            Level::ERROR => write!(writer, "{} ", Colored(Red, "[ERROR]")),
        }?;

        write!(writer, "{}", visitor.message.unwrap_or_default())?;
        if visitor.fields.is_empty() {
            writeln!(writer)
        } else {
            writeln!(writer, "{}", Colored(Cyan, visitor.fields))
        }
    }
}

/// Filter directive for our crates: flags win over the configured level.
fn filter_directive(args: &Args, log: &LogConfig) -> String {
    let level = if args.quiet {
        Level::ERROR.to_string()
    } else if args.verbose >= 2 {
        Level::TRACE.to_string()
    } else if args.verbose == 1 {
        Level::DEBUG.to_string()
    } else {
        log.level.clone()
    };
    format!("dv_updater={level}")
}

pub fn setup_logging(args: &Args, log: &LogConfig) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| filter_directive(args, log));
    // INFO goes to stdout, everything else to stderr
    let writer = std::io::stderr
        .with_filter(|meta| meta.level() != &Level::INFO)
        .or_else(std::io::stdout);

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(writer);

    let subscriber: Box<dyn Subscriber + Send + Sync> =
        if args.json || log.format == LogFormat::Json {
            Box::new(builder.json().flatten_event(true).finish())
        } else {
            Box::new(
                builder
                    .compact()
                    .without_time()
                    .event_format(CustomFormatter)
                    .finish(),
            )
        };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(flags: &[&str]) -> Args {
        let mut argv = vec!["dv-updater"];
        argv.extend_from_slice(flags);
        argv.push("version");
        Args::parse_from(argv)
    }

    #[test]
    fn test_filter_directive() {
        let log = LogConfig {
            level: "warn".to_string(),
            ..LogConfig::default()
        };

        assert_eq!(filter_directive(&args(&[]), &log), "dv_updater=warn");
        assert_eq!(filter_directive(&args(&["-v"]), &log), "dv_updater=DEBUG");
        assert_eq!(filter_directive(&args(&["-vv"]), &log), "dv_updater=TRACE");
        assert_eq!(filter_directive(&args(&["-q", "-v"]), &log), "dv_updater=ERROR");
    }
}
