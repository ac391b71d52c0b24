use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

/// Crates whose events follow `--log-level`. Everything else is capped at warn.
const TRANSPORT_TARGETS: [&str; 5] =
    ["mmbi", "mmbiprims", "mmbi_channel", "mmbi_frame", "mmbi_binding"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    /// One flattened JSON object per event.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Debug and trace levels also switch on per-message transport events.
    pub fn wants_message_trace(self) -> bool {
        matches!(self, LogLevel::Debug | LogLevel::Trace)
    }

    fn targets(self) -> Targets {
        let level = self.as_filter();
        Targets::new()
            .with_targets(TRANSPORT_TARGETS.iter().map(|target| (*target, level)))
            .with_default(level.min(LevelFilter::WARN))
    }
}

/// Install the stderr subscriber. A subscriber that is already set wins.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(level.targets()))
        .try_init();
}
