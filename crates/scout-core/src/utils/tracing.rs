use chrono::Local;
use std::io;
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Where log output should go.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Raise the default level to `debug` when `RUST_LOG` is unset.
    pub debug: bool,
    /// Directory for a timestamp-named log file. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
}

fn build_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug { "debug" } else { "info" };
        EnvFilter::new(format!("scout={level},scout_core={level},rmcp=warn"))
    })
}

/// Initialize the tracing system. Filtering is taken from the RUST_LOG
/// environment variable when present.
pub fn init_tracing(options: &LogOptions) -> io::Result<()> {
    let filter = build_filter(options.debug);

    if let Some(log_dir) = &options.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let file_name = format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let file_appender = rolling::never(log_dir, &file_name);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::Layer::new()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter);

        tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

        tracing::debug!(
            target: "scout_core::utils::tracing",
            path = %log_dir.join(file_name).display(),
            "Tracing initialized with file output"
        );
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::Layer::default()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .with(filter);

        tracing::subscriber::set_global_default(subscriber).map_err(io::Error::other)?;

        tracing::debug!(
            target: "scout_core::utils::tracing",
            "Tracing initialized with stderr output"
        );
    }

    Ok(())
}
