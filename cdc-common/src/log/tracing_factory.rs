use std::io;
use std::sync::Once;

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub enum OutputType {
    Stdout,
    RollingFile,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    debug: bool,
    output_type: OutputType,
    level: Level,
    log_dir: Option<String>,
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new(true, OutputType::Stdout, None)
    }
}

impl TracingFactoryOptions {
    pub fn new(debug: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if debug { Level::DEBUG } else { Level::INFO };
        TracingFactoryOptions { debug, output_type, level, log_dir }
    }

    pub fn get_log_dir(&self) -> &str {
        self.log_dir.as_deref().unwrap_or("")
    }
}

/// One-shot global `tracing` subscriber installer.
///
/// Mirrors the rest of this workspace: `init_log`/`init_log_with_options` is
/// idempotent, safe to call from every binary entry point and every test,
/// and routes through either a pretty stdout writer or a daily-rolling file
/// writer that also mirrors to stdout in debug mode.
#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

impl TracingFactory {
    pub fn init_log(debug: bool) -> Self {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new(debug, OutputType::Stdout, None))
    }

    pub fn init_log_with_options(opt: TracingFactoryOptions) -> Self {
        let mut opts = opt;
        if opts.log_dir.is_none() {
            opts.log_dir = Some(String::from("/tmp/cdc-pipeline/logs"));
        }

        INIT.call_once(|| {
            let format = fmt::format()
                .pretty()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            match opts.output_type {
                OutputType::Stdout => {
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .pretty()
                        .try_init();
                }
                OutputType::RollingFile => {
                    let dir = opts.log_dir.as_deref().unwrap_or("/tmp/cdc-pipeline/logs");
                    let file_appender = rolling::daily(format!("{}/pipeline", dir), "pipeline.log");
                    let merge = file_appender.and(io::stdout);

                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .pretty()
                        .with_writer(merge)
                        .try_init();
                }
            }
        });

        TracingFactory { options: opts }
    }

    pub fn get_log_dir(&self) -> &str {
        self.options.get_log_dir()
    }
}

#[cfg(test)]
mod test {
    use tracing::{debug, error, info, warn};

    use super::TracingFactory;

    #[test]
    fn init_is_idempotent() {
        TracingFactory::init_log(true);
        TracingFactory::init_log(true);

        debug!("tracing factory test: {:?}", "test");
        info!("tracing factory test: {:?}", "test");
        warn!("tracing factory test: {:?}", "test");
        error!("tracing factory test: {:?}", "test");
    }
}
