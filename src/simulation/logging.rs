use std::io;
use tracing::dispatcher::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::{fmt, registry};

use crate::simulation::config::{Config, Logging};

// This is a helper struct to store the logger guards. When they are dropped, logging can be reset.
#[allow(dead_code)]
pub struct LogGuards {
    log_guard: Option<WorkerGuard>,
    default: DefaultGuard,
}

pub fn init_std_out_logging_thread_local() -> DefaultGuard {
    let collector = tracing_subscriber::registry().with(
        fmt::Layer::new()
            .with_writer(io::stdout)
            .with_filter(LevelFilter::INFO),
    );
    tracing::subscriber::set_default(collector)
}

/// Console logging plus, if configured, a json log file in the output directory. The subscriber is
/// only installed for the calling thread.
pub fn init_logging(config: &Config) -> LogGuards {
    let dir = config.output().output_dir;

    let (log_layer, log_guard) = if Logging::Info == config.output().logging {
        let log_file_appender = rolling::never(&dir, "log_joint_trips.txt");
        let (log_file, log_guard) = non_blocking(log_file_appender);
        let layer = fmt::Layer::new()
            .with_writer(log_file)
            .json()
            .with_ansi(false)
            .with_filter(LevelFilter::INFO);
        (Some(layer), Some(log_guard))
    } else {
        (None, None)
    };

    let console_layer = fmt::layer()
        .with_writer(io::stdout)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(LevelFilter::INFO);

    // Add `Optional`s. If None, then the corresponding layer is not added.
    let collector = registry().with(log_layer).with(console_layer);

    let default = tracing::subscriber::set_default(collector);

    LogGuards { log_guard, default }
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::{Config, Logging, Output};
    use crate::simulation::logging::init_logging;
    use tracing::info;

    #[test]
    fn writes_log_file_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: dir.path().to_path_buf(),
            logging: Logging::Info,
        });

        {
            let _guards = init_logging(&config);
            info!("joint trips logging test");
        }

        let content = std::fs::read_to_string(dir.path().join("log_joint_trips.txt")).unwrap();
        assert!(content.contains("joint trips logging test"));
    }

    #[test]
    fn no_log_file_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: dir.path().to_path_buf(),
            logging: Logging::None,
        });

        {
            let _guards = init_logging(&config);
            info!("not written");
        }

        assert!(!dir.path().join("log_joint_trips.txt").exists());
    }
}
