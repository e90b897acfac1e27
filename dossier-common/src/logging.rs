//! Tracing subscriber initialization
//!
//! `RUST_LOG` (when set) overrides the configured level so operators can
//! raise verbosity for a single module without editing the config file.
//!
//! The configured subscriber can only be installed once the config is
//! loaded, so loading runs under a temporary stderr subscriber at the
//! default level (`with_startup_logging`).

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Build the filter used by `init_tracing`
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Install the global tracing subscriber
///
/// Logs go to stderr unless `config.file` is set, in which case they are
/// appended to that file without ANSI colors.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Tracing already initialized: {}", e)))
}

/// Run `f` with a stderr subscriber at the default level
///
/// Scoped to the current thread; the global subscriber is left unset.
pub fn with_startup_logging<T>(f: impl FnOnce() -> T) -> T {
    with_startup_writer(std::io::stderr, f)
}

fn with_startup_writer<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter =
        build_filter(&LoggingConfig::default()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_toml_config;
    use std::io;
    use std::path::Path;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_load_warnings_reach_startup_subscriber() {
        let capture = Capture::default();
        let writer = capture.clone();

        let loaded: LoggingConfig = with_startup_writer(
            move || writer.clone(),
            || load_toml_config(Some(Path::new("/nonexistent/dossier/config.toml"))),
        )
        .unwrap();
        assert_eq!(loaded, LoggingConfig::default());

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("not found, using compiled defaults"), "{}", output);
    }

    #[test]
    fn test_build_filter_accepts_plain_level() {
        let config = LoggingConfig::default();
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "dossier_research=debug,info".to_string(),
            file: None,
        };
        assert!(build_filter(&config).is_ok());
    }
}
