//! Process-wide tracing setup for the workspace orchestrator binaries.
//!
//! Output is controlled by environment variables:
//!
//! * `WS_LOG_LEVEL` - filter directive, default `info` (`RUST_LOG` wins when set)
//! * `WS_LOG_OUTPUT` - `console`, `file`, `both` or `none`, default `console`
//! * `WS_LOG_FORMAT` - `human` or `json`, default `human`
//! * `WS_LOG_FILE` - log file path, default `/tmp/ws-orchestrator.log`

use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive, fmt::MakeWriter, prelude::*, registry, EnvFilter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: LogOutput::Console,
            format: LogFormat::Human,
            file_path: PathBuf::from("/tmp/ws-orchestrator.log"),
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source; unknown values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let output = match lookup("WS_LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("none") => LogOutput::None,
            _ => LogOutput::Console,
        };

        let format = match lookup("WS_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };

        Self {
            level: lookup("WS_LOG_LEVEL").unwrap_or(defaults.level),
            output,
            format,
            file_path: lookup("WS_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }
}

// Writes every record to both sinks
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

fn env_filter(settings: &LogSettings) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.level));

    ["sqlx=warn", "hyper=warn", "tokio=warn"]
        .into_iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

fn file_writer(settings: &LogSettings) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let dir = settings
        .file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("/tmp"));
    let file_name = settings
        .file_path
        .file_name()
        .unwrap_or("ws-orchestrator.log".as_ref());

    tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
}

/// Install the global subscriber described by `settings`.
///
/// The returned guard flushes the file writer on drop and must be held for the
/// lifetime of the process when file output is enabled.
pub fn init_subscriber(settings: &LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry().with(env_filter(settings));
    let json = settings.format == LogFormat::Json;

    macro_rules! install {
        ($writer:expr) => {{
            let layer = tracing_subscriber::fmt::layer().with_writer($writer);
            if json {
                subscriber.with(layer.json()).try_init().ok();
            } else {
                subscriber.with(layer).try_init().ok();
            }
        }};
    }

    match settings.output {
        LogOutput::Console => {
            install!(io::stdout);
            None
        }
        LogOutput::File => {
            let (writer, guard) = file_writer(settings);
            install!(writer);
            Some(guard)
        }
        LogOutput::Both => {
            let (writer, guard) = file_writer(settings);
            install!(MakeTee {
                make_a: io::stdout,
                make_b: writer,
            });
            Some(guard)
        }
        LogOutput::None => {
            subscriber.try_init().ok();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_variables() {
        assert_eq!(settings_from(&[]), LogSettings::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let settings = settings_from(&[
            ("WS_LOG_LEVEL", "debug"),
            ("WS_LOG_OUTPUT", "both"),
            ("WS_LOG_FORMAT", "json"),
            ("WS_LOG_FILE", "/var/log/ws/api.log"),
        ]);

        assert_eq!(settings.level, "debug");
        assert_eq!(settings.output, LogOutput::Both);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file_path, PathBuf::from("/var/log/ws/api.log"));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let settings = settings_from(&[("WS_LOG_OUTPUT", "syslog"), ("WS_LOG_FORMAT", "xml")]);
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);
    }

    #[test]
    fn test_tee_writes_to_both_sinks() {
        let mut tee = Tee {
            a: Vec::new(),
            b: Vec::new(),
        };
        tee.write_all(b"phase=pausing").unwrap();
        tee.flush().unwrap();

        assert_eq!(tee.a, b"phase=pausing");
        assert_eq!(tee.b, b"phase=pausing");
    }
}
