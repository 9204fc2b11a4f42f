/*
 * mailcore - logging module
 *
 * Copyright 2024 mailcore contributors
 *
 * This file is part of mailcore.
 *
 * mailcore is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * mailcore is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with mailcore. If not, see <http://www.gnu.org/licenses/>.
 */

//! Log sink shared by the library and the `mview` binary.
//!
//! Records go to a log file (under the XDG data directory unless the
//! configuration names one). Each [`LogTarget`] can be given its own level,
//! so pattern evaluation can be traced without drowning in threading output.

#[cfg(not(test))]
use std::fs::{File, OpenOptions};
use std::{
    collections::BTreeMap,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex,
    },
};

use log::{LevelFilter, Log, Metadata, Record};

/// Name of the environment variable that mirrors every log record to stderr.
pub const DEBUG_STDERR_VAR: &str = "MAILCORE_DEBUG_STDERR";

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[repr(u8)]
pub enum LogLevel {
    OFF = 0,
    ERROR,
    WARN,
    #[default]
    INFO,
    DEBUG,
    TRACE,
}

impl From<u8> for LogLevel {
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::OFF,
            1 => Self::ERROR,
            2 => Self::WARN,
            3 => Self::INFO,
            4 => Self::DEBUG,
            _ => Self::TRACE,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::OFF => Self::Off,
            LogLevel::ERROR => Self::Error,
            LogLevel::WARN => Self::Warn,
            LogLevel::INFO => Self::Info,
            LogLevel::DEBUG => Self::Debug,
            LogLevel::TRACE => Self::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "OFF" => Self::OFF,
            "ERROR" => Self::ERROR,
            "WARN" => Self::WARN,
            "INFO" => Self::INFO,
            "DEBUG" => Self::DEBUG,
            "TRACE" => Self::TRACE,
            other => {
                return Err(crate::error::Error::new(format!("Invalid log level: {other}"))
                    .set_kind(crate::error::ErrorKind::Configuration))
            }
        })
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Parts of the library whose records can be filtered on their own.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogTarget {
    /// Thread building, sorting and collapsing.
    Thread,
    /// Pattern compilation and evaluation.
    Pattern,
    /// Limits, searches and tagging on the mailbox view.
    View,
    /// Event delivery on the notification bus.
    Notify,
    /// Reading messages from the mailbox backend.
    Backend,
}

impl LogTarget {
    /// Module path prefix of the records belonging to this target.
    pub const fn module(self) -> &'static str {
        match self {
            Self::Thread => "mailcore::thread",
            Self::Pattern => "mailcore::pattern",
            Self::View => "mailcore::mview",
            Self::Notify => "mailcore::notify",
            Self::Backend => "mailcore::backends",
        }
    }

    /// The target a record's `target` string falls under, if any.
    pub fn of(target: &str) -> Option<Self> {
        [
            Self::Thread,
            Self::Pattern,
            Self::View,
            Self::Notify,
            Self::Backend,
        ]
        .into_iter()
        .find(|t| {
            target
                .strip_prefix(t.module())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

struct FileOutput {
    #[cfg(test)]
    writer: BufWriter<std::io::Stderr>,
    #[cfg(not(test))]
    writer: BufWriter<Box<dyn Write + Send>>,
    path: PathBuf,
}

#[derive(Clone)]
pub struct StderrLogger {
    dest: Arc<Mutex<FileOutput>>,
    level: Arc<AtomicU8>,
    targets: Arc<Mutex<BTreeMap<LogTarget, LogLevel>>>,
    mirror_stderr: bool,
}

impl std::fmt::Debug for StderrLogger {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct(stringify!(StderrLogger))
            .field("level", &self.log_level())
            .field("targets", &self.target_levels())
            .field("mirror_stderr", &self.mirror_stderr)
            .finish()
    }
}

impl Default for StderrLogger {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl StderrLogger {
    pub fn new(level: LogLevel) -> Self {
        use std::sync::Once;

        static INIT_STDERR_LOGGING: Once = Once::new();

        #[cfg(not(test))]
        let logger = {
            fn open_default() -> Result<(PathBuf, File), Box<dyn std::error::Error>> {
                let data_dir = xdg::BaseDirectories::with_prefix("mailcore")?;
                let path = data_dir.place_data_file("mailcore.log")?;
                let log_file = OpenOptions::new().append(true).create(true).open(&path)?;
                Ok((path, log_file))
            }
            // Without a writable data directory records still reach stderr.
            let (path, writer): (PathBuf, Box<dyn Write + Send>) = match open_default() {
                Ok((path, log_file)) => (path, Box::new(log_file)),
                Err(_) => (PathBuf::new(), Box::new(std::io::stderr())),
            };
            Self {
                dest: Arc::new(Mutex::new(FileOutput {
                    writer: BufWriter::new(writer),
                    path,
                })),
                level: Arc::new(AtomicU8::new(level as u8)),
                targets: Arc::default(),
                mirror_stderr: std::env::var(DEBUG_STDERR_VAR).is_ok(),
            }
        };
        #[cfg(test)]
        let logger = Self {
            dest: Arc::new(Mutex::new(FileOutput {
                writer: BufWriter::new(std::io::stderr()),
                path: PathBuf::new(),
            })),
            level: Arc::new(AtomicU8::new(level as u8)),
            targets: Arc::default(),
            mirror_stderr: false,
        };

        logger.update_max_level();

        INIT_STDERR_LOGGING.call_once(|| {
            // Another logger may already be installed by the embedding program.
            _ = log::set_boxed_logger(Box::new(logger.clone()));
        });
        logger
    }

    pub fn log_level(&self) -> LogLevel {
        self.level.load(Ordering::SeqCst).into()
    }

    pub fn change_log_level(&self, new_val: LogLevel) {
        self.level.store(new_val as u8, Ordering::SeqCst);
        self.update_max_level();
    }

    /// Give `target` its own level, overriding [`Self::log_level`] for it.
    pub fn set_target_level(&self, target: LogTarget, level: LogLevel) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.insert(target, level);
        }
        self.update_max_level();
    }

    pub fn target_levels(&self) -> BTreeMap<LogTarget, LogLevel> {
        self.targets.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// The level records with `target` are kept at.
    pub fn level_for(&self, target: &str) -> LogLevel {
        LogTarget::of(target)
            .and_then(|t| self.targets.lock().ok()?.get(&t).copied())
            .unwrap_or_else(|| self.log_level())
    }

    fn update_max_level(&self) {
        let max = self
            .target_levels()
            .into_values()
            .fold(self.log_level(), std::cmp::max);
        #[cfg(feature = "debug-tracing")]
        let max = if max == LogLevel::OFF {
            max
        } else {
            LogLevel::TRACE
        };
        log::set_max_level(max.into());
    }

    #[cfg(not(test))]
    pub fn change_log_dest(&mut self, path: PathBuf) -> crate::error::Result<()> {
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let mut dest = self
            .dest
            .lock()
            .map_err(|err| crate::error::Error::new(err.to_string()))?;
        *dest = FileOutput {
            writer: BufWriter::new(Box::new(file)),
            path,
        };
        Ok(())
    }

    pub fn log_dest(&self) -> PathBuf {
        self.dest
            .lock()
            .map(|d| d.path.clone())
            .unwrap_or_default()
    }
}

fn write_record(writer: &mut impl Write, record: &Record) -> std::io::Result<()> {
    writeln!(
        writer,
        "{} [{}]: {}: {}",
        super::datetime::timestamp_to_string(super::datetime::now(), None),
        record.level(),
        record.target(),
        record.args()
    )?;
    writer.flush()
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.mirror_stderr
            || metadata.level() <= LevelFilter::from(self.level_for(metadata.target()))
    }

    fn log(&self, record: &Record) {
        let kept =
            record.level() <= LevelFilter::from(self.level_for(record.target()));
        if kept {
            _ = self
                .dest
                .lock()
                .ok()
                .and_then(|mut d| write_record(&mut d.writer, record).ok());
        }
        if self.mirror_stderr {
            _ = write_record(&mut std::io::stderr(), record);
        }
    }

    fn flush(&self) {
        self.dest
            .lock()
            .ok()
            .and_then(|mut w| w.writer.flush().ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_fork::rusty_fork_test;

    #[test]
    fn test_log_level_conversions() {
        assert_eq!(LogLevel::from(0), LogLevel::OFF);
        assert_eq!(LogLevel::from(200), LogLevel::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::WARN), LevelFilter::Warn);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::DEBUG);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::TRACE.to_string(), "TRACE");
    }

    #[test]
    fn test_log_targets() {
        assert_eq!(
            LogTarget::of("mailcore::thread::navigation"),
            Some(LogTarget::Thread)
        );
        assert_eq!(LogTarget::of("mailcore::pattern"), Some(LogTarget::Pattern));
        assert_eq!(LogTarget::of("mailcore::mview"), Some(LogTarget::View));
        assert_eq!(LogTarget::of("mailcore::threads"), None);
        assert_eq!(LogTarget::of("mview::conf"), None);
        assert_eq!(LogTarget::Backend.module(), "mailcore::backends");
    }

    rusty_fork::rusty_fork_test! {
        #[test]
        fn test_logger_install_once() {
            let logger = StderrLogger::new(LogLevel::DEBUG);
            assert_eq!(logger.log_level(), LogLevel::DEBUG);
            logger.change_log_level(LogLevel::WARN);
            assert_eq!(logger.log_level(), LogLevel::WARN);
            assert_eq!(log::max_level(), LevelFilter::Warn);
            // A second logger shares nothing with the installed one.
            let other = StderrLogger::new(LogLevel::ERROR);
            assert_eq!(other.log_level(), LogLevel::ERROR);
            log::warn!("logged once");
        }

        #[test]
        fn test_logger_target_levels() {
            let logger = StderrLogger::new(LogLevel::WARN);
            logger.set_target_level(LogTarget::Pattern, LogLevel::TRACE);
            logger.set_target_level(LogTarget::Thread, LogLevel::OFF);
            assert_eq!(log::max_level(), LevelFilter::Trace);
            assert_eq!(logger.level_for("mailcore::pattern::compile"), LogLevel::TRACE);
            assert_eq!(logger.level_for("mailcore::thread"), LogLevel::OFF);
            assert_eq!(logger.level_for("mailcore::mview"), LogLevel::WARN);
            let m = Metadata::builder().level(log::Level::Trace).target("mailcore::pattern").build();
            assert!(logger.enabled(&m));
            let m = Metadata::builder().level(log::Level::Error).target("mailcore::thread").build();
            assert!(!logger.enabled(&m));
            let m = Metadata::builder().level(log::Level::Info).target("mailcore::notify").build();
            assert!(!logger.enabled(&m));
        }
    }
}
