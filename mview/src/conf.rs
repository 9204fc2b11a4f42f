/*
 * mview - configuration
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

//! Configuration file.
//!
//! The file is TOML. `commands` are configuration lines (`score`, `lists`,
//! `set`, ...) run in order before the mailbox is opened.
//!
//! ```toml
//! commands = ["score '~f boss' 50"]
//!
//! [threading]
//! use_threads = "threads"
//! sort = "reverse-date"
//!
//! [index]
//! ascii = true
//!
//! [log]
//! maximum_level = "WARN"
//! ```

use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use mailcore::{
    error::{Error, ErrorKind, Result, ResultIntoError},
    LogLevel, LogTarget, StderrLogger, ThreadingSettings,
};

pub const CONFIG_VAR: &str = "MVIEW_CONFIG";

pub mod default_vals {
    pub fn false_val<T: std::convert::From<bool>>() -> T {
        false.into()
    }

    pub fn date_format() -> String {
        "%b %d".to_string()
    }

    pub const fn from_width() -> usize {
        15
    }
}

use default_vals::*;

/// How the index is printed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexSettings {
    /// Draw thread trees with ASCII characters.
    /// Default: false
    #[serde(default = "false_val")]
    pub ascii: bool,

    /// `strftime` format of the date column.
    /// Default: "%b %d"
    #[serde(default = "date_format", alias = "date-format")]
    pub date_format: String,

    /// Width of the author column.
    /// Default: 15
    #[serde(default = "from_width", alias = "from-width")]
    pub from_width: usize,

    /// Bytes the mailbox format stores between messages, counted in the
    /// view size.
    /// Default: 0
    #[serde(default)]
    pub padding: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            ascii: false,
            date_format: date_format(),
            from_width: from_width(),
            padding: 0,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub maximum_level: LogLevel,
    /// Per-target overrides, e.g. `targets = { pattern = "TRACE" }`.
    #[serde(default)]
    pub targets: BTreeMap<LogTarget, LogLevel>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub threading: ThreadingSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl FileSettings {
    /// Parse and validate a configuration from `s`.
    pub fn validate_string(s: &str) -> Result<Self> {
        let ret: Self = toml::from_str(s).map_err(|err| {
            Error::new("Input contains errors")
                .set_source(Some(Arc::new(err)))
                .set_kind(ErrorKind::Configuration)
        })?;
        // Catch bad regular expressions before anything is opened.
        mailcore::ConfigSubset::new(ret.threading.clone())?;
        Ok(ret)
    }

    pub fn validate(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .chain_err_summary(|| format!("Could not read configuration file {}", path.display()))
            .chain_err_kind(ErrorKind::Io)?;
        Self::validate_string(&s)
            .map_err(|err| err.set_summary(format!("{}", path.display())))
    }

    /// Load the file at [`get_config_file`], or the defaults when there is
    /// none.
    pub fn new() -> Result<Self> {
        let path = get_config_file()?;
        if path.exists() {
            Self::validate(&path)
        } else if env::var(CONFIG_VAR).is_ok() {
            Err(Error::new(format!(
                "Configuration file {} does not exist.",
                path.display()
            ))
            .set_kind(ErrorKind::Configuration))
        } else {
            Ok(Self::default())
        }
    }
}

/// `$MVIEW_CONFIG`, or `config.toml` in the XDG configuration directory.
pub fn get_config_file() -> Result<PathBuf> {
    if let Ok(path) = env::var(CONFIG_VAR) {
        return Ok(PathBuf::from(path));
    }
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mview").map_err(|err| {
        Error::new("Could not determine the configuration directory")
            .set_details(err.to_string())
            .set_kind(ErrorKind::Configuration)
    })?;
    Ok(xdg_dirs.get_config_home().join("config.toml"))
}

#[derive(Debug)]
pub struct Settings {
    pub commands: Vec<String>,
    pub threading: ThreadingSettings,
    pub index: IndexSettings,
    pub _logger: StderrLogger,
}

impl Settings {
    pub fn new() -> Result<Self> {
        let fs = FileSettings::new()?;
        let mut _logger = StderrLogger::new(fs.log.maximum_level);
        if let Some(ref log_path) = fs.log.log_file {
            _logger.change_log_dest(log_path.clone())?;
        }
        for (target, level) in &fs.log.targets {
            _logger.set_target_level(*target, *level);
        }
        Ok(Self {
            commands: fs.commands,
            threading: fs.threading,
            index: fs.index,
            _logger,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_conf_defaults() {
        let fs = FileSettings::validate_string("").unwrap();
        assert!(fs.commands.is_empty());
        assert_eq!(fs.threading, ThreadingSettings::default());
        assert_eq!(fs.index, IndexSettings::default());
        assert_eq!(fs.log.maximum_level, LogLevel::INFO);
    }

    #[test]
    fn test_conf_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
commands = ["score '~f boss' 50", "lists ^dev@"]

[threading]
use-threads = "threads"
sort = "reverse-date"
hide_missing = false

[index]
ascii = true
from-width = 20

[log]
maximum_level = "WARN"
targets = { pattern = "TRACE", thread = "OFF" }
"#,
        )
        .unwrap();
        let fs = FileSettings::validate(file.path()).unwrap();
        assert_eq!(fs.commands.len(), 2);
        let threading = fs.threading;
        assert!(threading.using_threads());
        assert_eq!(threading.sort.to_string(), "reverse-date");
        assert!(!threading.hide_missing);
        assert!(fs.index.ascii);
        assert_eq!(fs.index.from_width, 20);
        assert_eq!(fs.log.maximum_level, LogLevel::WARN);
        assert_eq!(fs.log.targets[&LogTarget::Pattern], LogLevel::TRACE);
        assert_eq!(fs.log.targets[&LogTarget::Thread], LogLevel::OFF);
        assert!(!fs.log.targets.contains_key(&LogTarget::View));
    }

    #[test]
    fn test_conf_errors() {
        let err = FileSettings::validate_string("[index]\nwidth = 3\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        let err = FileSettings::validate_string("[threading]\nreply_regex = \"(\"\n").unwrap_err();
        assert!(err.details.contains("("), "{}", err);
        let err = FileSettings::validate_string("[log]\ntargets = { sorting = \"DEBUG\" }\n")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(FileSettings::validate(Path::new("/nonexistent/mview.toml")).is_err());
    }
}
