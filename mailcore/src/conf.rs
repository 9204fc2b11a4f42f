/*
 * mailcore - conf module
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

//! Configuration for the threading, sorting and searching core.
//!
//! [`ThreadingSettings`] is deserialized from TOML; [`ConfigSubset`] wraps it
//! into the read-only key/value view the rest of the crate reads from.

use std::{fmt, str::FromStr};

use regex::{Regex, RegexBuilder};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::{Error, ErrorKind, Result},
    utils::is_lower,
};

pub mod default_vals {
    //! default value functions for deserializing

    use super::{QuadOption, Sort};

    pub fn false_val<T: From<bool>>() -> T {
        false.into()
    }

    pub fn true_val<T: From<bool>>() -> T {
        true.into()
    }

    pub fn minus_one() -> i64 {
        -1
    }

    pub fn score_flag() -> i64 {
        9999
    }

    pub fn none<T>() -> Option<T> {
        None
    }

    pub fn default_sort() -> Sort {
        Sort::default()
    }

    pub fn ask_yes() -> QuadOption {
        QuadOption::AskYes
    }

    pub fn reply_regex() -> String {
        r"^((\[[^]]+\] *)?re(\[[0-9]+\])?: *)?(\[[^]]+\] *)?".to_string()
    }

    pub fn simple_search() -> String {
        "~f %s | ~s %s".to_string()
    }

    pub fn hidden_tags() -> Vec<String> {
        [
            "unread",
            "draft",
            "flagged",
            "passed",
            "replied",
            "attachment",
            "signed",
            "encrypted",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

use default_vals::*;

/// The field a sort compares on.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SortMethod {
    #[default]
    Date,
    DateReceived,
    Subject,
    From,
    To,
    Score,
    Size,
    Spam,
    Label,
    Threads,
    /// Mailbox order, i.e. `msgno`.
    Unsorted,
}

impl SortMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::DateReceived => "date-received",
            Self::Subject => "subject",
            Self::From => "from",
            Self::To => "to",
            Self::Score => "score",
            Self::Size => "size",
            Self::Spam => "spam",
            Self::Label => "label",
            Self::Threads => "threads",
            Self::Unsorted => "unsorted",
        }
    }
}

impl FromStr for SortMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "date" | "date-sent" => Self::Date,
            "date-received" => Self::DateReceived,
            "subject" => Self::Subject,
            "from" => Self::From,
            "to" => Self::To,
            "score" => Self::Score,
            "size" => Self::Size,
            "spam" => Self::Spam,
            "label" => Self::Label,
            "threads" => Self::Threads,
            "unsorted" | "mailbox-order" => Self::Unsorted,
            other => {
                return Err(Error::new(format!("Invalid sort type: {other}"))
                    .set_kind(ErrorKind::Configuration))
            }
        })
    }
}

/// A sort setting: a [`SortMethod`] plus the `reverse-` and `last-`
/// modifiers.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Sort {
    pub method: SortMethod,
    pub reverse: bool,
    /// Sort a thread by its latest member instead of its root.
    pub last: bool,
}

impl Sort {
    pub const fn new(method: SortMethod) -> Self {
        Self {
            method,
            reverse: false,
            last: false,
        }
    }

    pub const fn reversed(self) -> Self {
        Self {
            reverse: !self.reverse,
            ..self
        }
    }

    /// Compare two sorts by method and `last` modifier only.
    pub fn same_order(&self, other: &Self) -> bool {
        self.method == other.method && self.last == other.last
    }
}

impl FromStr for Sort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s.trim();
        let mut ret = Self::default();
        loop {
            if let Some(r) = rest.strip_prefix("reverse-") {
                ret.reverse = true;
                rest = r;
            } else if let Some(r) = rest.strip_prefix("last-") {
                ret.last = true;
                rest = r;
            } else {
                break;
            }
        }
        ret.method = rest.parse()?;
        Ok(ret)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if self.reverse {
            write!(fmt, "reverse-")?;
        }
        if self.last {
            write!(fmt, "last-")?;
        }
        write!(fmt, "{}", self.method.as_str())
    }
}

impl Serialize for Sort {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Sort {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String>::deserialize(deserializer)?;
        s.parse::<Self>()
            .map_err(|err| de::Error::custom(err.details.to_string()))
    }
}

/// How messages are grouped in the index.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UseThreads {
    /// Decided by `sort`: threaded only when it is `threads`.
    #[default]
    Unset,
    Flat,
    Threads,
    /// Threaded, newest thread first.
    Reverse,
}

impl UseThreads {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Flat => "flat",
            Self::Threads => "threads",
            Self::Reverse => "reverse",
        }
    }
}

impl FromStr for UseThreads {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "unset" => Self::Unset,
            "flat" | "no" => Self::Flat,
            "threads" | "yes" => Self::Threads,
            "reverse" => Self::Reverse,
            other => {
                return Err(Error::new(format!("Invalid use_threads value: {other}"))
                    .set_kind(ErrorKind::Configuration))
            }
        })
    }
}

/// Yes, no, or ask with a default answer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum QuadOption {
    No,
    Yes,
    AskNo,
    #[default]
    AskYes,
}

impl QuadOption {
    /// The answer when nobody can be asked.
    pub const fn is_yes(&self) -> bool {
        matches!(self, Self::Yes | Self::AskYes)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Yes => "yes",
            Self::AskNo => "ask-no",
            Self::AskYes => "ask-yes",
        }
    }
}

impl FromStr for QuadOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "no" | "false" => Self::No,
            "yes" | "true" => Self::Yes,
            "ask-no" => Self::AskNo,
            "ask-yes" => Self::AskYes,
            other => {
                return Err(Error::new(format!("Invalid quad option: {other}"))
                    .set_kind(ErrorKind::Configuration))
            }
        })
    }
}

impl Serialize for QuadOption {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuadOption {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum InnerQuadOption {
            Bool(bool),
            Str(String),
        }
        match <InnerQuadOption>::deserialize(deserializer)? {
            InnerQuadOption::Bool(true) => Ok(Self::Yes),
            InnerQuadOption::Bool(false) => Ok(Self::No),
            InnerQuadOption::Str(s) => s.parse::<Self>().map_err(|_| {
                de::Error::custom(format!(
                    r#"expected one of "yes", "no", "ask-yes", "ask-no", found `{}`"#,
                    s
                ))
            }),
        }
    }
}

/// Settings for threading, sorting, limiting and searching.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadingSettings {
    /// Primary sort order of the index.
    /// Default: date
    #[serde(default = "default_sort")]
    pub sort: Sort,

    /// Order of messages inside a thread, and of threads when `sort` is
    /// `threads`.
    /// Default: date
    #[serde(default = "default_sort", alias = "sort-aux")]
    pub sort_aux: Sort,

    /// Group messages into threads. Overrides `sort = "threads"`.
    /// Default: unset
    #[serde(default, alias = "use-threads")]
    pub use_threads: UseThreads,

    /// Only thread by `In-Reply-To`/`References`, never by subject.
    /// Default: false
    #[serde(default = "false_val", alias = "strict-threads")]
    pub strict_threads: bool,

    /// Keep messages with a duplicate `Message-ID` as children of the
    /// first one.
    /// Default: true
    #[serde(default = "true_val", alias = "duplicate-threads")]
    pub duplicate_threads: bool,

    /// Use the received date instead of the sent date when grouping by
    /// subject.
    /// Default: false
    #[serde(default = "false_val", alias = "thread-received")]
    pub thread_received: bool,

    /// Only messages whose subject had a reply prefix stripped can join a
    /// thread by subject.
    /// Default: true
    #[serde(default = "true_val", alias = "sort-re")]
    pub sort_re: bool,

    /// Do not repeat a subject already shown by a parent or sibling.
    /// Default: true
    #[serde(default = "true_val", alias = "hide-thread-subject")]
    pub hide_thread_subject: bool,

    /// Default: false
    #[serde(default = "false_val", alias = "hide-limited")]
    pub hide_limited: bool,

    /// Default: true
    #[serde(default = "true_val", alias = "hide-missing")]
    pub hide_missing: bool,

    /// Default: false
    #[serde(default = "false_val", alias = "hide-top-limited")]
    pub hide_top_limited: bool,

    /// Default: true
    #[serde(default = "true_val", alias = "hide-top-missing")]
    pub hide_top_missing: bool,

    /// One column per thread level instead of two.
    /// Default: false
    #[serde(default = "false_val", alias = "narrow-tree")]
    pub narrow_tree: bool,

    /// Allow collapsing threads that contain unread messages.
    /// Default: true
    #[serde(default = "true_val", alias = "collapse-unread")]
    pub collapse_unread: bool,

    /// Allow collapsing threads that contain flagged messages.
    /// Default: true
    #[serde(default = "true_val", alias = "collapse-flagged")]
    pub collapse_flagged: bool,

    /// Matches the reply prefix of a subject.
    /// Default: "^((\[[^]]+\] *)?re(\[[0-9]+\])?: *)?(\[[^]]+\] *)?"
    #[serde(default = "reply_regex", alias = "reply-regex")]
    pub reply_regex: String,

    /// Template a search string without pattern operators expands to;
    /// every `%s` is replaced by the quoted string.
    /// Default: "~f %s | ~s %s"
    #[serde(default = "simple_search", alias = "simple-search")]
    pub simple_search: String,

    /// Program run for `~I` searches, invoked as
    /// `command 'mailbox path' query`.
    /// Default: None
    #[serde(default = "none", alias = "external-search-command")]
    pub external_search_command: Option<String>,

    /// Decode quoted-printable bodies before matching `~b` and `~B`.
    /// Default: true
    #[serde(default = "true_val", alias = "thorough-search")]
    pub thorough_search: bool,

    /// Searching continues at the other end of the index.
    /// Default: true
    #[serde(default = "true_val", alias = "wrap-search")]
    pub wrap_search: bool,

    /// Apply `score` rules when the view is built.
    /// Default: true
    #[serde(default = "true_val")]
    pub score: bool,

    /// Messages scoring at or below this are marked deleted.
    /// Default: -1
    #[serde(default = "minus_one", alias = "score-threshold-delete")]
    pub score_threshold_delete: i64,

    /// Messages scoring at or above this are flagged.
    /// Default: 9999
    #[serde(default = "score_flag", alias = "score-threshold-flag")]
    pub score_threshold_flag: i64,

    /// Messages scoring at or below this are marked read.
    /// Default: -1
    #[serde(default = "minus_one", alias = "score-threshold-read")]
    pub score_threshold_read: i64,

    /// Flagged messages cannot be deleted.
    /// Default: false
    #[serde(default = "false_val", alias = "flag-safe")]
    pub flag_safe: bool,

    /// The user's own address, for `~p` and `~P`.
    /// Default: None
    #[serde(default = "none")]
    pub from: Option<String>,

    /// Tags not shown in the index.
    /// Default: unread, draft, flagged, passed, replied, attachment,
    /// signed, encrypted
    #[serde(default = "hidden_tags", alias = "hidden-tags")]
    pub hidden_tags: Vec<String>,

    /// Purge deleted messages when syncing.
    /// Default: ask-yes
    #[serde(default = "ask_yes")]
    pub delete: QuadOption,
}

impl Default for ThreadingSettings {
    fn default() -> Self {
        Self {
            sort: default_sort(),
            sort_aux: default_sort(),
            use_threads: UseThreads::default(),
            strict_threads: false,
            duplicate_threads: true,
            thread_received: false,
            sort_re: true,
            hide_thread_subject: true,
            hide_limited: false,
            hide_missing: true,
            hide_top_limited: false,
            hide_top_missing: true,
            narrow_tree: false,
            collapse_unread: true,
            collapse_flagged: true,
            reply_regex: reply_regex(),
            simple_search: simple_search(),
            external_search_command: None,
            thorough_search: true,
            wrap_search: true,
            score: true,
            score_threshold_delete: -1,
            score_threshold_flag: score_flag(),
            score_threshold_read: -1,
            flag_safe: false,
            from: None,
            hidden_tags: hidden_tags(),
            delete: ask_yes(),
        }
    }
}

impl ThreadingSettings {
    /// The effective threading style, resolving `unset` through `sort`.
    pub fn thread_style(&self) -> UseThreads {
        match self.use_threads {
            UseThreads::Threads | UseThreads::Reverse | UseThreads::Flat => self.use_threads,
            UseThreads::Unset if self.sort.method == SortMethod::Threads => {
                if self.sort.reverse {
                    UseThreads::Reverse
                } else {
                    UseThreads::Threads
                }
            }
            UseThreads::Unset => UseThreads::Flat,
        }
    }

    pub fn using_threads(&self) -> bool {
        self.thread_style() != UseThreads::Flat
    }
}

/// A typed configuration value, as returned by [`ConfigSubset::get`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Number(i64),
    String(Option<String>),
    Slist(Vec<String>),
    Regex(String),
    Enum(&'static str),
    Quad(QuadOption),
    Sort(Sort),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(fmt, "{}", if *v { "yes" } else { "no" }),
            Self::Number(v) => write!(fmt, "{}", v),
            Self::String(None) => Ok(()),
            Self::String(Some(v)) | Self::Regex(v) => write!(fmt, "{}", v),
            Self::Slist(v) => write!(fmt, "{}", v.join(",")),
            Self::Enum(v) => write!(fmt, "{}", v),
            Self::Quad(v) => write!(fmt, "{}", v.as_str()),
            Self::Sort(v) => write!(fmt, "{}", v),
        }
    }
}

/// Every key [`ConfigSubset`] knows about.
pub const CONFIG_KEYS: &[&str] = &[
    "collapse_flagged",
    "collapse_unread",
    "delete",
    "duplicate_threads",
    "external_search_command",
    "flag_safe",
    "from",
    "hidden_tags",
    "hide_limited",
    "hide_missing",
    "hide_thread_subject",
    "hide_top_limited",
    "hide_top_missing",
    "narrow_tree",
    "reply_regex",
    "score",
    "score_threshold_delete",
    "score_threshold_flag",
    "score_threshold_read",
    "simple_search",
    "sort",
    "sort_aux",
    "sort_re",
    "strict_threads",
    "thorough_search",
    "thread_received",
    "use_threads",
    "wrap_search",
];

/// Compile a regular expression from the configuration; all-lowercase
/// expressions match case-insensitively.
pub fn compile_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(is_lower(pattern))
        .build()
        .map_err(|err| {
            Error::new(format!("'{}': {}", pattern, err))
                .set_source(Some(std::sync::Arc::new(err)))
                .set_kind(ErrorKind::Configuration)
        })
}

/// Read-only key/value view over [`ThreadingSettings`].
#[derive(Clone, Debug)]
pub struct ConfigSubset {
    settings: ThreadingSettings,
    reply_regex: Option<Regex>,
}

impl Default for ConfigSubset {
    fn default() -> Self {
        let settings = ThreadingSettings::default();
        let reply_regex = compile_regex(&settings.reply_regex).ok();
        Self {
            settings,
            reply_regex,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" | "" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        other => Err(
            Error::new(format!("{name}: expected a boolean, found `{other}`"))
                .set_kind(ErrorKind::Configuration),
        ),
    }
}

fn parse_number(name: &str, value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|err| {
        Error::new(format!("{name}: expected a number, found `{value}`"))
            .set_source(Some(std::sync::Arc::new(err)))
            .set_kind(ErrorKind::Configuration)
    })
}

fn wrong_type(name: &str, expected: &str) -> Error {
    Error::new(format!("{name} is not a {expected} option")).set_kind(ErrorKind::Configuration)
}

impl ConfigSubset {
    pub fn new(settings: ThreadingSettings) -> Result<Self> {
        let reply_regex = if settings.reply_regex.is_empty() {
            None
        } else {
            Some(compile_regex(&settings.reply_regex)?)
        };
        Ok(Self {
            settings,
            reply_regex,
        })
    }

    pub fn settings(&self) -> &ThreadingSettings {
        &self.settings
    }

    /// The compiled `reply_regex`, if one is set.
    pub fn reply_regex(&self) -> Option<&Regex> {
        self.reply_regex.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        let s = &self.settings;
        Some(match name {
            "collapse_flagged" => ConfigValue::Bool(s.collapse_flagged),
            "collapse_unread" => ConfigValue::Bool(s.collapse_unread),
            "delete" => ConfigValue::Quad(s.delete),
            "duplicate_threads" => ConfigValue::Bool(s.duplicate_threads),
            "external_search_command" => ConfigValue::String(s.external_search_command.clone()),
            "flag_safe" => ConfigValue::Bool(s.flag_safe),
            "from" => ConfigValue::String(s.from.clone()),
            "hidden_tags" => ConfigValue::Slist(s.hidden_tags.clone()),
            "hide_limited" => ConfigValue::Bool(s.hide_limited),
            "hide_missing" => ConfigValue::Bool(s.hide_missing),
            "hide_thread_subject" => ConfigValue::Bool(s.hide_thread_subject),
            "hide_top_limited" => ConfigValue::Bool(s.hide_top_limited),
            "hide_top_missing" => ConfigValue::Bool(s.hide_top_missing),
            "narrow_tree" => ConfigValue::Bool(s.narrow_tree),
            "reply_regex" => ConfigValue::Regex(s.reply_regex.clone()),
            "score" => ConfigValue::Bool(s.score),
            "score_threshold_delete" => ConfigValue::Number(s.score_threshold_delete),
            "score_threshold_flag" => ConfigValue::Number(s.score_threshold_flag),
            "score_threshold_read" => ConfigValue::Number(s.score_threshold_read),
            "simple_search" => ConfigValue::String(Some(s.simple_search.clone())),
            "sort" => ConfigValue::Sort(s.sort),
            "sort_aux" => ConfigValue::Sort(s.sort_aux),
            "sort_re" => ConfigValue::Bool(s.sort_re),
            "strict_threads" => ConfigValue::Bool(s.strict_threads),
            "thorough_search" => ConfigValue::Bool(s.thorough_search),
            "thread_received" => ConfigValue::Bool(s.thread_received),
            "use_threads" => ConfigValue::Enum(s.use_threads.as_str()),
            "wrap_search" => ConfigValue::Bool(s.wrap_search),
            _ => return None,
        })
    }

    fn get_known(&self, name: &str) -> Result<ConfigValue> {
        self.get(name).ok_or_else(|| {
            Error::new(format!("Unknown option {name}")).set_kind(ErrorKind::Configuration)
        })
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.get_known(name)? {
            ConfigValue::Bool(v) => Ok(v),
            _ => Err(wrong_type(name, "boolean")),
        }
    }

    pub fn get_number(&self, name: &str) -> Result<i64> {
        match self.get_known(name)? {
            ConfigValue::Number(v) => Ok(v),
            _ => Err(wrong_type(name, "number")),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        match self.get_known(name)? {
            ConfigValue::String(v) => Ok(v),
            _ => Err(wrong_type(name, "string")),
        }
    }

    pub fn get_slist(&self, name: &str) -> Result<Vec<String>> {
        match self.get_known(name)? {
            ConfigValue::Slist(v) => Ok(v),
            _ => Err(wrong_type(name, "string list")),
        }
    }

    pub fn get_regex(&self, name: &str) -> Result<Option<Regex>> {
        match self.get_known(name)? {
            ConfigValue::Regex(v) if v.is_empty() => Ok(None),
            ConfigValue::Regex(v) => compile_regex(&v).map(Some),
            _ => Err(wrong_type(name, "regular expression")),
        }
    }

    pub fn get_enum(&self, name: &str) -> Result<&'static str> {
        match self.get_known(name)? {
            ConfigValue::Enum(v) => Ok(v),
            _ => Err(wrong_type(name, "enumeration")),
        }
    }

    pub fn get_quad(&self, name: &str) -> Result<QuadOption> {
        match self.get_known(name)? {
            ConfigValue::Quad(v) => Ok(v),
            _ => Err(wrong_type(name, "quad")),
        }
    }

    pub fn get_sort(&self, name: &str) -> Result<Sort> {
        match self.get_known(name)? {
            ConfigValue::Sort(v) => Ok(v),
            _ => Err(wrong_type(name, "sort")),
        }
    }

    /// Parse `value` according to the type of `name` and store it.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let mut new = self.settings.clone();
        match name {
            "collapse_flagged" => new.collapse_flagged = parse_bool(name, value)?,
            "collapse_unread" => new.collapse_unread = parse_bool(name, value)?,
            "delete" => new.delete = value.parse()?,
            "duplicate_threads" => new.duplicate_threads = parse_bool(name, value)?,
            "external_search_command" => {
                new.external_search_command = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            "flag_safe" => new.flag_safe = parse_bool(name, value)?,
            "from" => new.from = Some(value.to_string()).filter(|v| !v.is_empty()),
            "hidden_tags" => {
                new.hidden_tags = value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "hide_limited" => new.hide_limited = parse_bool(name, value)?,
            "hide_missing" => new.hide_missing = parse_bool(name, value)?,
            "hide_thread_subject" => new.hide_thread_subject = parse_bool(name, value)?,
            "hide_top_limited" => new.hide_top_limited = parse_bool(name, value)?,
            "hide_top_missing" => new.hide_top_missing = parse_bool(name, value)?,
            "narrow_tree" => new.narrow_tree = parse_bool(name, value)?,
            "reply_regex" => new.reply_regex = value.to_string(),
            "score" => new.score = parse_bool(name, value)?,
            "score_threshold_delete" => new.score_threshold_delete = parse_number(name, value)?,
            "score_threshold_flag" => new.score_threshold_flag = parse_number(name, value)?,
            "score_threshold_read" => new.score_threshold_read = parse_number(name, value)?,
            "simple_search" => new.simple_search = value.to_string(),
            "sort" => new.sort = value.parse()?,
            "sort_aux" => new.sort_aux = value.parse()?,
            "sort_re" => new.sort_re = parse_bool(name, value)?,
            "strict_threads" => new.strict_threads = parse_bool(name, value)?,
            "thorough_search" => new.thorough_search = parse_bool(name, value)?,
            "thread_received" => new.thread_received = parse_bool(name, value)?,
            "use_threads" => new.use_threads = value.parse()?,
            "wrap_search" => new.wrap_search = parse_bool(name, value)?,
            _ => {
                return Err(Error::new(format!("Unknown option {name}"))
                    .set_kind(ErrorKind::Configuration))
            }
        }
        *self = Self::new(new)?;
        Ok(())
    }

    /// Restore `name` to its default value.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let default = Self::default();
        let value = default.get_known(name)?;
        self.set(name, &value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parse_and_display() {
        let s: Sort = "reverse-last-date-received".parse().unwrap();
        assert_eq!(
            s,
            Sort {
                method: SortMethod::DateReceived,
                reverse: true,
                last: true
            }
        );
        assert_eq!(s.to_string(), "reverse-last-date-received");
        assert_eq!("threads".parse::<Sort>().unwrap().method, SortMethod::Threads);
        assert!("reverse-sideways".parse::<Sort>().is_err());
    }

    #[test]
    fn test_thread_style() {
        let mut s = ThreadingSettings::default();
        assert_eq!(s.thread_style(), UseThreads::Flat);
        s.sort = "reverse-threads".parse().unwrap();
        assert_eq!(s.thread_style(), UseThreads::Reverse);
        s.use_threads = UseThreads::Threads;
        assert_eq!(s.thread_style(), UseThreads::Threads);
        assert!(s.using_threads());
    }

    #[test]
    fn test_config_subset_typed_getters() {
        let mut sub = ConfigSubset::default();
        assert!(sub.get_bool("hide_missing").unwrap());
        assert!(sub.get_number("hide_missing").is_err());
        assert!(sub.get_bool("no_such_option").is_err());
        assert_eq!(sub.get_enum("use_threads").unwrap(), "unset");
        assert_eq!(sub.get_quad("delete").unwrap(), QuadOption::AskYes);
        assert_eq!(sub.get_slist("hidden_tags").unwrap().len(), 8);
        assert!(sub.get_regex("reply_regex").unwrap().is_some());

        sub.set("use_threads", "reverse").unwrap();
        sub.set("score_threshold_flag", "10").unwrap();
        sub.set("strict_threads", "yes").unwrap();
        assert_eq!(sub.settings().use_threads, UseThreads::Reverse);
        assert_eq!(sub.get_number("score_threshold_flag").unwrap(), 10);
        assert!(sub.settings().strict_threads);
        assert!(sub.set("strict_threads", "perhaps").is_err());
        assert!(sub.set("reply_regex", "(").is_err());
        assert!(sub.get_bool("strict_threads").unwrap());

        sub.reset("strict_threads").unwrap();
        assert!(!sub.settings().strict_threads);
    }

    #[test]
    fn test_reply_regex_is_case_insensitive() {
        let sub = ConfigSubset::default();
        let re = sub.reply_regex().unwrap();
        assert_eq!(re.find("Re: project").map(|m| m.end()), Some(4));
        assert_eq!(re.find("RE: [list] project").map(|m| m.end()), Some(11));
    }
}
