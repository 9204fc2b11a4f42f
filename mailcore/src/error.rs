/*
 * mailcore - error module
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

/*!
 * An error object for `mailcore`
 */

use std::{borrow::Cow, fmt, io, result, str, string, sync::Arc};

pub type Result<T> = result::Result<T, Error>;

/// The broad category of an [`Error`], so that callers can decide between
/// local recovery and propagation without parsing messages.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    #[default]
    None,
    /// A pattern string could not be compiled.
    PatternCompile,
    /// The operation needs an open mailbox.
    NoMailbox,
    /// The operation needs a selected message.
    NoCurrentMessage,
    /// A thread navigation request could not be satisfied.
    Threading,
    Io,
    Backend,
    /// A bulk operation was stopped through its progress callback.
    Cancelled,
    Configuration,
    /// An external program (such as the search command) failed.
    External,
    NotImplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}",
            match self {
                Self::None => "None",
                Self::PatternCompile => "Pattern compilation error",
                Self::NoMailbox => "No mailbox is open",
                Self::NoCurrentMessage => "No current message",
                Self::Threading => "Threading error",
                Self::Io => "I/O error",
                Self::Backend => "Backend error",
                Self::Cancelled => "Operation cancelled",
                Self::Configuration => "Configuration error",
                Self::External => "External program error",
                Self::NotImplemented => "Not implemented",
            }
        )
    }
}

impl ErrorKind {
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io)
    }
}

#[derive(Clone, Debug)]
pub struct Error {
    pub summary: Option<Cow<'static, str>>,
    pub details: Cow<'static, str>,
    pub source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    pub kind: ErrorKind,
}

pub trait IntoError {
    fn set_err_summary<M>(self, msg: M) -> Error
    where
        M: Into<Cow<'static, str>>;

    fn set_err_kind(self, kind: ErrorKind) -> Error;
}

pub trait ResultIntoError<T> {
    fn chain_err_summary<M, F>(self, msg_fn: F) -> Result<T>
    where
        F: Fn() -> M,
        M: Into<Cow<'static, str>>;

    fn chain_err_kind(self, kind: ErrorKind) -> Result<T>;
}

impl<I: Into<Error>> IntoError for I {
    #[inline]
    fn set_err_summary<M>(self, msg: M) -> Error
    where
        M: Into<Cow<'static, str>>,
    {
        let err: Error = self.into();
        err.set_summary(msg)
    }

    #[inline]
    fn set_err_kind(self, kind: ErrorKind) -> Error {
        let err: Error = self.into();
        err.set_kind(kind)
    }
}

impl<T, I: Into<Error>> ResultIntoError<T> for result::Result<T, I> {
    #[inline]
    fn chain_err_summary<M, F>(self, msg_fn: F) -> Result<T>
    where
        F: Fn() -> M,
        M: Into<Cow<'static, str>>,
    {
        self.map_err(|err| err.set_err_summary(msg_fn()))
    }

    #[inline]
    fn chain_err_kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|err| err.set_err_kind(kind))
    }
}

impl Error {
    pub fn new<M>(msg: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self {
            summary: None,
            details: msg.into(),
            source: None,
            kind: ErrorKind::None,
        }
    }

    pub fn set_summary<M>(mut self, summary: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        if let Some(old_summary) = self.summary.take() {
            self.summary = Some(format!("{}. {}", old_summary, summary.into()).into());
        } else {
            self.summary = Some(summary.into());
        }
        self
    }

    pub fn set_details<M>(mut self, details: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        self.details = details.into();
        self
    }

    pub fn set_source(
        mut self,
        new_val: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        self.source = new_val;
        self
    }

    pub fn set_kind(mut self, new_val: ErrorKind) -> Self {
        self.kind = new_val;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(summary) = self.summary.as_ref() {
            writeln!(f, "Summary: {}", summary)?;
        }
        write!(f, "{}", self.details)?;
        if !matches!(self.kind, ErrorKind::None) {
            write!(f, "\nKind: {}", self.kind)?;
        }
        if let Some(source) = self.source.as_ref() {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.details.into()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|s| &(*(*s)) as _)
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(kind: io::Error) -> Self {
        Self::new(kind.to_string())
            .set_kind(ErrorKind::Io)
            .set_source(Some(Arc::new(kind)))
    }
}

impl<'a> From<Cow<'a, str>> for Error {
    #[inline]
    fn from(kind: Cow<'_, str>) -> Self {
        Self::new(kind.to_string())
    }
}

impl From<string::FromUtf8Error> for Error {
    #[inline]
    fn from(kind: string::FromUtf8Error) -> Self {
        Self::new(kind.to_string()).set_source(Some(Arc::new(kind)))
    }
}

impl From<str::Utf8Error> for Error {
    #[inline]
    fn from(kind: str::Utf8Error) -> Self {
        Self::new(kind.to_string()).set_source(Some(Arc::new(kind)))
    }
}

impl From<std::num::ParseIntError> for Error {
    #[inline]
    fn from(kind: std::num::ParseIntError) -> Self {
        Self::new(kind.to_string()).set_source(Some(Arc::new(kind)))
    }
}

impl From<regex::Error> for Error {
    #[inline]
    fn from(kind: regex::Error) -> Self {
        Self::new(kind.to_string()).set_source(Some(Arc::new(kind)))
    }
}

impl From<serde_json::error::Error> for Error {
    #[inline]
    fn from(kind: serde_json::error::Error) -> Self {
        Self::new(kind.to_string()).set_source(Some(Arc::new(kind)))
    }
}

impl From<Box<dyn std::error::Error + Sync + Send + 'static>> for Error {
    #[inline]
    fn from(kind: Box<dyn std::error::Error + Sync + Send + 'static>) -> Self {
        Self::new(kind.to_string()).set_source(Some(kind.into()))
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    #[inline]
    fn from(kind: nom::Err<nom::error::Error<&str>>) -> Self {
        Self::new(kind.to_string())
    }
}

impl From<&str> for Error {
    #[inline]
    fn from(kind: &str) -> Self {
        Self::new(kind.to_string())
    }
}

impl From<String> for Error {
    #[inline]
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_summary_and_kind() {
        let res: Result<()> = Err(Error::new("Empty expression"));
        let err = res
            .chain_err_kind(ErrorKind::PatternCompile)
            .chain_err_summary(|| "Could not compile pattern")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PatternCompile);
        assert_eq!(err.details.as_ref(), "Empty expression");
        assert_eq!(
            err.to_string(),
            "Summary: Could not compile pattern\nEmpty expression\nKind: Pattern compilation \
             error"
        );
    }

    #[test]
    fn test_error_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.kind.is_io());
        assert!(std::error::Error::source(&err).is_some());
    }
}
