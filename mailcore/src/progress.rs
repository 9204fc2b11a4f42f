/*
 * mailcore - progress module
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

//! Progress reporting and cooperative cancellation for bulk operations.

use std::borrow::Cow;

use crate::error::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProgressAction {
    #[default]
    Continue,
    Cancel,
}

/// Receives `(step, total, phase)` updates; `step` never decreases within a
/// phase.
pub trait Progress {
    fn update(&mut self, step: usize, total: usize, phase: &str) -> ProgressAction;
}

impl<F> Progress for F
where
    F: FnMut(usize, usize, &str) -> ProgressAction,
{
    fn update(&mut self, step: usize, total: usize, phase: &str) -> ProgressAction {
        self(step, total, phase)
    }
}

/// Tracks the work done in one phase and forwards it to an optional
/// [`Progress`] callback.
pub struct ProgressTracker<'p> {
    description: Cow<'static, str>,
    total_work: usize,
    done: usize,
    callback: Option<&'p mut dyn Progress>,
}

impl<'p> ProgressTracker<'p> {
    pub fn new<D>(description: D, total_work: usize, callback: Option<&'p mut dyn Progress>) -> Self
    where
        D: Into<Cow<'static, str>>,
    {
        Self {
            description: description.into(),
            total_work,
            done: 0,
            callback,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn percentage(&self) -> usize {
        if self.total_work == 0 {
            100
        } else {
            (self.done * 100 / self.total_work).min(100)
        }
    }

    pub fn add_work(&mut self, n: usize) {
        self.total_work += n;
    }

    /// Mark `n` more units as done and report.
    ///
    /// Returns an error of kind [`ErrorKind::Cancelled`] if the callback
    /// asked to stop.
    pub fn work(&mut self, n: usize) -> Result<()> {
        self.set_work(self.done + n)
    }

    /// Report that `n` units are done. Smaller values than already reported
    /// are ignored.
    pub fn set_work(&mut self, n: usize) -> Result<()> {
        self.done = self.done.max(n);
        let Some(cb) = self.callback.as_mut() else {
            return Ok(());
        };
        match cb.update(self.done, self.total_work, &self.description) {
            ProgressAction::Continue => Ok(()),
            ProgressAction::Cancel => {
                log::debug!("{}: cancelled at {}/{}", self.description, self.done, self.total_work);
                Err(Error::new(format!("{} interrupted", self.description))
                    .set_kind(ErrorKind::Cancelled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_monotonic_and_cancel() {
        let mut seen = vec![];
        let mut cb = |step: usize, total: usize, _phase: &str| {
            seen.push((step, total));
            if step >= 3 {
                ProgressAction::Cancel
            } else {
                ProgressAction::Continue
            }
        };
        let mut tracker = ProgressTracker::new("Searching", 4, Some(&mut cb));
        tracker.work(1).unwrap();
        tracker.set_work(0).unwrap();
        tracker.work(1).unwrap();
        assert_eq!(tracker.percentage(), 50);
        let err = tracker.work(1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        drop(tracker);
        assert_eq!(seen, vec![(1, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    fn test_progress_tracker_without_callback() {
        let mut tracker = ProgressTracker::new("Sorting", 0, None);
        assert!(tracker.work(5).is_ok());
        assert_eq!(tracker.percentage(), 100);
    }
}
