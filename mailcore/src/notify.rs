/*
 * mailcore - notify module
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

//! Synchronous notification bus.
//!
//! Every object that publishes events owns a [`Notify`] subject. Subjects
//! form a tree through [`Notify::set_parent`]: an event sent on a subject is
//! delivered to its own observers first and then to the observers of every
//! ancestor, so a single subscription on the [`NeoMutt`](crate::NeoMutt) root
//! sees everything.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use smallvec::SmallVec;

/// Filter an observer registers with.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NotifyType {
    /// Receive every event.
    All,
    Config,
    Email,
    Global,
    Mailbox,
    MailboxView,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MailboxEvent {
    Add,
    Delete,
    Change,
    /// Emails were added or removed behind the view's back; rebuild.
    Invalid,
    /// The backend synced; compact and renumber.
    Update,
    /// Sort settings changed; resort.
    Resort,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EmailEvent {
    Add,
    Delete,
    Change,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MviewEvent {
    Add,
    Change,
    Delete,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConfigEvent {
    Set,
    Reset,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GlobalEvent {
    Startup,
    Shutdown,
    Command,
}

/// Event type together with its subtype.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    Config(ConfigEvent),
    Email(EmailEvent),
    Global(GlobalEvent),
    Mailbox(MailboxEvent),
    MailboxView(MviewEvent),
}

impl EventKind {
    pub const fn notify_type(&self) -> NotifyType {
        match self {
            Self::Config(_) => NotifyType::Config,
            Self::Email(_) => NotifyType::Email,
            Self::Global(_) => NotifyType::Global,
            Self::Mailbox(_) => NotifyType::Mailbox,
            Self::MailboxView(_) => NotifyType::MailboxView,
        }
    }

    /// Events reporting a change to data that observers mirror cannot be
    /// stopped half way up the tree.
    pub const fn is_data_modifying(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Email(_) | Self::Mailbox(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(sub) => write!(fmt, "NT_CONFIG/{:?}", sub),
            Self::Email(sub) => write!(fmt, "NT_EMAIL/{:?}", sub),
            Self::Global(sub) => write!(fmt, "NT_GLOBAL/{:?}", sub),
            Self::Mailbox(sub) => write!(fmt, "NT_MAILBOX/{:?}", sub),
            Self::MailboxView(sub) => write!(fmt, "NT_MVIEW/{:?}", sub),
        }
    }
}

/// Identity of an [`Email`](crate::Email) at the time an event was sent.
///
/// `sequence` lets an observer notice that the slot at `msgno` now holds a
/// different message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EmailRef {
    pub msgno: usize,
    pub sequence: u64,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum EventData {
    #[default]
    None,
    Emails(SmallVec<[EmailRef; 8]>),
    Config {
        name: String,
    },
    Command {
        line: String,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub data: EventData,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            data: EventData::None,
        }
    }

    pub fn with_data(kind: EventKind, data: EventData) -> Self {
        Self { kind, data }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ObserverReturn {
    #[default]
    Continue,
    /// Do not deliver this event to the remaining ancestors.
    Stop,
}

pub type ObserverCallback = Rc<dyn Fn(&Event) -> ObserverReturn>;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObserverId(usize);

struct Observer {
    id: ObserverId,
    filter: NotifyType,
    callback: ObserverCallback,
}

#[derive(Default)]
struct NotifyInner {
    observers: RefCell<Vec<Observer>>,
    parent: RefCell<Weak<NotifyInner>>,
    next_id: Cell<usize>,
}

/// A notification subject. Cloning yields another handle to the same
/// subject.
#[derive(Clone, Default)]
pub struct Notify {
    inner: Rc<NotifyInner>,
}

impl fmt::Debug for Notify {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct(stringify!(Notify))
            .field("observers", &self.inner.observers.borrow().len())
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}

impl Notify {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every event sent on `self` to `parent` as well.
    pub fn set_parent(&self, parent: Option<&Self>) {
        *self.inner.parent.borrow_mut() = parent.map(|p| Rc::downgrade(&p.inner)).unwrap_or_default();
    }

    pub fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .borrow()
            .upgrade()
            .map(|inner| Self { inner })
    }

    /// Register `callback` for events of type `filter`.
    ///
    /// Registering the same callback for the same filter twice is rejected:
    /// the existing registration's id is returned and nothing is added.
    pub fn observer_add(&self, filter: NotifyType, callback: ObserverCallback) -> ObserverId {
        let mut observers = self.inner.observers.borrow_mut();
        if let Some(existing) = observers
            .iter()
            .find(|o| o.filter == filter && Rc::ptr_eq(&o.callback, &callback))
        {
            return existing.id;
        }
        let id = ObserverId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        observers.push(Observer {
            id,
            filter,
            callback,
        });
        id
    }

    /// Returns `true` if an observer was removed. Removing twice is harmless.
    pub fn observer_remove(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|o| o.id != id);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Deliver `event` to the matching observers of this subject, in
    /// registration order, then to those of each ancestor.
    ///
    /// Returns `false` if an observer stopped propagation.
    pub fn send(&self, event: &Event) -> bool {
        log::trace!("{}: {:?}", event.kind, event.data);
        let stoppable = !event.kind.is_data_modifying();
        let mut current = Some(self.inner.clone());
        while let Some(subject) = current {
            // Callbacks are free to add or remove observers while running.
            let callbacks: SmallVec<[ObserverCallback; 8]> = subject
                .observers
                .borrow()
                .iter()
                .filter(|o| o.filter == NotifyType::All || o.filter == event.kind.notify_type())
                .map(|o| o.callback.clone())
                .collect();
            for cb in callbacks {
                if cb(event) == ObserverReturn::Stop && stoppable {
                    return false;
                }
            }
            current = subject.parent.borrow().upgrade();
        }
        true
    }
}
