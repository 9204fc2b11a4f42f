/*
 * mailcore - lib.rs
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

#![deny(
    rustdoc::redundant_explicit_links,
    unsafe_op_in_unsafe_fn,
    /* groups */
    clippy::correctness,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::style,
    /* restriction */
    clippy::dbg_macro,
    clippy::rc_buffer,
    clippy::as_underscore,
    clippy::assertions_on_result_states,
    /* rustdoc */
    rustdoc::broken_intra_doc_links,
    /* pedantic */
    clippy::doc_markdown,
    clippy::expect_fun_call,
    clippy::or_fun_call,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::unused_enumerate_index,
    clippy::manual_hash_one,
)]
#![allow(
    clippy::option_if_let_else,
    clippy::missing_const_for_fn,
    clippy::too_many_arguments,
    clippy::type_complexity,
    clippy::cognitive_complexity
)]
#![doc = include_str!("../README.md")]
//!
//! ## Description
//!
//! A crate that holds the state a mail client index is built from:
//! - A [`Mailbox`] of [`Email`] values with flags and counters (see module
//!   [`mailbox`])
//! - Parsed [`Envelope`] and [`Body`] values (see module [`email`])
//! - Build thread structures out of a list of mail via their `In-Reply-To`
//!   and `References` header values (see module [`thread`])
//! - Compile and evaluate search patterns (see module [`pattern`])
//! - A notification bus connecting them (see module [`notify`])
//!
//! Other exports are
//! - The [`NeoMutt`] root holding configuration, commands and the root event
//!   bus (see modules [`conf`] and [`neomutt`])
//! - A `debug` macro that forwards to [`log`] only when the `debug-tracing`
//!   feature is enabled. (see [`debug` macro](debug!))

#[macro_use]
pub mod dbg {

    #[allow(clippy::redundant_closure)]
    #[macro_export]
    macro_rules! debug {
        ($val:literal) => {
            {
                if cfg!(feature="debug-tracing") {
                    $crate::log::debug!($val);
                }
                $val
            }
        };
        ($val:expr) => {
            if cfg!(feature="debug-tracing") {
                let stringify = stringify!($val);
                match $val {
                    tmp => {
                        $crate::log::debug!("{} = {:?}", stringify, tmp);
                        tmp
                    }
                }
            } else {
                $val
            }
        };
        ($fmt:literal, $($arg:tt)*) => {
            if cfg!(feature="debug-tracing") {
                $crate::log::debug!($fmt, $($arg)*);
            }
        };
    }
}

pub use utils::{
    datetime::UnixTimestamp,
    logging::{LogLevel, LogTarget, StderrLogger},
};

pub mod backends;
pub use backends::*;
pub mod conf;
pub use conf::*;
pub mod crypt;
pub use crypt::{crypt_query, SecurityFlags};
pub mod email;
pub use email::*;
pub mod error;
pub use error::*;
pub mod mailbox;
pub use mailbox::*;
pub mod mview;
pub use mview::*;
pub mod neomutt;
pub use neomutt::*;
pub mod notify;
pub use notify::*;
pub mod pattern;
pub mod progress;
pub use progress::{Progress, ProgressAction};
pub mod score;
pub mod thread;
pub use thread::*;

#[macro_use]
pub mod utils;

#[macro_use]
extern crate serde_derive;
pub extern crate log;
pub extern crate nom;

#[macro_use]
extern crate bitflags;
pub extern crate indexmap;
pub extern crate regex;
pub extern crate smallvec;
