/*
 * mview - command line arguments
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

//! Command line arguments.

use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mview",
    about = "print the threaded index of a mailbox",
    version_short = "v"
)]
pub struct Opt {
    /// use specified configuration file
    #[structopt(short, long, parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// show only messages matching PATTERN
    #[structopt(short, long, value_name = "PATTERN")]
    pub limit: Option<String>,

    /// set a configuration option, e.g. `--set sort=reverse-date`. May be
    /// given more than once.
    #[structopt(short, long = "set", value_name = "NAME=VALUE", number_of_values = 1)]
    pub set: Vec<String>,

    /// draw thread trees with ASCII characters only
    #[structopt(long)]
    pub ascii: bool,

    /// collapse every thread before printing
    #[structopt(long)]
    pub collapse: bool,

    /// print a status line with message counts after the index
    #[structopt(long)]
    pub status: bool,

    /// list the pattern modifiers and exit
    #[structopt(long, display_order = 1)]
    pub help_patterns: bool,

    /// print location of the configuration file that would be loaded and
    /// exit
    #[structopt(long, display_order = 2)]
    pub print_config_path: bool,

    /// JSON array of messages, each an object with a `data` string holding
    /// the whole message and optional `flags` and `tags`
    #[structopt(value_name = "FIXTURE", parse(from_os_str))]
    pub fixture: Option<PathBuf>,
}
