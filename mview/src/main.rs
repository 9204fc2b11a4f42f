/*
 * mview - main
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

//! Command line index viewer.
//!
//! Loads a JSON message fixture into an in-memory mailbox, builds a
//! [`MailboxView`] over it with the configured threading and sorting,
//! optionally limits it with a pattern and prints the index to stdout.

#[macro_use]
extern crate serde_derive;

use std::{io::Write, rc::Rc};

use mailcore::{
    error::{Error, ErrorKind, Result},
    mailbox_open,
    pattern::PATTERN_FLAGS,
    InMemoryBackend, MailBackend, MailboxView, NeoMutt,
};
use structopt::StructOpt;

mod args;
mod conf;
mod index;

use args::Opt;

fn main() {
    let opt = Opt::from_args();
    ::std::process::exit(match run_app(opt) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}", err);
            1
        }
    });
}

fn help_patterns<W: Write>(out: &mut W) -> Result<()> {
    for entry in PATTERN_FLAGS {
        writeln!(out, "~{}  {}", entry.tag, entry.desc)?;
    }
    Ok(())
}

fn run_app(opt: Opt) -> Result<()> {
    if opt.help_patterns {
        return help_patterns(&mut std::io::stdout().lock());
    }
    if let Some(config_location) = opt.config.as_ref() {
        std::env::set_var(conf::CONFIG_VAR, config_location);
    }
    if opt.print_config_path {
        println!("{}", conf::get_config_file()?.display());
        return Ok(());
    }

    let Some(fixture) = opt.fixture.as_ref() else {
        return Err(Error::new("No message fixture given. See `mview --help`.")
            .set_kind(ErrorKind::Configuration));
    };
    let mut settings = conf::Settings::new()?;
    if opt.ascii {
        settings.index.ascii = true;
    }

    let neomutt = NeoMutt::from_settings(settings.threading.clone())?;
    for (i, line) in settings.commands.iter().enumerate() {
        neomutt
            .parse_line(line)
            .map_err(|err| err.set_summary(format!("commands[{}]", i)))?;
    }
    for assignment in &opt.set {
        neomutt.parse_line(&format!("set {}", assignment))?;
    }

    let path = fixture.display().to_string();
    let backend = InMemoryBackend::from_path(&path, &neomutt.sub.borrow())?
        .with_padding(settings.index.padding);
    let backend: Rc<dyn MailBackend> = Rc::new(backend);
    let mailbox = mailbox_open(backend, &path)?;
    let mut view = MailboxView::new(mailbox, &neomutt)?;
    log::trace!("{}: {} messages", path, view.vcount());

    if let Some(pattern) = opt.limit.as_deref() {
        view.limit(pattern, None)?;
    }
    if opt.collapse {
        view.collapse_all(true)?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    index::print_index(&view, &settings.index, &mut out)?;
    if opt.status {
        writeln!(out, "{}", index::status_line(&view))?;
    }
    drop(view);
    neomutt.shutdown();
    Ok(())
}
