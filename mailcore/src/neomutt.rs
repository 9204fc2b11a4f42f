/*
 * mailcore - neomutt module
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

//! The process-wide root: configuration, user command state and the root
//! event bus.
//!
//! Address lists such as `alternates` or `lists`, address groups, aliases,
//! score rules and subject rewrites live in [`Globals`]. They are changed
//! only through the commands in the [`CommandRegistry`].

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};

use crate::{
    conf::{ConfigSubset, ThreadingSettings},
    email::{parser::address::parse_address_list, Address, AddressList, Envelope},
    error::{Error, ErrorKind, Result},
    notify::{ConfigEvent, Event, EventData, EventKind, GlobalEvent, Notify},
    score::{parse_score, parse_unscore, ScoreRule},
};

/// Case-insensitive regular expressions, kept with their source text so
/// they can be removed again.
#[derive(Clone, Debug, Default)]
pub struct RegexList {
    entries: Vec<(String, Regex)>,
}

impl RegexList {
    /// Adding an expression already present is a no-op.
    pub fn add(&mut self, pattern: &str) -> Result<()> {
        if self.entries.iter().any(|(p, _)| p == pattern) {
            return Ok(());
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| {
                Error::new(format!("Bad regex {}: {}", pattern, err))
                    .set_kind(ErrorKind::Configuration)
            })?;
        self.entries.push((pattern.to_string(), regex));
        Ok(())
    }

    /// Remove `pattern`, or everything for `*`.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let before = self.entries.len();
        if pattern == "*" {
            self.entries.clear();
        } else {
            self.entries.retain(|(p, _)| p != pattern);
        }
        before != self.entries.len()
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.entries.iter().any(|(_, r)| r.is_match(s))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(p, _)| p.as_str())
    }
}

#[derive(Clone, Debug)]
struct Replace {
    pattern: String,
    regex: Regex,
    template: String,
}

/// Ordered regex substitutions, as used by `subjectrx`.
///
/// In a template `%L` and `%R` stand for the text left and right of the
/// match and `%N` for capture group `N`.
#[derive(Clone, Debug, Default)]
pub struct ReplaceList {
    entries: Vec<Replace>,
}

impl ReplaceList {
    /// Adding an existing expression replaces its template.
    pub fn add(&mut self, pattern: &str, template: &str) -> Result<()> {
        if let Some(r) = self.entries.iter_mut().find(|r| r.pattern == pattern) {
            r.template = template.to_string();
            return Ok(());
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| {
                Error::new(format!("Bad regex {}: {}", pattern, err))
                    .set_kind(ErrorKind::Configuration)
            })?;
        self.entries.push(Replace {
            pattern: pattern.to_string(),
            regex,
            template: template.to_string(),
        });
        Ok(())
    }

    pub fn remove(&mut self, pattern: &str) -> bool {
        let before = self.entries.len();
        if pattern == "*" {
            self.entries.clear();
        } else {
            self.entries.retain(|r| r.pattern != pattern);
        }
        before != self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every rule in turn over `s`. Returns `None` if `s` is empty.
    pub fn apply(&self, s: &str) -> Option<String> {
        if s.is_empty() {
            return None;
        }
        let mut src = s.to_string();
        for r in &self.entries {
            let Some(caps) = r.regex.captures(&src) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let mut dst = String::with_capacity(src.len());
            let mut chars = r.template.chars().peekable();
            while let Some(c) = chars.next() {
                if c != '%' {
                    dst.push(c);
                    continue;
                }
                match chars.peek().copied() {
                    Some('L') => {
                        chars.next();
                        dst.push_str(&src[..whole.start()]);
                    }
                    Some('R') => {
                        chars.next();
                        dst.push_str(&src[whole.end()..]);
                    }
                    _ => {
                        let mut n = String::new();
                        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                            n.push(d);
                            chars.next();
                        }
                        if let Some(m) = n.parse::<usize>().ok().and_then(|n| caps.get(n)) {
                            dst.push_str(m.as_str());
                        }
                    }
                }
            }
            log::trace!("subjectrx {}: {} -> {}", r.pattern, src, dst);
            src = dst;
        }
        Some(src)
    }
}

/// A named address group, see the `group` command.
#[derive(Clone, Debug, Default)]
pub struct Group {
    pub name: String,
    pub addrs: Vec<Address>,
    pub rx: RegexList,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn matches(&self, mailbox: &str) -> bool {
        self.rx.is_match(mailbox)
            || self
                .addrs
                .iter()
                .filter_map(|a| a.mailbox.as_deref())
                .any(|m| m.eq_ignore_ascii_case(mailbox))
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty() && self.rx.is_empty()
    }
}

/// State built up by user commands.
#[derive(Debug, Default)]
pub struct Globals {
    pub alternates: RegexList,
    pub unalternates: RegexList,
    pub mail_lists: RegexList,
    pub unmail_lists: RegexList,
    pub subscribed_lists: RegexList,
    pub unsubscribed_lists: RegexList,
    pub groups: IndexMap<String, Group>,
    pub aliases: IndexMap<String, AddressList>,
    pub score_rules: Vec<ScoreRule>,
    pub subject_rx: ReplaceList,
    /// Login name of the user.
    pub username: Option<String>,
    /// Score rules changed since the last rescore.
    pub need_rescore: bool,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    fn group_mut(&mut self, name: &str) -> &mut Group {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name))
    }

    /// Is `mailbox` a member of group `name`?
    pub fn group_match(&self, name: &str, mailbox: &str) -> bool {
        self.group(name).map_or(false, |g| g.matches(mailbox))
    }

    pub fn is_mail_list(&self, addr: &Address) -> bool {
        let Some(mailbox) = addr.mailbox.as_deref() else {
            return false;
        };
        !self.unmail_lists.is_match(mailbox) && self.mail_lists.is_match(mailbox)
    }

    pub fn is_subscribed_list(&self, addr: &Address) -> bool {
        let Some(mailbox) = addr.mailbox.as_deref() else {
            return false;
        };
        !self.unmail_lists.is_match(mailbox)
            && !self.unsubscribed_lists.is_match(mailbox)
            && self.subscribed_lists.is_match(mailbox)
    }

    /// Does `addr` belong to the user? Checks the login name, the `from`
    /// address and `alternates` minus `unalternates`.
    pub fn addr_is_user(&self, addr: &Address, from: Option<&str>) -> bool {
        let Some(mailbox) = addr.mailbox.as_deref() else {
            return false;
        };
        if let Some(user) = self.username.as_deref() {
            let local = mailbox.split('@').next().unwrap_or(mailbox);
            if mailbox.eq_ignore_ascii_case(user)
                || (addr.is_local() && local.eq_ignore_ascii_case(user))
            {
                return true;
            }
        }
        let from_mailbox = from.and_then(|f| {
            parse_address_list(f)
                .into_iter()
                .find_map(|a| a.mailbox)
        });
        if from_mailbox.map_or(false, |f| f.eq_ignore_ascii_case(mailbox)) {
            return true;
        }
        if self.unalternates.is_match(mailbox) {
            return false;
        }
        self.alternates.is_match(mailbox)
    }

    /// Is `addr` the target of some alias?
    pub fn alias_reverse_lookup(&self, addr: &Address) -> bool {
        self.aliases.values().flatten().any(|a| a.mailbox_eq(addr))
    }

    /// Set `disp_subj` from the `subjectrx` rules. Returns `true` if the
    /// envelope has a display subject afterwards.
    pub fn subjectrx_apply(&self, env: &mut Envelope) -> bool {
        if self.subject_rx.is_empty() {
            return false;
        }
        if env.disp_subj.is_some() {
            return true;
        }
        env.disp_subj = env.subject().and_then(|s| self.subject_rx.apply(s));
        env.disp_subj.is_some()
    }
}

pub type CommandFn = fn(&mut Globals, &ConfigSubset, &[String]) -> Result<()>;

/// A user command the core understands.
#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub desc: &'static str,
    pub parse: CommandFn,
}

impl fmt::Debug for Command {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct(stringify!(Command))
            .field("name", &self.name)
            .finish()
    }
}

macro_rules! define_commands {
    ($({ name: $name:literal, desc: $desc:literal, parser: $parser:path }),* $(,)?) => {
        const BUILTIN_COMMANDS: &[Command] = &[$(Command { name: $name, desc: $desc, parse: $parser }),*];
    };
}

define_commands! {
    { name: "alias", desc: "alias [-group name] key address...", parser: parse_alias },
    { name: "alternates", desc: "alternates [-group name] regex...", parser: parse_alternates },
    { name: "group", desc: "group [-group name] {-rx regex... | -addr address...}", parser: parse_group },
    { name: "lists", desc: "lists [-group name] regex...", parser: parse_lists },
    { name: "score", desc: "score pattern [=]value", parser: parse_score },
    { name: "subjectrx", desc: "subjectrx regex replacement", parser: parse_subjectrx },
    { name: "subscribe", desc: "subscribe [-group name] regex...", parser: parse_subscribe },
    { name: "unalias", desc: "unalias {* | key...}", parser: parse_unalias },
    { name: "unalternates", desc: "unalternates {* | regex...}", parser: parse_unalternates },
    { name: "ungroup", desc: "ungroup [-group name] {* | -rx regex... | -addr address...}", parser: parse_ungroup },
    { name: "unlists", desc: "unlists {* | regex...}", parser: parse_unlists },
    { name: "unscore", desc: "unscore {* | pattern...}", parser: parse_unscore },
    { name: "unsubjectrx", desc: "unsubjectrx {* | regex}", parser: parse_unsubjectrx },
    { name: "unsubscribe", desc: "unsubscribe {* | regex...}", parser: parse_unsubscribe },
}

/// Table of known commands.
#[derive(Debug)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: BUILTIN_COMMANDS.to_vec(),
        }
    }

    /// Returns `false` if a command of that name exists already.
    pub fn register(&mut self, cmd: Command) -> bool {
        if self.lookup(cmd.name).is_some() {
            return false;
        }
        self.commands.push(cmd);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.commands.iter()
    }
}

fn too_few_arguments(cmd: &str) -> Error {
    Error::new(format!("{}: too few arguments", cmd)).set_kind(ErrorKind::Configuration)
}

/// Split leading `-group name` pairs off `args`.
fn parse_grouplist<'a>(cmd: &str, mut args: &'a [String]) -> Result<(Vec<&'a str>, &'a [String])> {
    let mut groups = vec![];
    while let Some(first) = args.first() {
        if first != "-group" {
            break;
        }
        let name = args.get(1).ok_or_else(|| too_few_arguments(cmd))?;
        groups.push(name.as_str());
        args = &args[2..];
    }
    Ok((groups, args))
}

fn parse_alternates(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("alternates", args)?;
    if args.is_empty() {
        return Err(too_few_arguments("alternates"));
    }
    for pat in args {
        g.unalternates.remove(pat);
        g.alternates.add(pat)?;
        for name in &groups {
            g.group_mut(name).rx.add(pat)?;
        }
    }
    Ok(())
}

fn parse_unalternates(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(too_few_arguments("unalternates"));
    }
    for pat in args {
        g.alternates.remove(pat);
        if pat != "*" {
            g.unalternates.add(pat)?;
        }
    }
    Ok(())
}

fn parse_lists(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("lists", args)?;
    if args.is_empty() {
        return Err(too_few_arguments("lists"));
    }
    for pat in args {
        g.unmail_lists.remove(pat);
        g.mail_lists.add(pat)?;
        for name in &groups {
            g.group_mut(name).rx.add(pat)?;
        }
    }
    Ok(())
}

fn parse_unlists(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(too_few_arguments("unlists"));
    }
    for pat in args {
        g.subscribed_lists.remove(pat);
        g.mail_lists.remove(pat);
        if pat != "*" {
            g.unmail_lists.add(pat)?;
        }
    }
    Ok(())
}

fn parse_subscribe(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("subscribe", args)?;
    if args.is_empty() {
        return Err(too_few_arguments("subscribe"));
    }
    for pat in args {
        g.unmail_lists.remove(pat);
        g.unsubscribed_lists.remove(pat);
        g.mail_lists.add(pat)?;
        g.subscribed_lists.add(pat)?;
        for name in &groups {
            g.group_mut(name).rx.add(pat)?;
        }
    }
    Ok(())
}

fn parse_unsubscribe(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(too_few_arguments("unsubscribe"));
    }
    for pat in args {
        g.subscribed_lists.remove(pat);
        if pat != "*" {
            g.unsubscribed_lists.add(pat)?;
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum GroupMode {
    None,
    Rx,
    Addr,
}

fn parse_group(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("group", args)?;
    if groups.is_empty() {
        return Err(Error::new("group: missing -group name").set_kind(ErrorKind::Configuration));
    }
    let mut mode = GroupMode::None;
    for arg in args {
        match arg.as_str() {
            "-rx" => mode = GroupMode::Rx,
            "-addr" => mode = GroupMode::Addr,
            value => match mode {
                GroupMode::None => {
                    return Err(Error::new("group: missing -rx or -addr")
                        .set_kind(ErrorKind::Configuration))
                }
                GroupMode::Rx => {
                    for name in &groups {
                        g.group_mut(name).rx.add(value)?;
                    }
                }
                GroupMode::Addr => {
                    let addrs = parse_address_list(value);
                    if addrs.is_empty() {
                        return Err(Error::new(format!("group: bad address {}", value))
                            .set_kind(ErrorKind::Configuration));
                    }
                    for name in &groups {
                        let group = g.group_mut(name);
                        for a in addrs.iter() {
                            if !group.addrs.iter().any(|b| b.mailbox_eq(a)) {
                                group.addrs.push(a.clone());
                            }
                        }
                    }
                }
            },
        }
    }
    Ok(())
}

fn parse_ungroup(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("ungroup", args)?;
    if groups.is_empty() {
        return Err(Error::new("ungroup: missing -group name").set_kind(ErrorKind::Configuration));
    }
    let mut mode = GroupMode::None;
    for arg in args {
        match (arg.as_str(), mode) {
            ("*", _) => {
                for name in &groups {
                    g.groups.shift_remove(*name);
                }
                return Ok(());
            }
            ("-rx", _) => mode = GroupMode::Rx,
            ("-addr", _) => mode = GroupMode::Addr,
            (_, GroupMode::None) => {
                return Err(
                    Error::new("ungroup: missing -rx or -addr").set_kind(ErrorKind::Configuration)
                )
            }
            (value, GroupMode::Rx) => {
                for name in &groups {
                    if let Some(group) = g.groups.get_mut(*name) {
                        group.rx.remove(value);
                    }
                }
            }
            (value, GroupMode::Addr) => {
                let addrs = parse_address_list(value);
                for name in &groups {
                    if let Some(group) = g.groups.get_mut(*name) {
                        group
                            .addrs
                            .retain(|a| !addrs.iter().any(|b| b.mailbox_eq(a)));
                    }
                }
            }
        }
    }
    g.groups.retain(|_, group| !group.is_empty());
    Ok(())
}

fn parse_alias(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    let (groups, args) = parse_grouplist("alias", args)?;
    let [key, rest @ ..] = args else {
        return Err(too_few_arguments("alias"));
    };
    if rest.is_empty() {
        return Err(too_few_arguments("alias"));
    }
    let addrs = parse_address_list(&rest.join(" "));
    if addrs.is_empty() {
        return Err(Error::new(format!("alias {}: no valid address", key))
            .set_kind(ErrorKind::Configuration));
    }
    for name in &groups {
        g.group_mut(name).addrs.extend(addrs.iter().cloned());
    }
    g.aliases.insert(key.clone(), addrs);
    Ok(())
}

fn parse_unalias(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(too_few_arguments("unalias"));
    }
    for key in args {
        if key == "*" {
            g.aliases.clear();
            return Ok(());
        }
        g.aliases.shift_remove(key);
    }
    Ok(())
}

fn parse_subjectrx(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    match args {
        [regex, template] => g.subject_rx.add(regex, template),
        [_] | [] => Err(too_few_arguments("subjectrx")),
        _ => Err(Error::new("subjectrx: too many arguments").set_kind(ErrorKind::Configuration)),
    }
}

fn parse_unsubjectrx(g: &mut Globals, _: &ConfigSubset, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(too_few_arguments("unsubjectrx"));
    }
    for pat in args {
        g.subject_rx.remove(pat);
    }
    Ok(())
}

/// Split a command line into words.
///
/// Double quotes group words and honour backslash escapes, single quotes
/// are literal, and an unquoted `#` at the start of a word ends the line.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut ret = vec![];
    let mut chars = line.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek() {
            None | Some('#') => break,
            _ => {}
        }
        let mut word = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
            match c {
                '\\' => word.extend(chars.next()),
                '"' => loop {
                    match chars.next() {
                        None => {
                            return Err(Error::new(format!("Unterminated quote in `{}`", line))
                                .set_kind(ErrorKind::Configuration))
                        }
                        Some('"') => break,
                        Some('\\') => word.extend(chars.next()),
                        Some(c) => word.push(c),
                    }
                },
                '\'' => loop {
                    match chars.next() {
                        None => {
                            return Err(Error::new(format!("Unterminated quote in `{}`", line))
                                .set_kind(ErrorKind::Configuration))
                        }
                        Some('\'') => break,
                        Some(c) => word.push(c),
                    }
                },
                c => word.push(c),
            }
        }
        ret.push(word);
    }
    Ok(ret)
}

/// The root object: configuration, command state and the root of the event
/// tree. Every mailbox view forwards its events here.
#[derive(Debug)]
pub struct NeoMutt {
    pub sub: Rc<RefCell<ConfigSubset>>,
    pub globals: Rc<RefCell<Globals>>,
    pub commands: CommandRegistry,
    pub notify: Notify,
}

impl Default for NeoMutt {
    fn default() -> Self {
        Self::new(ConfigSubset::default())
    }
}

impl NeoMutt {
    pub fn new(sub: ConfigSubset) -> Self {
        let globals = Globals {
            username: std::env::var("USER").ok().filter(|u| !u.is_empty()),
            ..Globals::default()
        };
        let ret = Self {
            sub: Rc::new(RefCell::new(sub)),
            globals: Rc::new(RefCell::new(globals)),
            commands: CommandRegistry::new(),
            notify: Notify::new(),
        };
        ret.notify
            .send(&Event::new(EventKind::Global(GlobalEvent::Startup)));
        ret
    }

    pub fn from_settings(settings: ThreadingSettings) -> Result<Self> {
        Ok(Self::new(ConfigSubset::new(settings)?))
    }

    /// Change an option and publish `NT_CONFIG/Set`.
    pub fn set_config(&self, name: &str, value: &str) -> Result<()> {
        self.sub.borrow_mut().set(name, value)?;
        self.notify.send(&Event::with_data(
            EventKind::Config(ConfigEvent::Set),
            EventData::Config {
                name: name.to_string(),
            },
        ));
        Ok(())
    }

    /// Restore an option's default and publish `NT_CONFIG/Reset`.
    pub fn reset_config(&self, name: &str) -> Result<()> {
        self.sub.borrow_mut().reset(name)?;
        self.notify.send(&Event::with_data(
            EventKind::Config(ConfigEvent::Reset),
            EventData::Config {
                name: name.to_string(),
            },
        ));
        Ok(())
    }

    fn parse_set(&self, args: &[String]) -> Result<()> {
        let mut args = args.iter().peekable();
        while let Some(arg) = args.next() {
            if let Some((name, value)) = arg.split_once('=') {
                let value = if value.is_empty() {
                    args.next().map(String::as_str).unwrap_or_default()
                } else {
                    value
                };
                self.set_config(name.trim(), value)?;
            } else if args.peek().map(|a| a.as_str()) == Some("=") {
                args.next();
                let value = args.next().ok_or_else(|| too_few_arguments("set"))?;
                self.set_config(arg, value)?;
            } else if let Some(name) = arg
                .strip_prefix("no")
                .filter(|_| self.sub.borrow().get(arg).is_none())
            {
                self.set_config(name, "no")?;
            } else {
                self.set_config(arg, "yes")?;
            }
        }
        Ok(())
    }

    /// Run one line of configuration.
    pub fn parse_line(&self, line: &str) -> Result<()> {
        let words = tokenize(line)?;
        let Some((cmd, args)) = words.split_first() else {
            return Ok(());
        };
        match cmd.as_str() {
            "set" => self.parse_set(args)?,
            "unset" => {
                for name in args {
                    self.set_config(name, "no")?;
                }
            }
            "reset" => {
                for name in args {
                    self.reset_config(name)?;
                }
            }
            name => {
                let command = self.commands.lookup(name).ok_or_else(|| {
                    Error::new(format!("{}: unknown command", name))
                        .set_kind(ErrorKind::Configuration)
                })?;
                (command.parse)(&mut self.globals.borrow_mut(), &self.sub.borrow(), args)?;
            }
        }
        self.notify.send(&Event::with_data(
            EventKind::Global(GlobalEvent::Command),
            EventData::Command {
                line: line.trim().to_string(),
            },
        ));
        Ok(())
    }

    /// Run a whole configuration file, stopping at the first error.
    pub fn source(&self, contents: &str) -> Result<()> {
        for (i, line) in contents.lines().enumerate() {
            self.parse_line(line)
                .map_err(|err| err.set_summary(format!("line {}", i + 1)))?;
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.notify
            .send(&Event::new(EventKind::Global(GlobalEvent::Shutdown)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize(r#"alias  bob "Bob \"B\" <bob@example.com>" # comment"#).unwrap(),
            vec!["alias", "bob", "Bob \"B\" <bob@example.com>"]
        );
        assert_eq!(tokenize("score '~f alice' 10").unwrap(), vec!["score", "~f alice", "10"]);
        assert!(tokenize("lists \"open").is_err());
        assert!(tokenize("   # only a comment").unwrap().is_empty());
    }

    #[test]
    fn test_lists_and_alternates() {
        let neomutt = NeoMutt::default();
        neomutt
            .source(
                "lists announce@.*\nsubscribe -group dev dev@example\\.org\nunlists announce@.*\nalternates me@work\\.com\n",
            )
            .unwrap();
        let g = neomutt.globals.borrow();
        let dev = Address::new(None, "dev@example.org");
        let ann = Address::new(None, "announce@example.org");
        assert!(g.is_mail_list(&dev));
        assert!(g.is_subscribed_list(&dev));
        assert!(!g.is_mail_list(&ann));
        assert!(g.group_match("dev", "DEV@example.org"));
        assert!(g.addr_is_user(&Address::new(None, "Me@Work.com"), None));
        assert!(g.addr_is_user(&Address::new(None, "x@y.org"), Some("X <x@y.org>")));
        drop(g);

        neomutt.parse_line("unalternates me@work\\.com").unwrap();
        assert!(!neomutt
            .globals
            .borrow()
            .addr_is_user(&Address::new(None, "me@work.com"), None));
        assert!(neomutt.parse_line("frobnicate").is_err());
        let err = neomutt.source("lists a\ngroup -rx x\n").unwrap_err();
        assert_eq!(err.summary.as_deref(), Some("line 2"));
        assert_eq!(err.details, "group: missing -group name");
    }

    #[test]
    fn test_subjectrx_and_aliases() {
        let neomutt = NeoMutt::default();
        neomutt
            .parse_line(r#"subjectrx '\[[^\]]*\] ' '%L%R'"#)
            .unwrap();
        neomutt
            .parse_line("alias -group friends bob Bob <bob@example.com>")
            .unwrap();
        let g = neomutt.globals.borrow();
        let mut env = Envelope::new();
        env.set_subject(Some("[list] hello"), None);
        assert!(g.subjectrx_apply(&mut env));
        assert_eq!(env.disp_subj.as_deref(), Some("hello"));
        assert!(g.alias_reverse_lookup(&Address::new(None, "bob@example.com")));
        assert!(g.group_match("friends", "bob@example.com"));
    }

    #[test]
    fn test_set_config_sends_event() {
        let neomutt = NeoMutt::default();
        let names = Rc::new(RefCell::new(vec![]));
        let names2 = names.clone();
        neomutt.notify.observer_add(
            crate::notify::NotifyType::Config,
            Rc::new(move |ev: &Event| {
                if let EventData::Config { name } = &ev.data {
                    names2.borrow_mut().push(name.clone());
                }
                crate::notify::ObserverReturn::Continue
            }),
        );
        neomutt
            .parse_line("set sort=reverse-date nostrict_threads narrow_tree")
            .unwrap();
        assert_eq!(
            names.borrow().as_slice(),
            &["sort".to_string(), "strict_threads".into(), "narrow_tree".into()]
        );
        assert!(neomutt.sub.borrow().settings().sort.reverse);
        assert!(neomutt.sub.borrow().get_bool("narrow_tree").unwrap());
        assert!(neomutt.parse_line("set no_such_option=1").is_err());
    }
}
