//! The line-based metadata command grammar understood by `--set` and
//! `--input-metadata`, and the matching dump format. Commands:
//!
//! ```text
//! loop <start> <duration> <name|null> <desc|null>
//! cue <position> <name|null> <desc|null>
//! smpl-pitch <u64|null>
//! info-XXXX <string|null>
//! ```
//!
//! Strings are double-quoted with `\"`, `\\`, `\r` and `\n` escapes.

use crate::info::info_tag_index;
use crate::prelude::*;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("could not parse meta string '{0}'")]
    NoCommand(String),
    #[error("unknown set command '{0}'")]
    UnknownCommand(String),
    #[error("'{0}' is an unsupported INFO tag")]
    UnsupportedInfo(String),
    #[error("{0}")]
    BadArguments(&'static str),
    #[error("cannot add a loop of zero duration")]
    ZeroDuration,
    #[error("the marker would lie beyond the end of the sample")]
    OutOfRange,
    #[error("cannot add another marker; the metadata table is full")]
    TooManyMarkers,
}

/// One parsed metadata command, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Loop { start: u64, duration: u64, name: Option<String>, desc: Option<String> },
    Cue { position: u64, name: Option<String>, desc: Option<String> },
    SmplPitch(Option<u64>),
    Info { tag: usize, value: Option<String> },
}

struct Scanner<'s> {
    rest: &'s str,
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

impl<'s> Scanner<'s> {
    fn new(line: &'s str) -> Self {
        Scanner { rest: line }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start_matches(is_space);
    }

    /// At least one whitespace character, then any more of them.
    fn ws(&mut self) -> bool {
        let trimmed = self.rest.trim_start_matches(is_space);
        let some = trimmed.len() < self.rest.len();
        self.rest = trimmed;
        some
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest.is_empty()
    }

    fn word(&mut self) -> Option<&'s str> {
        let end = self.rest.find(is_space).unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(word)
    }

    fn int(&mut self) -> Option<u64> {
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        if end == 0 {
            return None;
        }
        let (digits, rest) = self.rest.split_at(end);
        let value = digits.parse::<u64>().ok()?;
        self.rest = rest;
        Some(value)
    }

    /// A double-quoted string with escapes, or the bare word `null`.
    fn string_or_null(&mut self) -> Option<Option<String>> {
        if let Some(rest) = self.rest.strip_prefix("null") {
            self.rest = rest;
            return Some(None);
        }

        let mut chars = self.rest.strip_prefix('"')?.char_indices();
        let mut value = String::new();
        loop {
            let (at, c) = chars.next()?;
            match c {
                '"' => {
                    self.rest = &self.rest[at + 2..];
                    return Some(Some(value));
                }
                '\\' => match chars.next()?.1 {
                    '"' => value.push('"'),
                    '\\' => value.push('\\'),
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    _ => return None,
                },
                c => value.push(c),
            }
        }
    }
}

/// Parses one metadata line. Whitespace-only lines are an error; the
/// caller is expected to have filtered them.
pub fn parse(line: &str) -> Result<MetaCommand, CommandError> {
    let mut s = Scanner::new(line);
    s.skip_ws();
    let Some(command) = s.word() else {
        return Err(CommandError::NoCommand(line.to_string()));
    };
    s.skip_ws();

    if let Some(tag) = command.strip_prefix("info-") {
        return parse_info(tag, s);
    }
    match command {
        "loop" => parse_loop(s),
        "cue" => parse_cue(s),
        "smpl-pitch" => parse_smpl_pitch(s),
        _ => Err(CommandError::UnknownCommand(command.to_string())),
    }
}

fn parse_loop(mut s: Scanner) -> Result<MetaCommand, CommandError> {
    const USAGE: &str =
        "loop command expects two integer arguments followed by two string or null arguments";
    let bad = || CommandError::BadArguments(USAGE);

    let start = s.int().ok_or_else(bad)?;
    if !s.ws() {
        return Err(bad());
    }
    let duration = s.int().ok_or_else(bad)?;
    if !s.ws() {
        return Err(bad());
    }
    let name = s.string_or_null().ok_or_else(bad)?;
    if !s.ws() {
        return Err(bad());
    }
    let desc = s.string_or_null().ok_or_else(bad)?;
    if !s.at_end() {
        return Err(bad());
    }
    Ok(MetaCommand::Loop { start, duration, name, desc })
}

fn parse_cue(mut s: Scanner) -> Result<MetaCommand, CommandError> {
    const USAGE: &str =
        "cue command expects one integer argument followed by two string or null arguments";
    let bad = || CommandError::BadArguments(USAGE);

    let position = s.int().ok_or_else(bad)?;
    if !s.ws() {
        return Err(bad());
    }
    let name = s.string_or_null().ok_or_else(bad)?;
    if !s.ws() {
        return Err(bad());
    }
    let desc = s.string_or_null().ok_or_else(bad)?;
    if !s.at_end() {
        return Err(bad());
    }
    Ok(MetaCommand::Cue { position, name, desc })
}

fn parse_smpl_pitch(mut s: Scanner) -> Result<MetaCommand, CommandError> {
    const USAGE: &str = "smpl-pitch command expects one integer or null argument";
    let bad = || CommandError::BadArguments(USAGE);

    let pitch = match s.string_or_null() {
        Some(None) => None,
        _ => Some(s.int().ok_or_else(bad)?),
    };
    if !s.at_end() {
        return Err(bad());
    }
    Ok(MetaCommand::SmplPitch(pitch))
}

fn parse_info(tag: &str, mut s: Scanner) -> Result<MetaCommand, CommandError> {
    const USAGE: &str = "info commands require exactly one string or 'null' argument";

    let index = tag
        .as_bytes()
        .try_into()
        .ok()
        .and_then(info_tag_index)
        .ok_or_else(|| CommandError::UnsupportedInfo(tag.to_string()))?;
    let value = s
        .string_or_null()
        .ok_or(CommandError::BadArguments(USAGE))?;
    if !s.at_end() {
        return Err(CommandError::BadArguments(USAGE));
    }
    Ok(MetaCommand::Info { tag: index, value })
}

/// Applies a parsed command, refusing values which would break the
/// mounted structure's invariants.
pub fn apply(wav: &mut SampleWav, cmd: MetaCommand) -> Result<(), CommandError> {
    let frames = wav.data_frames as u64;
    match cmd {
        MetaCommand::Loop { start, duration, name, desc } => {
            if duration == 0 {
                return Err(CommandError::ZeroDuration);
            }
            if start >= frames || duration > u32::MAX as u64 || start + duration > frames {
                return Err(CommandError::OutOfRange);
            }
            if wav.markers.len() >= MAX_MARKERS {
                return Err(CommandError::TooManyMarkers);
            }
            wav.markers.push(Marker {
                position: start as u32,
                length: duration as u32,
                name,
                desc,
                ..Marker::default()
            });
        }
        MetaCommand::Cue { position, name, desc } => {
            if position >= frames {
                return Err(CommandError::OutOfRange);
            }
            if wav.markers.len() >= MAX_MARKERS {
                return Err(CommandError::TooManyMarkers);
            }
            wav.markers.push(Marker {
                position: position as u32,
                name,
                desc,
                ..Marker::default()
            });
        }
        MetaCommand::SmplPitch(pitch) => wav.pitch_info = pitch,
        MetaCommand::Info { tag, value } => wav.info[tag] = value,
    }
    Ok(())
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn quoted_or_null(s: Option<&str>) -> String {
    match s {
        Some(s) => {
            let mut out = String::new();
            push_quoted(&mut out, s);
            out
        }
        None => "null".to_string(),
    }
}

/// Writes the metadata of `wav` as command lines that [`parse`] accepts.
pub fn dump<W: std::io::Write>(wav: &SampleWav, out: &mut W) -> std::io::Result<()> {
    for (i, value) in wav.info.iter().enumerate() {
        if let Some(value) = value {
            writeln!(out, "info-{} {}", crate::info::info_tag_name(i), quoted_or_null(Some(value.as_str())))?;
        }
    }
    if let Some(pitch) = wav.pitch_info {
        writeln!(out, "smpl-pitch {pitch}")?;
    }
    for m in &wav.markers {
        let name = quoted_or_null(m.name.as_deref());
        let desc = quoted_or_null(m.desc.as_deref());
        if m.length > 0 {
            writeln!(out, "loop {} {} {} {}", m.position, m.length, name, desc)?;
        } else {
            writeln!(out, "cue {} {} {}", m.position, name, desc)?;
        }
    }
    Ok(())
}
