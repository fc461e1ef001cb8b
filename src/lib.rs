#![allow(clippy::module_inception)]

use std::{fmt::Display, path::Path};

use crate::errors::errors::{Error, ErrorTip};

pub mod ast;
pub mod background;
pub mod builder;
pub mod config;
pub mod duchain;
pub mod errors;
pub mod helpers;
pub mod language;
pub mod lexer;
pub mod macros;
pub mod parser;
pub mod types;

/// A location inside a document. Lines start at 1, columns at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: u32) -> Self {
        Position {
            line,
            column,
            offset,
        }
    }

    /// A cursor position, as handed in by editors that do not know byte offsets.
    pub fn cursor(line: u32, column: u32) -> Self {
        Position {
            line,
            column,
            offset: 0,
        }
    }

    pub fn null() -> Self {
        Position::default()
    }

    /// Compares on line and column only, so cursors built with
    /// [`Position::cursor`] can be checked against parsed ranges.
    pub fn before(&self, other: &Position) -> bool {
        (self.line, self.column) < (other.line, other.column)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span { start, end }
    }

    pub fn contains(&self, position: &Position) -> bool {
        !position.before(&self.start) && position.before(&self.end)
    }

    /// Like [`Span::contains`] but also accepts a cursor sitting right
    /// after the last character.
    pub fn touches(&self, position: &Position) -> bool {
        !position.before(&self.start) && !self.end.before(position)
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: if other.start.before(&self.start) { other.start } else { self.start },
            end: if self.end.before(&other.end) { other.end } else { self.end },
        }
    }
}

pub fn get_line_at_position(source: &str, position: &Position) -> Option<(usize, String, usize)> {
    let line_number = position.line as usize;
    let line = source.split_inclusive('\n').nth(line_number.checked_sub(1)?)?;

    Some((line_number, line.to_string(), position.column as usize))
}


/// Renders a problem in the caret format used by the CLI.
pub fn display_error(error: &Error, file: &Path, source: &str) -> String {
    /*
        error: message
        -> main.py
           |
        20 | a = $
           | ----^
    */

    let mut out = String::new();
    let position = error.get_position();

    if let ErrorTip::None = error.get_tip() {
        out.push_str(&format!("Error: {}\n", error.get_error_name()));
    } else {
        out.push_str(&format!("Error: {} ({})\n", error.get_error_name(), error.get_tip()));
    }
    out.push_str(&format!("-> {}\n", file.as_os_str().to_string_lossy()));

    let Some((line, line_text, line_pos)) = get_line_at_position(source, position) else {
        return out;
    };

    let line_string = line.to_string();
    let padding = line_string.len() + 2;

    out.push_str(&format!("{:>padding$}\n", "|"));

    let (line_text_removed, removed_whitespace) = remove_starting_whitespace(&line_text);
    out.push_str(&format!("{} | {}\n", line_string, line_text_removed.trim_end()));

    let arrows = line_pos.saturating_sub(removed_whitespace) + 1;

    out.push_str(&format!("{:>padding$} {:->arrows$}\n", "|", "^"));
    out
}

fn remove_starting_whitespace(string: &str) -> (String, usize) {
    let mut start = 0;
    for c in string.chars() {
        if c == ' ' || c == '\t' {
            start += 1;
        } else {
            break;
        }
    }

    (String::from(&string[start..]), start)
}
