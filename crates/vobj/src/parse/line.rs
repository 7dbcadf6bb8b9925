//! Content-line grammar: `[group.]NAME[;PARAM[=VALUE[,VALUE]*]]*:VALUE`.

use crate::core::contentline::ContentLine;
use crate::error::{Result, VObjectError};

/// Parses one logical line into a [`ContentLine`] (still wire-encoded).
pub fn parse_content_line(line: &str, line_number: usize) -> Result<ContentLine> {
    let (name, group, params, value) = parse_line(line, line_number)?;
    Ok(ContentLine::from_parts(
        &name,
        params,
        value,
        group,
        line_number,
    ))
}

/// Raw grammar split: returns (name, group, params, value). Each params
/// entry is `[name]` for a bare token or `[name, value...]` otherwise.
/// Underscores in names become dashes to cope with Lotus Notes output.
pub fn parse_line(
    line: &str,
    line_number: usize,
) -> Result<(String, Option<String>, Vec<Vec<String>>, String)> {
    let fail = || VObjectError::parse_at(format!("Failed to parse line: {line}"), line_number);
    let mut chars = Cursor::new(line);

    let first = chars.take_name().ok_or_else(fail)?;
    let (group, name) = if chars.eat('.') {
        let name = chars.take_name().ok_or_else(fail)?;
        (Some(first), name)
    } else {
        (None, first)
    };

    let mut params = Vec::new();
    while chars.eat(';') {
        // stray semicolon directly before the colon
        let Some(param_name) = chars.take_name() else {
            if chars.peek() == Some(':') {
                break;
            }
            return Err(fail());
        };
        let mut entry = vec![param_name];
        if chars.eat('=') {
            loop {
                let value = chars.take_param_value().ok_or_else(fail)?;
                if !value.is_empty() {
                    entry.push(value);
                }
                if !chars.eat(',') {
                    break;
                }
            }
        }
        params.push(entry);
    }

    if !chars.eat(':') {
        return Err(fail());
    }
    let value = chars.rest().to_owned();
    Ok((name.replace('_', "-"), group, params, value))
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// `[A-Za-z0-9_-]+`
    fn take_name(&mut self) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        (self.pos > start).then(|| self.input[start..self.pos].to_owned())
    }

    /// A quoted value (anything but `"`), or a possibly-empty run of
    /// characters excluding `";:,`.
    fn take_param_value(&mut self) -> Option<String> {
        if self.eat('"') {
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == '"' {
                    let value = self.input[start..self.pos].to_owned();
                    self.pos += 1;
                    return Some(value);
                }
                self.pos += c.len_utf8();
            }
            return None; // unterminated quote
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '"' | ';' | ':' | ',') {
                break;
            }
            self.pos += c.len_utf8();
        }
        Some(self.input[start..self.pos].to_owned())
    }
}
