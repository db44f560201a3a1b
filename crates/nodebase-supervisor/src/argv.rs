//! Command-line tokenizer.
//!
//! Splits a raw command string into argv tokens with shell-like grouping:
//! spaces and tabs separate tokens outside quotes, `"` and `'` open a region
//! closed only by the same quote, and `\` makes the next character literal.
//!
//! Unlike a shell, quote characters and backslashes are kept in the token
//! exactly as scanned: `a "b c"` yields `a` and `"b c"`. The tokenizer is total:
//! an unterminated quote or a trailing backslash flushes what was gathered.

use nodebase_core::{NodebaseError, NodebaseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Plain,
    Double,
    Single,
}

/// Iterator over the tokens of a raw command string.
///
/// Besides plain iteration it can hand back the unscanned rest of the input,
/// which lets a caller peel off leading words and keep the tail verbatim.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    raw: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw, pos: 0 }
    }

    /// The part of the input not consumed yet, without leading whitespace.
    pub fn remainder(&self) -> &'a str {
        self.raw[self.pos..].trim_start_matches(is_separator)
    }
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let start = self.pos;
        let rest = &self.raw[start..];
        let mut buf = String::new();
        let mut region = Region::Plain;
        let mut escaped = false;

        for (offset, ch) in rest.char_indices() {
            if escaped {
                buf.push(ch);
                escaped = false;
                continue;
            }
            match (region, ch) {
                (_, '\\') => {
                    buf.push(ch);
                    escaped = true;
                }
                (Region::Plain, c) if is_separator(c) => {
                    if buf.is_empty() {
                        continue;
                    }
                    self.pos = start + offset;
                    return Some(buf);
                }
                (Region::Plain, '"') => {
                    buf.push(ch);
                    region = Region::Double;
                }
                (Region::Plain, '\'') => {
                    buf.push(ch);
                    region = Region::Single;
                }
                (Region::Double, '"') | (Region::Single, '\'') => {
                    buf.push(ch);
                    region = Region::Plain;
                }
                _ => buf.push(ch),
            }
        }

        self.pos = self.raw.len();
        if buf.is_empty() {
            None
        } else {
            Some(buf)
        }
    }
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split a raw command string into argv tokens.
pub fn tokenize(raw: &str) -> Vec<String> {
    Tokens::new(raw).collect()
}

/// Tokenize a command that may be absent.
///
/// An absent command is an `InvalidArgument`; an empty one is an empty argv.
pub fn parse_command_line(raw: Option<&str>) -> NodebaseResult<Vec<String>> {
    raw.map(tokenize)
        .ok_or_else(|| NodebaseError::InvalidArgument("missing command".into()))
}
