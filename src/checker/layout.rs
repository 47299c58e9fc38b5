//! Logical-line scan of Python source.
//!
//! tree-sitter-python accepts indentation that the language rejects: an
//! indented line where no block was opened, or a block header followed by
//! a line at the same level. Block structure is therefore checked here,
//! line by line, the way Python's tokenizer does it. The scan also enforces
//! the tokenizer's bracket nesting limit.

use super::source_line;
use crate::finding::{Finding, Severity, NO_CODE};

/// Bracket nesting accepted before the tokenizer gives up.
pub const MAX_BRACKET_DEPTH: usize = 200;

const TAB_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutErrorKind {
    UnexpectedIndent,
    ExpectedIndent,
    UnindentMismatch,
    TooDeep,
}

impl LayoutErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            LayoutErrorKind::UnexpectedIndent => "unexpected indent",
            LayoutErrorKind::ExpectedIndent => "expected an indented block",
            LayoutErrorKind::UnindentMismatch => {
                "unindent does not match any outer indentation level"
            }
            LayoutErrorKind::TooDeep => "too many nested parentheses",
        }
    }
}

/// First layout problem found, with its 1-indexed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutError {
    pub kind: LayoutErrorKind,
    pub line: u64,
}

impl LayoutError {
    fn new(kind: LayoutErrorKind, line: u64) -> Self {
        Self { kind, line }
    }

    /// Whether the source should not be handed to the parser at all.
    pub fn stops_parsing(&self) -> bool {
        self.kind == LayoutErrorKind::TooDeep
    }

    pub fn to_finding(self, source: &str) -> Finding {
        let code = source_line(source, self.line)
            .filter(|l| !l.is_empty())
            .unwrap_or(NO_CODE);
        Finding::new(self.line, Severity::Error, self.kind.message(), code)
    }
}

/// A string literal left open at the end of a physical line.
#[derive(Debug, Clone, Copy)]
struct OpenString {
    quote: char,
    triple: bool,
}

/// State carried across physical lines.
#[derive(Debug)]
struct Scanner {
    indents: Vec<usize>,
    depth: usize,
    string: Option<OpenString>,
    /// Previous physical line ended in a backslash outside a string
    continued: bool,
    /// Last significant character of the current logical line
    last: Option<char>,
    /// Line of a block header still waiting for its indented body
    pending_block: Option<u64>,
}

/// Scan `source` and return the first layout problem.
pub fn scan(source: &str) -> Option<LayoutError> {
    let mut scanner = Scanner {
        indents: vec![0],
        depth: 0,
        string: None,
        continued: false,
        last: None,
        pending_block: None,
    };

    for (index, raw) in source.split('\n').enumerate() {
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        if let Err(error) = scanner.line(text, index as u64 + 1) {
            return Some(error);
        }
    }

    scanner
        .pending_block
        .map(|line| LayoutError::new(LayoutErrorKind::ExpectedIndent, line))
}

/// Column of the first non-blank character and its char offset.
fn indentation(chars: &[char]) -> (usize, usize) {
    let mut column = 0;
    for (offset, ch) in chars.iter().enumerate() {
        match ch {
            ' ' => column += 1,
            '\t' => column = (column / TAB_SIZE + 1) * TAB_SIZE,
            '\x0c' => column = 0,
            _ => return (column, offset),
        }
    }
    (column, chars.len())
}

impl Scanner {
    fn line(&mut self, text: &str, line: u64) -> Result<(), LayoutError> {
        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;

        if self.depth == 0 && self.string.is_none() && !self.continued {
            let (column, offset) = indentation(&chars);
            match chars.get(offset) {
                // Blank and comment-only lines carry no indentation
                None | Some('#') => return Ok(()),
                Some(_) => {}
            }
            self.indent(column, line)?;
            self.last = None;
            start = offset;
        }
        self.continued = false;

        self.tokens(&chars[start..], line)?;

        if self.depth == 0 && self.string.is_none() && !self.continued && self.last == Some(':') {
            self.pending_block = Some(line);
        }
        Ok(())
    }

    /// Check the indentation of a logical line against the block stack.
    fn indent(&mut self, column: usize, line: u64) -> Result<(), LayoutError> {
        let top = self.indents.last().copied().unwrap_or(0);

        if self.pending_block.take().is_some() {
            if column <= top {
                return Err(LayoutError::new(LayoutErrorKind::ExpectedIndent, line));
            }
            self.indents.push(column);
            return Ok(());
        }

        if column > top {
            return Err(LayoutError::new(LayoutErrorKind::UnexpectedIndent, line));
        }
        while self.indents.last().is_some_and(|&level| column < level) {
            self.indents.pop();
        }
        if self.indents.last().copied().unwrap_or(0) != column {
            return Err(LayoutError::new(LayoutErrorKind::UnindentMismatch, line));
        }
        Ok(())
    }

    fn tokens(&mut self, chars: &[char], line: u64) -> Result<(), LayoutError> {
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];

            if let Some(open) = self.string {
                match ch {
                    '\\' => i += 2,
                    c if c == open.quote && !open.triple => {
                        self.string = None;
                        i += 1;
                    }
                    c if c == open.quote && chars[i..].starts_with(&[c, c, c]) => {
                        self.string = None;
                        i += 3;
                    }
                    _ => i += 1,
                }
                continue;
            }

            match ch {
                '#' => break,
                '"' | '\'' => {
                    let triple = chars[i..].starts_with(&[ch, ch, ch]);
                    self.string = Some(OpenString { quote: ch, triple });
                    self.last = Some(ch);
                    i += if triple { 3 } else { 1 };
                    continue;
                }
                '(' | '[' | '{' => {
                    self.depth += 1;
                    if self.depth > MAX_BRACKET_DEPTH {
                        return Err(LayoutError::new(LayoutErrorKind::TooDeep, line));
                    }
                }
                ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
                '\\' if i + 1 == chars.len() => {
                    self.continued = true;
                    break;
                }
                c if c.is_whitespace() => {
                    i += 1;
                    continue;
                }
                _ => {}
            }
            self.last = Some(ch);
            i += 1;
        }

        // An escaped newline keeps a single-quoted string open; anything
        // else leaves it unterminated, which the parser reports.
        if let Some(open) = self.string {
            let escaped = chars.last() == Some(&'\\');
            if !open.triple && !escaped {
                self.string = None;
            }
        }
        Ok(())
    }
}
