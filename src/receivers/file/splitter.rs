// SPDX-License-Identifier: Apache-2.0

//! Boundary detection: carves a growing byte buffer into record tokens.

use regex::bytes::{Regex, RegexBuilder};

/// Outcome of one boundary-detection pass over the front of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Bytes consumed from the front of the buffer.
    pub advance: usize,
    /// Token carved out of the consumed region, trailing whitespace
    /// trimmed. `None` when the region reduced to whitespace.
    pub token: Option<Vec<u8>>,
}

/// A record-boundary strategy. At most one of the pattern variants is
/// configured at a time; newline splitting is the default.
#[derive(Debug)]
pub enum Splitter {
    /// Split on line terminators.
    Newline,
    /// A regex match marks the beginning of a new record.
    LineStart(Regex),
    /// A regex match marks the end of a record.
    LineEnd(Regex),
    /// No line semantics: fixed-size chunks capped at `max_chunk`.
    None { max_chunk: usize },
}

impl Splitter {
    /// Compile a pattern marking the beginning of a record. `^` and `$`
    /// anchor at line boundaries: the haystack is a multi-line buffer, so
    /// text-anchored patterns would only ever match its first line.
    pub fn line_start(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Splitter::LineStart(compile(pattern)?))
    }

    /// Compile a pattern marking the end of a record, with the same
    /// line-boundary anchoring as [`Splitter::line_start`].
    pub fn line_end(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Splitter::LineEnd(compile(pattern)?))
    }

    /// Try to carve the next token off the front of `data`.
    ///
    /// Returns `None` when more data is required before a boundary can be
    /// decided. `at_eof` marks true end-of-stream: pending data is flushed
    /// rather than held for a boundary that can no longer arrive.
    pub fn split(&self, data: &[u8], at_eof: bool) -> Option<Split> {
        if data.is_empty() {
            return None;
        }

        match self {
            Splitter::Newline => match data.iter().position(|b| *b == b'\n') {
                Some(i) => Some(Split {
                    advance: i + 1,
                    token: trim_trailing(&data[..i]),
                }),
                None if at_eof => Some(Split {
                    advance: data.len(),
                    token: trim_trailing(data),
                }),
                None => None,
            },

            Splitter::LineStart(re) => {
                let first = match re.find(data) {
                    Some(m) => m,
                    // No record start anywhere yet
                    None if at_eof => {
                        return Some(Split {
                            advance: data.len(),
                            token: trim_trailing(data),
                        });
                    }
                    None => return None,
                };

                // Data before the first match is flushed as its own token
                // rather than discarded.
                if first.start() > 0 {
                    return Some(Split {
                        advance: first.start(),
                        token: trim_trailing(&data[..first.start()]),
                    });
                }

                // The match runs to the buffer's edge; it may still grow.
                if first.end() == data.len() && !at_eof {
                    return None;
                }

                match re.find_at(data, first.end()) {
                    Some(next) => Some(Split {
                        advance: next.start(),
                        token: trim_trailing(&data[..next.start()]),
                    }),
                    None if at_eof => Some(Split {
                        advance: data.len(),
                        token: trim_trailing(data),
                    }),
                    None => None,
                }
            }

            Splitter::LineEnd(re) => {
                let m = match re.find(data) {
                    Some(m) => m,
                    None if at_eof => {
                        return Some(Split {
                            advance: data.len(),
                            token: trim_trailing(data),
                        });
                    }
                    None => return None,
                };

                // The match runs to the buffer's edge; it may still grow.
                if m.end() == data.len() && !at_eof {
                    return None;
                }

                Some(Split {
                    advance: m.end(),
                    token: trim_trailing(&data[..m.end()]),
                })
            }

            Splitter::None { max_chunk } => {
                let n = data.len().min(*max_chunk);
                Some(Split {
                    advance: n,
                    token: Some(data[..n].to_vec()),
                })
            }
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).multi_line(true).build()
}

/// Trim trailing whitespace (including a carriage return before the line
/// terminator). Whitespace-only regions yield no token.
pub(crate) fn trim_trailing(data: &[u8]) -> Option<Vec<u8>> {
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    Some(data[..end].to_vec())
}
