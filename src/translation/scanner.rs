use super::parsers::{
    is_block_comment_end, is_block_comment_start, is_line_comment_start, matches_tag,
    try_start_dollar_quote,
};

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

/// Which positional form a placeholder was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    /// Bare `?`, numbered one past the highest index seen so far.
    Anonymous,
    /// `?N`
    QuestionNumbered(usize),
    /// `$N`
    DollarNumbered(usize),
}

/// A positional placeholder found outside literals and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placeholder {
    /// Byte offset of the `?` or `$`.
    pub start: usize,
    /// Byte offset one past the last digit.
    pub end: usize,
    pub marker: Marker,
    /// 1-based parameter position this placeholder binds to.
    pub position: usize,
}

fn scan_digits(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut idx = start;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == start {
        return None;
    }
    std::str::from_utf8(&bytes[start..idx])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .map(|n| (idx, n))
}

/// Walk `sql` and collect every positional placeholder, skipping quoted
/// strings, quoted identifiers, comments and dollar-quoted bodies.
///
/// Positions follow `SQLite` numbering: `?N`/`$N` bind to `N`, a bare `?`
/// binds to one more than the highest position assigned before it.
pub(crate) fn scan_placeholders(sql: &str) -> Vec<Placeholder> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut state = State::Normal;
    let mut highest = 0usize;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((end, n)) = scan_digits(bytes, idx + 1) {
                        highest = highest.max(n);
                        found.push(Placeholder {
                            start: idx,
                            end,
                            marker: Marker::DollarNumbered(n),
                            position: n,
                        });
                        idx = end - 1;
                    } else if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    }
                }
                b'?' => {
                    if let Some((end, n)) = scan_digits(bytes, idx + 1) {
                        highest = highest.max(n);
                        found.push(Placeholder {
                            start: idx,
                            end,
                            marker: Marker::QuestionNumbered(n),
                            position: n,
                        });
                        idx = end - 1;
                    } else {
                        highest += 1;
                        found.push(Placeholder {
                            start: idx,
                            end: idx + 1,
                            marker: Marker::Anonymous,
                            position: highest,
                        });
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    found
}
