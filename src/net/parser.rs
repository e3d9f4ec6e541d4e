//! Wire-protocol traits (§6) plus one concrete sample implementation (A4)
//! used to exercise the connection FSM end-to-end over a real socket.

use crate::storage::Storage;

/// Incrementally frames commands out of a byte stream.
///
/// `parse` is handed whatever bytes are currently buffered and returns
/// `(consumed, ready)`: `consumed` bytes may be dropped from the front of the
/// buffer regardless of `ready`; when `ready` is `Some`, a command header is
/// complete and carries the number of argument bytes still to come (0 if
/// none).
pub trait Parser: Send {
    fn parse(&mut self, buf: &[u8]) -> (usize, Option<ParsedHeader>);
}

pub struct ParsedHeader {
    pub command: TextCommand,
    pub arg_length: usize,
}

/// A fully framed command, ready to execute once any argument bytes have
/// been accumulated.
pub trait Command: Send {
    /// Executes against `storage`, writing the response (without the
    /// trailing `\r\n`, which the connection appends) into `out`.
    fn execute(self, storage: &dyn Storage, argument: &[u8], out: &mut Vec<u8>);
}

#[derive(Debug, Clone)]
pub enum TextCommand {
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
    Put { key: Vec<u8> },
    Set { key: Vec<u8> },
}

impl Command for TextCommand {
    fn execute(self, storage: &dyn Storage, argument: &[u8], out: &mut Vec<u8>) {
        match self {
            TextCommand::Get { key } => {
                let mut value = Vec::new();
                if storage.get(&key, &mut value) {
                    out.extend_from_slice(&value);
                } else {
                    out.extend_from_slice(b"NOT_FOUND");
                }
            }
            TextCommand::Delete { key } => {
                if storage.delete(&key) {
                    out.extend_from_slice(b"OK");
                } else {
                    out.extend_from_slice(b"NOT_FOUND");
                }
            }
            TextCommand::Put { key } => {
                if storage.put(&key, argument) {
                    out.extend_from_slice(b"OK");
                } else {
                    out.extend_from_slice(b"ERROR");
                }
            }
            TextCommand::Set { key } => {
                if storage.set(&key, argument) {
                    out.extend_from_slice(b"OK");
                } else {
                    out.extend_from_slice(b"ERROR");
                }
            }
        }
    }
}

/// Minimal text framing: `GET <key>\r\n`, `DELETE <key>\r\n`,
/// `PUT <key> <len>\r\n` and `SET <key> <len>\r\n` (argument bytes plus a
/// trailing `\r\n` follow the header, handled by the connection).
#[derive(Default)]
pub struct LineParser;

impl Parser for LineParser {
    fn parse(&mut self, buf: &[u8]) -> (usize, Option<ParsedHeader>) {
        let Some(eol) = find_crlf(buf) else {
            return (0, None);
        };
        let line = &buf[..eol];
        let consumed = eol + 2;
        let Some(header) = parse_line(line) else {
            return (consumed, None);
        };
        (consumed, Some(header))
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_line(line: &[u8]) -> Option<ParsedHeader> {
    let mut parts = line.split(|b| *b == b' ').filter(|p| !p.is_empty());
    let verb = parts.next()?;
    let key = parts.next()?.to_vec();
    match verb.to_ascii_uppercase().as_slice() {
        b"GET" => Some(ParsedHeader {
            command: TextCommand::Get { key },
            arg_length: 0,
        }),
        b"DELETE" => Some(ParsedHeader {
            command: TextCommand::Delete { key },
            arg_length: 0,
        }),
        b"PUT" | b"SET" => {
            let len_str = parts.next()?;
            let len: usize = std::str::from_utf8(len_str).ok()?.parse().ok()?;
            let command = if verb.eq_ignore_ascii_case(b"PUT") {
                TextCommand::Put { key }
            } else {
                TextCommand::Set { key }
            };
            Some(ParsedHeader { command, arg_length: len })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_line_parses_with_no_argument() {
        let mut p = LineParser;
        let (consumed, header) = p.parse(b"GET foo\r\nrest");
        assert_eq!(consumed, 9);
        let header = header.unwrap();
        assert_eq!(header.arg_length, 0);
        assert!(matches!(header.command, TextCommand::Get { key } if key == b"foo"));
    }

    #[test]
    fn put_line_carries_the_declared_argument_length() {
        let mut p = LineParser;
        let (_, header) = p.parse(b"PUT foo 3\r\nabc\r\n");
        let header = header.unwrap();
        assert_eq!(header.arg_length, 3);
        assert!(matches!(header.command, TextCommand::Put { key } if key == b"foo"));
    }

    #[test]
    fn incomplete_line_reports_zero_consumed_and_no_header() {
        let mut p = LineParser;
        let (consumed, header) = p.parse(b"GET foo");
        assert_eq!(consumed, 0);
        assert!(header.is_none());
    }

    #[test]
    fn malformed_verb_is_consumed_but_produces_no_header() {
        let mut p = LineParser;
        let (consumed, header) = p.parse(b"NOPE foo\r\n");
        assert_eq!(consumed, 10);
        assert!(header.is_none());
    }
}
