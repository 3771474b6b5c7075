//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with support for literals. A frame is
//! one line plus every literal it announces and the line continuing after
//! each literal. Reads buffer into the stream itself, so a read future may
//! be dropped at any await point and restarted without losing bytes.

#![allow(clippy::missing_errors_doc)]

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::parser::CommandParser;
use crate::types::Tag;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Continuation request the server sends before a synchronizing literal.
const LITERAL_CONTINUATION: &[u8] = b"+ Ready for literal data\r\n";

/// Outcome of reading one command on the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete command, literals inline.
    Command(Vec<u8>),
    /// A command that was discarded before it was complete. The connection
    /// stays usable.
    Rejected {
        /// Tag of the discarded command, if it could be recovered.
        tag: Option<Tag>,
        /// Why the command was refused.
        reason: String,
    },
}

/// An announced literal at the end of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiteralHeader {
    len: usize,
    sync: bool,
}

enum Scan {
    Complete(usize),
    Incomplete,
    NeedContinuation,
    LineTooLong,
    LiteralTooLarge { sync: bool, line_end: usize },
}

/// Framed connection for IMAP protocol.
///
/// Handles frame reading with literal support and direct writes.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    /// End of the part of the current frame already scanned.
    scanned: usize,
    /// The literal ending the current line was already acknowledged.
    continued: bool,
    /// Bytes are being dropped until the next CRLF.
    discarding: Option<Option<Tag>>,
    server: bool,
}

impl<S> FramedStream<S> {
    /// Creates a client-side framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            scanned: 0,
            continued: false,
            discarding: None,
            server: false,
        }
    }

    /// Creates a server-side framed stream.
    pub fn server(stream: S) -> Self {
        Self {
            server: true,
            ..Self::new(stream)
        }
    }

    /// Gets a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Consumes the framed stream, returning the stream and any bytes read
    /// but not yet framed.
    pub fn into_parts(self) -> (S, Bytes) {
        (self.stream, self.buffer.freeze())
    }

    fn prefix(&self, outgoing: bool) -> &'static str {
        if self.server == outgoing { "S:" } else { "C:" }
    }

    fn scan(&mut self) -> Scan {
        loop {
            let start = self.scanned;
            let Some(rel) = find_crlf(&self.buffer[start..]) else {
                if self.buffer.len() - start > MAX_LINE_LENGTH {
                    return Scan::LineTooLong;
                }
                return Scan::Incomplete;
            };
            let line_end = start + rel + 2;
            if rel > MAX_LINE_LENGTH {
                return Scan::LineTooLong;
            }

            let Some(literal) = parse_literal_header(&self.buffer[start..line_end]) else {
                return Scan::Complete(line_end);
            };
            if literal.len > MAX_LITERAL_SIZE {
                return Scan::LiteralTooLarge {
                    sync: literal.sync,
                    line_end,
                };
            }
            if self.server && literal.sync && !self.continued {
                self.continued = true;
                return Scan::NeedContinuation;
            }
            if self.buffer.len() < line_end + literal.len {
                return Scan::Incomplete;
            }
            self.scanned = line_end + literal.len;
            self.continued = false;
        }
    }

    fn take_frame(&mut self, len: usize) -> Vec<u8> {
        self.scanned = 0;
        self.continued = false;
        let frame = self.buffer.split_to(len).to_vec();
        log_frame(self.prefix(false), &frame);
        frame
    }

    /// Drops buffered bytes through the next CRLF. Returns true once the
    /// CRLF was found.
    fn discard_line(&mut self) -> bool {
        match find_crlf(&self.buffer) {
            Some(pos) => {
                let _ = self.buffer.split_to(pos + 2);
                true
            }
            None => {
                // Keep a trailing CR in case the LF arrives next
                let keep = usize::from(self.buffer.last() == Some(&b'\r'));
                let drop = self.buffer.len() - keep;
                let _ = self.buffer.split_to(drop);
                false
            }
        }
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + Unpin,
{
    /// Reads more bytes into the buffer. Returns false on EOF.
    async fn fill(&mut self) -> Result<bool> {
        self.buffer.reserve(DEFAULT_BUFFER_SIZE);
        let n = self.stream.read_buf(&mut self.buffer).await?;
        Ok(n > 0)
    }

    fn eof_error(&self) -> Error {
        if self.buffer.is_empty() {
            Error::ConnectionClosed
        } else {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-frame",
            ))
        }
    }

    /// Reads a complete IMAP response, literals included.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.scan() {
                Scan::Complete(len) => return Ok(self.take_frame(len)),
                Scan::Incomplete | Scan::NeedContinuation => {}
                Scan::LineTooLong => return Err(Error::Protocol("line too long".to_string())),
                Scan::LiteralTooLarge { .. } => {
                    return Err(Error::Protocol(format!(
                        "literal too large (max {MAX_LITERAL_SIZE} bytes)"
                    )));
                }
            }
            if !self.fill().await? {
                return Err(self.eof_error());
            }
        }
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads one complete command, asking the client for synchronizing
    /// literals with a `+` continuation.
    ///
    /// Over-long lines and over-size synchronizing literals are discarded and
    /// reported as [`Frame::Rejected`]; an over-size non-synchronizing
    /// literal cannot be skipped and fails the connection.
    pub async fn read_command(&mut self) -> Result<Frame> {
        loop {
            if let Some(tag) = self.discarding.clone() {
                if self.discard_line() {
                    self.discarding = None;
                    return Ok(Frame::Rejected {
                        tag,
                        reason: "Line too long".to_string(),
                    });
                }
            } else {
                match self.scan() {
                    Scan::Complete(len) => return Ok(Frame::Command(self.take_frame(len))),
                    Scan::Incomplete => {}
                    Scan::NeedContinuation => {
                        self.write_all(LITERAL_CONTINUATION).await?;
                        continue;
                    }
                    Scan::LineTooLong => {
                        let tag = CommandParser::tag(&self.buffer);
                        tracing::warn!(?tag, "discarding over-long command line");
                        self.scanned = 0;
                        self.continued = false;
                        self.discarding = Some(tag);
                        continue;
                    }
                    Scan::LiteralTooLarge { sync: true, line_end } => {
                        let tag = CommandParser::tag(&self.buffer);
                        tracing::warn!(?tag, "refusing over-size literal");
                        let _ = self.buffer.split_to(line_end);
                        self.scanned = 0;
                        self.continued = false;
                        return Ok(Frame::Rejected {
                            tag,
                            reason: format!("Literal too large (max {MAX_LITERAL_SIZE} bytes)"),
                        });
                    }
                    Scan::LiteralTooLarge { sync: false, .. } => {
                        return Err(Error::Protocol(
                            "non-synchronizing literal too large".to_string(),
                        ));
                    }
                }
            }
            if !self.fill().await? {
                return Err(self.eof_error());
            }
        }
    }
}

impl<S> FramedStream<S>
where
    S: AsyncWrite + Unpin,
{
    /// Writes bytes and flushes.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        log_frame(self.prefix(true), data);
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Logs wire traffic at trace level, one entry per line, with literal data
/// replaced by its length.
pub(crate) fn log_frame(prefix: &str, data: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    let mut rest = data;
    while !rest.is_empty() {
        let end = find_crlf(rest).map_or(rest.len(), |pos| pos + 2);
        let (line, tail) = rest.split_at(end);
        tracing::trace!("{prefix} {}", String::from_utf8_lossy(line).trim_end());
        rest = tail;
        if let Some(literal) = parse_literal_header(line) {
            let skip = literal.len.min(rest.len());
            tracing::trace!("{prefix} <{skip} literal bytes>");
            rest = &rest[skip..];
        }
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal announcement from the end of a line.
///
/// Matches `{123}\r\n` and `{123+}\r\n` (non-synchronizing).
fn parse_literal_header(line: &[u8]) -> Option<LiteralHeader> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let (line, sync) = match line.strip_suffix(b"+") {
        Some(rest) => (rest, false),
        None => (line, true),
    };
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    // Saturate so absurd counts are reported as too large, not as text
    let len = std::str::from_utf8(digits)
        .ok()?
        .parse()
        .unwrap_or(usize::MAX);
    Some(LiteralHeader { len, sync })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[test]
    fn test_parse_literal_header() {
        let header = |len, sync| Some(LiteralHeader { len, sync });
        assert_eq!(parse_literal_header(b"BODY {123}\r\n"), header(123, true));
        assert_eq!(parse_literal_header(b"BODY {123+}\r\n"), header(123, false));
        assert_eq!(parse_literal_header(b"{0}\r\n"), header(0, true));
        assert_eq!(parse_literal_header(b"no literal\r\n"), None);
        assert_eq!(parse_literal_header(b"incomplete {123"), None);
        assert_eq!(parse_literal_header(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_header(b"empty {}\r\n"), None);
        assert_eq!(
            parse_literal_header(b"{99999999999999999999999}\r\n"),
            header(usize::MAX, true)
        );
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hel")
            .read(b"lo)\r\n* 2 EXISTS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 2 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_crlf() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {4}\r\n\r\n\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {4}\r\n\r\n\r\n)\r\n");
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.read_response().await,
            Err(Error::ConnectionClosed)
        ));

        let mock = Builder::new().read(b"* OK half").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_response().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_server_sends_continuation_for_sync_literal() {
        let mock = Builder::new()
            .read(b"A1 APPEND INBOX {5}\r\n")
            .write(LITERAL_CONTINUATION)
            .read(b"Hello\r\n")
            .build();
        let mut framed = FramedStream::server(mock);
        assert_eq!(
            framed.read_command().await.unwrap(),
            Frame::Command(b"A1 APPEND INBOX {5}\r\nHello\r\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_server_non_sync_literal_needs_no_continuation() {
        let mock = Builder::new()
            .read(b"A1 APPEND INBOX {5+}\r\nHello\r\n")
            .build();
        let mut framed = FramedStream::server(mock);
        assert_eq!(
            framed.read_command().await.unwrap(),
            Frame::Command(b"A1 APPEND INBOX {5+}\r\nHello\r\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (BODY[] {{{literal_size}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_oversize_sync_literal_is_rejected_not_fatal() {
        let header = format!("A7 APPEND INBOX {{{}}}\r\nA8 NOOP\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::server(mock);

        let Frame::Rejected { tag, .. } = framed.read_command().await.unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(tag, Some(Tag::new("A7")));
        assert_eq!(
            framed.read_command().await.unwrap(),
            Frame::Command(b"A8 NOOP\r\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_oversize_non_sync_literal_is_fatal() {
        let header = format!("A7 APPEND INBOX {{{}+}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::server(mock);
        assert!(framed.read_command().await.is_err());
    }

    #[tokio::test]
    async fn test_long_line_is_skipped() {
        let long_line = format!("A9 {}\r\nA10 NOOP\r\n", "X".repeat(MAX_LINE_LENGTH + 100));
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::server(mock);

        let Frame::Rejected { tag, reason } = framed.read_command().await.unwrap() else {
            panic!("expected rejection");
        };
        assert_eq!(tag, Some(Tag::new("A9")));
        assert_eq!(reason, "Line too long");
        assert_eq!(
            framed.read_command().await.unwrap(),
            Frame::Command(b"A10 NOOP\r\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_client_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mut framed = FramedStream::new(long_line.as_bytes());

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_leftover_bytes_survive_into_parts() {
        let mock = Builder::new().read(b"A1 STARTTLS\r\n\x16\x03\x01").build();
        let mut framed = FramedStream::server(mock);
        assert_eq!(
            framed.read_command().await.unwrap(),
            Frame::Command(b"A1 STARTTLS\r\n".to_vec())
        );
        let (_, rest) = framed.into_parts();
        assert_eq!(&rest[..], b"\x16\x03\x01");
    }
}
