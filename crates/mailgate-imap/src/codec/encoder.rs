//! Wire encoder for IMAP strings, lists and literals.

use std::fmt::Display;

use super::utf7;
use crate::parser::lexer::is_atom;

/// How literals are announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiteralMode {
    /// `{n}`: the client must wait for a `+` continuation before sending the
    /// data.
    #[default]
    Synchronizing,
    /// `{n+}` (LITERAL+): the data follows immediately.
    NonSynchronizing,
    /// Server responses: `{n}` followed by the data, nobody waits.
    Response,
}

/// Output of an [`Encoder`]: chunks separated by continuation waits.
///
/// Every chunk after the first must only be written once the peer sent a
/// `+` continuation request. Responses and non-synchronizing commands always
/// produce a single chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoded {
    chunks: Vec<Vec<u8>>,
}

impl Encoded {
    /// Returns the chunks in write order.
    #[must_use]
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Consumes the output, returning its chunks.
    #[must_use]
    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }

    /// Concatenates all chunks, ignoring continuation points.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// Returns true if the output needs no continuation round trip.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.chunks.len() <= 1
    }
}

/// Incremental IMAP encoder.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
    chunks: Vec<Vec<u8>>,
    mode: LiteralMode,
    utf8: bool,
}

impl Encoder {
    /// Creates an encoder with the given literal mode.
    #[must_use]
    pub fn new(mode: LiteralMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Creates an encoder for server responses.
    #[must_use]
    pub fn response() -> Self {
        Self::new(LiteralMode::Response)
    }

    /// Sets whether UTF8=ACCEPT is in effect.
    #[must_use]
    pub const fn utf8(mut self, enabled: bool) -> Self {
        self.utf8 = enabled;
        self
    }

    /// Returns true if UTF8=ACCEPT is in effect.
    #[must_use]
    pub const fn is_utf8(&self) -> bool {
        self.utf8
    }

    /// Writes bytes verbatim.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Writes an atom verbatim. The caller guarantees it is a valid atom.
    pub fn atom(&mut self, atom: &str) -> &mut Self {
        self.raw(atom.as_bytes())
    }

    /// Writes a single space.
    pub fn sp(&mut self) -> &mut Self {
        self.buf.push(b' ');
        self
    }

    /// Writes a number.
    pub fn number(&mut self, n: impl Display) -> &mut Self {
        self.buf.extend_from_slice(n.to_string().as_bytes());
        self
    }

    /// Writes CRLF.
    pub fn crlf(&mut self) -> &mut Self {
        self.raw(b"\r\n")
    }

    /// Writes a quoted string, escaping `"` and `\`.
    pub fn quoted(&mut self, s: &str) -> &mut Self {
        self.buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                self.buf.push(b'\\');
            }
            self.buf.push(b);
        }
        self.buf.push(b'"');
        self
    }

    /// Writes a literal.
    pub fn literal(&mut self, data: &[u8]) -> &mut Self {
        let len = data.len();
        match self.mode {
            LiteralMode::Synchronizing => {
                self.number_braced(len, false);
                self.split();
            }
            LiteralMode::NonSynchronizing => self.number_braced(len, true),
            LiteralMode::Response => self.number_braced(len, false),
        }
        self.raw(data)
    }

    fn number_braced(&mut self, len: usize, plus: bool) {
        self.buf.push(b'{');
        self.buf.extend_from_slice(len.to_string().as_bytes());
        if plus {
            self.buf.push(b'+');
        }
        self.buf.extend_from_slice(b"}\r\n");
    }

    fn split(&mut self) {
        self.chunks.push(std::mem::take(&mut self.buf));
    }

    /// Writes a string, quoted when possible and as a literal otherwise.
    pub fn string(&mut self, data: &[u8]) -> &mut Self {
        match std::str::from_utf8(data) {
            Ok(s) if self.can_quote(s) => self.quoted(s),
            _ => self.literal(data),
        }
    }

    /// Writes an astring: a bare atom when safe, a string otherwise.
    pub fn astring(&mut self, s: &str) -> &mut Self {
        if is_atom(s) && !s.eq_ignore_ascii_case("NIL") {
            self.atom(s)
        } else {
            self.string(s.as_bytes())
        }
    }

    /// Writes an nstring.
    pub fn nstring(&mut self, data: Option<&[u8]>) -> &mut Self {
        match data {
            Some(data) => self.string(data),
            None => self.atom("NIL"),
        }
    }

    /// Writes a mailbox name: modified UTF-7 unless UTF8=ACCEPT is enabled.
    pub fn mailbox(&mut self, name: &str) -> &mut Self {
        if name.eq_ignore_ascii_case("INBOX") {
            return self.atom("INBOX");
        }
        if self.utf8 {
            self.astring(name)
        } else {
            let encoded = utf7::encode(name);
            self.astring(&encoded)
        }
    }

    /// Writes a parenthesized, space-separated list.
    pub fn list<I, F>(&mut self, items: I, mut write: F) -> &mut Self
    where
        I: IntoIterator,
        F: FnMut(&mut Self, I::Item),
    {
        self.buf.push(b'(');
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sp();
            }
            write(self, item);
        }
        self.buf.push(b')');
        self
    }

    fn can_quote(&self, s: &str) -> bool {
        s.len() < 1024
            && s.bytes()
                .all(|b| !matches!(b, 0 | b'\r' | b'\n') && (self.utf8 || b.is_ascii()))
    }

    /// Finishes encoding.
    #[must_use]
    pub fn finish(mut self) -> Encoded {
        if !self.buf.is_empty() || self.chunks.is_empty() {
            self.split();
        }
        Encoded {
            chunks: self.chunks,
        }
    }

    /// Finishes encoding into one buffer, ignoring continuation points.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.finish().to_vec()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(f: impl FnOnce(&mut Encoder)) -> Vec<u8> {
        let mut enc = Encoder::response();
        f(&mut enc);
        enc.into_bytes()
    }

    fn astring(s: &str) -> Vec<u8> {
        encode(|e| {
            e.astring(s);
        })
    }

    #[test]
    fn astring_forms() {
        assert_eq!(astring("INBOX"), b"INBOX");
        assert_eq!(astring("Test mailbox"), b"\"Test mailbox\"");
        assert_eq!(astring(""), b"\"\"");
        assert_eq!(astring("nil"), b"\"nil\"");
        assert_eq!(astring("a\"b\\c"), b"\"a\\\"b\\\\c\"");
        assert_eq!(astring("two\r\nlines"), b"{10}\r\ntwo\r\nlines");
    }

    #[test]
    fn eight_bit_needs_utf8_mode() {
        let mut enc = Encoder::response();
        enc.astring("Cafè");
        assert_eq!(enc.into_bytes(), "{5}\r\nCafè".as_bytes());

        let mut enc = Encoder::response().utf8(true);
        enc.astring("Cafè");
        assert_eq!(enc.into_bytes(), "\"Cafè\"".as_bytes());
    }

    #[test]
    fn mailbox_names() {
        let mut enc = Encoder::response();
        enc.mailbox("Cafè").sp().mailbox("Angus & Julia").sp().mailbox("inbox");
        assert_eq!(enc.into_bytes(), b"Caf&AOg- \"Angus &- Julia\" INBOX");

        let mut enc = Encoder::response().utf8(true);
        enc.mailbox("Cafè").sp().mailbox("Angus & Julia");
        assert_eq!(enc.into_bytes(), "\"Cafè\" \"Angus & Julia\"".as_bytes());
    }

    #[test]
    fn synchronizing_literal_splits_chunks() {
        let mut enc = Encoder::new(LiteralMode::Synchronizing);
        enc.atom("A1 APPEND INBOX ").literal(b"hello").crlf();
        let out = enc.finish();
        assert_eq!(out.chunks().len(), 2);
        assert_eq!(out.chunks()[0], b"A1 APPEND INBOX {5}\r\n");
        assert_eq!(out.chunks()[1], b"hello\r\n");
        assert!(!out.is_single());
    }

    #[test]
    fn non_synchronizing_literal_is_single_chunk() {
        let mut enc = Encoder::new(LiteralMode::NonSynchronizing);
        enc.atom("A1 APPEND INBOX ").literal(b"hello").crlf();
        let out = enc.finish();
        assert!(out.is_single());
        assert_eq!(out.to_vec(), b"A1 APPEND INBOX {5+}\r\nhello\r\n");
    }

    #[test]
    fn lists_and_nstrings() {
        let out = encode(|e| {
            e.list(["\\Seen", "\\Deleted"], |e, f| {
                e.atom(f);
            })
            .sp()
            .nstring(None)
            .sp()
            .nstring(Some(b"x"))
            .sp()
            .list(Vec::<&str>::new(), |e, f| {
                e.atom(f);
            });
        });
        assert_eq!(out, b"(\\Seen \\Deleted) NIL \"x\" ()");
    }
}
