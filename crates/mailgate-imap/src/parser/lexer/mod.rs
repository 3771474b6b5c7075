//! IMAP lexer shared by the response and command parsers.
//!
//! This module implements a lexer for the IMAP protocol grammar defined in RFC 9051.
//! It breaks a complete, framed line (literal bytes included) into tokens. The
//! `read_*` helpers read grammar productions directly from the input where the
//! token stream is too coarse, e.g. astrings that look like numbers or list
//! patterns containing wildcards.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the remaining input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peeks at the byte at offset from current position.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Returns true if the line ends here (CRLF or end of input).
    #[must_use]
    pub fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'\r'))
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips n bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Consumes `byte` if it is next.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            // CRLF
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }

            b' ' => {
                self.advance();
                Ok(Token::Space)
            }

            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }

            b'"' => self.read_quoted_string().map(Token::QuotedString),

            b'{' => self.read_literal().map(Token::Literal),

            b'0'..=b'9' => self.read_number_or_atom(),

            // Atom (including NIL)
            _ if is_atom_char(byte) => self.read_atom(),

            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    /// Reads a quoted string, handling the `\"` and `\\` escapes.
    fn read_quoted_string(&mut self) -> Result<String> {
        self.advance(); // Skip opening quote

        let mut result = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => {
                        return Err(self.error(&format!("Invalid escape: \\{}", c as char)));
                    }
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(b'\r' | b'\n') => {
                    return Err(self.error("Unterminated quoted string"));
                }
                Some(c) => result.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        String::from_utf8(result).map_err(|_| self.error("Invalid UTF-8 in quoted string"))
    }

    /// Reads a literal `{n}` / `{n+}` with its data.
    fn read_literal(&mut self) -> Result<Vec<u8>> {
        self.advance(); // Skip {

        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let size_str = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid literal size"))?;
        let size: usize = size_str
            .parse()
            .map_err(|_| self.error("Invalid literal size number"))?;

        self.eat(b'+');
        if !self.eat(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if !self.eat(b'\r') || !self.eat(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }

        if size > self.input.len() - self.pos {
            return Err(self.error("Incomplete literal data"));
        }

        let data = self.input[self.pos..self.pos + size].to_vec();
        self.skip(size);
        Ok(data)
    }

    /// Reads a number or atom starting with a digit.
    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let s = self.read_while(is_atom_char)?;
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let n: u32 = s.parse().map_err(|_| self.error("Number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Reads an atom token.
    fn read_atom(&mut self) -> Result<Token<'a>> {
        let s = self.read_while(is_atom_char)?;
        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> Result<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))
    }

    /// Creates a parse error at the current position.
    pub(crate) fn error(&self, message: &str) -> Error {
        Error::parse(self.pos, message)
    }

    /// Expects and consumes a specific token.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected}, got {token}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Expects and consumes CRLF.
    pub fn expect_crlf(&mut self) -> Result<()> {
        self.expect(Token::Crlf)
    }

    /// Expects CRLF or end of input.
    pub fn expect_end(&mut self) -> Result<()> {
        let token = self.next_token()?;
        if token.is_line_end() {
            Ok(())
        } else {
            Err(self.error(&format!("Expected end of line, got {token}")))
        }
    }

    /// Reads a run of atom characters without token classification, so
    /// `+FLAGS`, `123` and `NIL` all come back verbatim.
    pub fn read_raw_atom(&mut self) -> Result<&'a str> {
        let s = self.read_while(is_atom_char)?;
        if s.is_empty() {
            return Err(self.error("Expected atom"));
        }
        Ok(s)
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }

    /// Reads a string (quoted or literal) as raw bytes.
    pub fn read_string_bytes(&mut self) -> Result<Vec<u8>> {
        match self.peek() {
            Some(b'"') => self.read_quoted_string().map(String::into_bytes),
            Some(b'{') => self.read_literal(),
            _ => Err(self.error("Expected string")),
        }
    }

    /// Reads an astring (atom or string).
    pub fn read_astring(&mut self) -> Result<String> {
        match self.peek() {
            Some(b'"') => self.read_quoted_string(),
            Some(b'{') => {
                let data = self.read_literal()?;
                String::from_utf8(data).map_err(|_| self.error("Invalid UTF-8 in literal"))
            }
            _ => {
                let s = self.read_while(is_astring_char)?;
                if s.is_empty() {
                    return Err(self.error("Expected astring"));
                }
                Ok(s.to_string())
            }
        }
    }

    /// Reads an nstring (NIL or string) as raw bytes.
    pub fn read_nstring_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.peek() {
            Some(b'"' | b'{') => self.read_string_bytes().map(Some),
            _ => match self.next_token()? {
                Token::Nil => Ok(None),
                token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
            },
        }
    }

    /// Reads an nstring (NIL or string).
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        self.read_nstring_bytes()?
            .map(|data| String::from_utf8(data).map_err(|_| self.error("Invalid UTF-8 in string")))
            .transpose()
    }

    /// Reads a LIST mailbox pattern: an astring that may contain `%` and `*`.
    pub fn read_list_mailbox(&mut self) -> Result<String> {
        match self.peek() {
            Some(b'"' | b'{') => self.read_astring(),
            _ => {
                let s = self.read_while(|b| is_astring_char(b) || b == b'%' || b == b'*')?;
                if s.is_empty() {
                    return Err(self.error("Expected list-mailbox"));
                }
                Ok(s.to_string())
            }
        }
    }

    /// Reads a sequence-set production such as `1:3,5,7:*`.
    pub fn read_sequence_set(&mut self) -> Result<&'a str> {
        let s = self.read_while(|b| b.is_ascii_digit() || matches!(b, b':' | b',' | b'*'))?;
        if s.is_empty() {
            return Err(self.error("Expected sequence set"));
        }
        Ok(s)
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads a 63-bit number (e.g. STATUS SIZE).
    pub fn read_number64(&mut self) -> Result<u64> {
        let s = self.read_while(|b| b.is_ascii_digit())?;
        s.parse().map_err(|_| self.error("Expected number"))
    }

    /// Skips optional spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    /// Reads the rest of the line as text, consuming the CRLF.
    pub fn read_text(&mut self) -> String {
        let start = self.pos;
        while !self.at_line_end() {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n') {
            self.skip(2);
        }
        text
    }
}

/// Returns true if the byte is a valid atom character.
///
/// Note: This includes `\` to handle flags like `\Seen` as single tokens,
/// even though RFC 9051 technically defines `\` as a quoted-special.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    // atom-specials = "(" / ")" / "{" / SP / CTL / list-wildcards / quoted-specials / resp-specials
    matches!(b,
        0x21 |         // !
        0x23..=0x24 |  // # $
        0x26..=0x27 |  // & '
        0x2B..=0x5A |  // + , - . / 0-9 : ; < = > ? @ A-Z
        0x5C |         // \ (for flags like \Seen)
        0x5E..=0x7A |  // ^ _ ` a-z
        0x7C |         // |
        0x7D |         // }
        0x7E           // ~
    )
}

/// Returns true if the byte may appear in an unquoted astring.
#[must_use]
pub const fn is_astring_char(b: u8) -> bool {
    is_atom_char(b) || b == b']'
}

/// Returns true if the string can be sent as an atom without quoting.
#[must_use]
pub fn is_atom(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| is_atom_char(b) && b != b'\\')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_tokens() {
        let mut lexer = Lexer::new(b"* OK");

        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_tagged_response() {
        let mut lexer = Lexer::new(b"A001 OK LOGIN completed\r\n");

        assert_eq!(lexer.next_token().unwrap(), Token::Atom("A001"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.read_text(), " LOGIN completed");
        assert!(lexer.is_eof());
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new(b"123 456 99999999999");

        assert_eq!(lexer.next_token().unwrap(), Token::Number(123));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(456));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_quoted_string_escaped() {
        let mut lexer = Lexer::new(b"\"hello \\\"world\\\" \\\\\"");

        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("hello \"world\" \\".to_string())
        );
    }

    #[test]
    fn test_quoted_string_errors() {
        assert!(Lexer::new(b"\"unterminated").next_token().is_err());
        assert!(Lexer::new(b"\"bad \\n escape\"").next_token().is_err());
        assert!(Lexer::new(b"\"line\r\nbreak\"").next_token().is_err());
    }

    #[test]
    fn test_nil() {
        let mut lexer = Lexer::new(b"NIL nil");

        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn test_brackets_and_flags() {
        let mut lexer = Lexer::new(b"[PERMANENTFLAGS (\\Seen \\*)]");

        assert_eq!(lexer.next_token().unwrap(), Token::LBracket);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("PERMANENTFLAGS"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\"));
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
        assert_eq!(lexer.next_token().unwrap(), Token::RBracket);
    }

    #[test]
    fn test_literals() {
        let mut lexer = Lexer::new(b"{5}\r\nhello {3+}\r\nabc");

        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello".to_vec()));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"abc".to_vec()));

        assert!(Lexer::new(b"{10}\r\nshort").next_token().is_err());
        assert!(Lexer::new(b"{99999999999999999999999}\r\n").next_token().is_err());
        assert!(Lexer::new(b"{5}hello").next_token().is_err());
    }

    #[test]
    fn test_literal_size_near_usize_max() {
        let input = format!("{{{}}}\r\nabc", usize::MAX);
        assert!(Lexer::new(input.as_bytes()).next_token().is_err());
        assert!(Lexer::new(b"{18446744073709551615+}\r\n").next_token().is_err());
    }

    #[test]
    fn test_read_astring_variants() {
        let mut lexer = Lexer::new(b"INBOX 123 \"Test mailbox\" {4}\r\nCaf\xc3 NIL foo]");
        assert_eq!(lexer.read_astring().unwrap(), "INBOX");
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_astring().unwrap(), "123");
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_astring().unwrap(), "Test mailbox");
        lexer.expect_space().unwrap();
        assert!(lexer.read_astring().is_err());
    }

    #[test]
    fn test_read_raw_atom_and_patterns() {
        let mut lexer = Lexer::new(b"+FLAGS.SILENT MyFolder/% 1:3,5:*");
        assert_eq!(lexer.read_raw_atom().unwrap(), "+FLAGS.SILENT");
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_list_mailbox().unwrap(), "MyFolder/%");
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_sequence_set().unwrap(), "1:3,5:*");
        lexer.expect_end().unwrap();
    }

    #[test]
    fn test_nstring_bytes() {
        let mut lexer = Lexer::new(b"NIL {2}\r\n\xff\x00");
        assert_eq!(lexer.read_nstring_bytes().unwrap(), None);
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_nstring_bytes().unwrap(), Some(vec![0xff, 0x00]));
    }

    #[test]
    fn test_continuation() {
        let mut lexer = Lexer::new(b"+ Ready\r\n");

        assert_eq!(lexer.next_token().unwrap(), Token::Plus);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("Ready"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
    }

    #[test]
    fn test_char_classes() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b':'));
        assert!(is_atom_char(b'\\'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b'{'));
        assert!(!is_atom_char(b'"'));
        assert!(!is_atom_char(b'%'));
        assert!(!is_atom_char(b'*'));
        assert!(!is_atom_char(b']'));
        assert!(is_astring_char(b']'));

        assert!(is_atom("INBOX"));
        assert!(!is_atom("Test mailbox"));
        assert!(!is_atom(""));
        assert!(!is_atom("a\\b"));
    }
}
