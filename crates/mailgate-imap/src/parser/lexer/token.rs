//! Lexical units of the IMAP grammar.

use std::fmt;

/// One lexical unit. Atoms borrow from the input; quoted strings and
/// literals are owned because unescaping and literal reads copy anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Run of ATOM-CHARs that is neither a number nor `NIL`.
    Atom(&'a str),
    /// Quoted string with escapes removed.
    QuotedString(String),
    /// Literal payload, from either `{n}` or `{n+}`.
    Literal(Vec<u8>),
    /// Run of digits that fits in 32 bits.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// A single SP.
    Space,
    /// `*`, either an untagged prefix or a sequence wildcard.
    Asterisk,
    /// `+`, the continuation prefix.
    Plus,
    /// `NIL`, matched case-insensitively.
    Nil,
    /// Line terminator.
    Crlf,
    /// Input exhausted without a terminator.
    Eof,
}

impl Token<'_> {
    /// Returns true for tokens that end a line.
    #[must_use]
    pub const fn is_line_end(&self) -> bool {
        matches!(self, Self::Crlf | Self::Eof)
    }
}

/// Renders a token the way it would look in a protocol error message.
impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(s) => write!(f, "atom {s:?}"),
            Self::QuotedString(s) => write!(f, "string {s:?}"),
            Self::Literal(bytes) => write!(f, "literal of {} bytes", bytes.len()),
            Self::Number(n) => write!(f, "number {n}"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Space => f.write_str("SP"),
            Self::Asterisk => f.write_str("'*'"),
            Self::Plus => f.write_str("'+'"),
            Self::Nil => f.write_str("NIL"),
            Self::Crlf => f.write_str("CRLF"),
            Self::Eof => f.write_str("end of input"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_tokens() {
        assert_eq!(Token::Space.to_string(), "SP");
        assert_eq!(Token::Atom("FLAGS").to_string(), "atom \"FLAGS\"");
        assert_eq!(Token::Literal(vec![0; 5]).to_string(), "literal of 5 bytes");
        assert!(Token::Eof.is_line_end());
        assert!(!Token::Nil.is_line_end());
    }
}
