//! Grammar productions shared by the response and command parsers.

use crate::codec::utf7;
use crate::command::{BodySection, SectionSpecifier};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flag, Flags, Mailbox, ResponseCode, Uid, UidValidity};
use crate::{Error, Result};

/// Parses a bracketed response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("Invalid UID 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("Invalid UIDVALIDITY 0"))?,
            )
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?.into_iter().collect())
        }
        _ => ResponseCode::from_atom(atom),
    };

    // Skip arguments of codes we don't interpret
    while lexer.peek() != Some(b']') && !lexer.at_line_end() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses space-prefixed capability atoms up to the end of the line or
/// response code.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.eat(b' ') {
        if lexer.at_line_end() || lexer.peek() == Some(b']') {
            break;
        }
        caps.push(Capability::parse(lexer.read_raw_atom()?));
    }

    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            // `\*` lexes as a lone backslash followed by an asterisk
            Token::Atom("\\") if lexer.eat(b'*') => flags.insert(Flag::Wildcard),
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Number(n) => flags.insert(Flag::Keyword(n.to_string())),
            token => {
                return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}")));
            }
        }
    }

    Ok(flags)
}

/// Reads a mailbox name, decoding modified UTF-7 unless UTF8=ACCEPT is in
/// effect. Names that fail to decode are kept as sent.
pub fn read_mailbox(lexer: &mut Lexer<'_>, utf8: bool) -> Result<Mailbox> {
    let raw = lexer.read_astring()?;
    Ok(Mailbox::new(decode_mailbox(raw, utf8)))
}

/// Decodes a wire mailbox name.
pub fn decode_mailbox(raw: String, utf8: bool) -> String {
    if utf8 {
        return raw;
    }
    match utf7::decode(&raw) {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!(name = %raw, error = %e, "keeping undecodable mailbox name");
            raw
        }
    }
}

/// Parses a `[section]` body section specifier.
pub fn parse_section(lexer: &mut Lexer<'_>) -> Result<BodySection> {
    lexer.expect(Token::LBracket)?;
    if lexer.eat(b']') {
        return Ok(BodySection::full());
    }

    let text = lexer.read_raw_atom()?;
    let mut part = Vec::new();
    let mut rest = text;
    while let Some(head) = rest.split('.').next()
        && !head.is_empty()
        && head.bytes().all(|b| b.is_ascii_digit())
    {
        let n: u32 = head.parse().map_err(|_| lexer.error("Invalid section part"))?;
        if n == 0 {
            return Err(lexer.error("Section part numbers start at 1"));
        }
        part.push(n);
        rest = rest.get(head.len() + 1..).unwrap_or("");
    }

    let specifier = match rest.to_ascii_uppercase().as_str() {
        "" => SectionSpecifier::Full,
        "HEADER" => SectionSpecifier::Header,
        "TEXT" => SectionSpecifier::Text,
        "MIME" if !part.is_empty() => SectionSpecifier::Mime,
        "HEADER.FIELDS" => SectionSpecifier::HeaderFields(parse_header_list(lexer)?),
        "HEADER.FIELDS.NOT" => SectionSpecifier::HeaderFieldsNot(parse_header_list(lexer)?),
        other => return Err(lexer.error(&format!("Unknown section specifier: {other}"))),
    };

    lexer.expect(Token::RBracket)?;
    Ok(BodySection { part, specifier })
}

fn parse_header_list(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;
    let mut fields = Vec::new();
    loop {
        if lexer.eat(b')') {
            break;
        }
        if !fields.is_empty() {
            lexer.expect_space()?;
        }
        fields.push(lexer.read_astring()?);
    }
    if fields.is_empty() {
        return Err(lexer.error("Empty header field list"));
    }
    Ok(fields)
}

/// Skips one value: an atom, number, string, literal or balanced list.
pub fn skip_value(lexer: &mut Lexer<'_>) -> Result<()> {
    let mut depth = 0usize;
    loop {
        match lexer.peek() {
            Some(b'(') => {
                depth += 1;
                lexer.advance();
            }
            Some(b')' | b' ') if depth > 0 => {
                if lexer.advance() == Some(b')') {
                    depth -= 1;
                }
            }
            Some(b'"' | b'{') => {
                lexer.next_token()?;
            }
            Some(b')' | b' ' | b'\r') | None => {
                return if depth == 0 {
                    Ok(())
                } else {
                    Err(Error::parse(lexer.position(), "Unterminated list"))
                };
            }
            Some(_) => {
                lexer.advance();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn response_codes() {
        let mut lexer = Lexer::new(b"[UIDNEXT 7]");
        assert_eq!(
            parse_response_code(&mut lexer).unwrap(),
            ResponseCode::UidNext(Uid::new(7).unwrap())
        );

        let mut lexer = Lexer::new(b"[CAPABILITY IMAP4rev2 AUTH=PLAIN LITERAL+]");
        assert_eq!(
            parse_response_code(&mut lexer).unwrap(),
            ResponseCode::Capability(vec![
                Capability::Imap4Rev2,
                Capability::Auth("PLAIN".into()),
                Capability::LiteralPlus,
            ])
        );

        let mut lexer = Lexer::new(b"[BADCHARSET (UTF-8)] rest");
        assert_eq!(
            parse_response_code(&mut lexer).unwrap(),
            ResponseCode::Unknown("BADCHARSET".into())
        );
        assert_eq!(lexer.remaining(), b" rest");
    }

    #[test]
    fn flag_list_with_wildcard() {
        let mut lexer = Lexer::new(b"(\\Seen \\Deleted $Junk \\*)");
        let flags = parse_flag_list(&mut lexer).unwrap();
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Deleted));
        assert!(flags.has_keyword("$Junk"));
        assert!(flags.contains(&Flag::Wildcard));
        assert!(lexer.is_eof());
    }

    #[test]
    fn mailbox_decoding() {
        let mut lexer = Lexer::new(b"Caf&AOg- \"Angus &- Julia\" &bad");
        assert_eq!(read_mailbox(&mut lexer, false).unwrap().as_str(), "Cafè");
        lexer.expect_space().unwrap();
        assert_eq!(
            read_mailbox(&mut lexer, false).unwrap().as_str(),
            "Angus & Julia"
        );
        lexer.expect_space().unwrap();
        assert_eq!(read_mailbox(&mut lexer, false).unwrap().as_str(), "&bad");

        let mut lexer = Lexer::new(b"Caf&AOg-");
        assert_eq!(read_mailbox(&mut lexer, true).unwrap().as_str(), "Caf&AOg-");
    }

    #[test]
    fn sections() {
        let parse = |s: &[u8]| parse_section(&mut Lexer::new(s));
        assert_eq!(parse(b"[]").unwrap(), BodySection::full());
        assert_eq!(
            parse(b"[HEADER]").unwrap(),
            BodySection::of(SectionSpecifier::Header)
        );
        assert_eq!(
            parse(b"[1.2.TEXT]").unwrap(),
            BodySection {
                part: vec![1, 2],
                specifier: SectionSpecifier::Text,
            }
        );
        assert_eq!(
            parse(b"[HEADER.FIELDS.NOT (Subject \"From\")]").unwrap(),
            BodySection::of(SectionSpecifier::HeaderFieldsNot(vec![
                "Subject".into(),
                "From".into()
            ]))
        );
        assert!(parse(b"[0]").is_err());
        assert!(parse(b"[MIME]").is_err());
        assert!(parse(b"[BOGUS]").is_err());
        assert!(parse(b"[HEADER.FIELDS ()]").is_err());
    }

    #[test]
    fn skip_values() {
        let mut lexer = Lexer::new(b"(\"a\" (NIL {3}\r\nx)y)) NEXT");
        skip_value(&mut lexer).unwrap();
        assert_eq!(lexer.remaining(), b" NEXT");

        let mut lexer = Lexer::new(b"ATOM)");
        skip_value(&mut lexer).unwrap();
        assert_eq!(lexer.remaining(), b")");
    }
}
