//! FETCH response parsing.

use crate::parser::helpers::{parse_flag_list, parse_section, skip_value};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{Uid, datetime};
use crate::Result;

use super::types::FetchItem;

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        if lexer.eat(b')') {
            break;
        }
        if !items.is_empty() || lexer.peek() == Some(b' ') {
            lexer.skip_spaces();
        }
        let name = lexer.read_raw_atom()?.to_ascii_uppercase();
        match name.as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number()?;
                let uid = Uid::new(n).ok_or_else(|| {
                    lexer.error(&format!("invalid UID value: {n} (UID cannot be 0)"))
                })?;
                items.push(FetchItem::Uid(uid));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.read_number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                let raw = lexer.read_string_bytes()?;
                let text = String::from_utf8_lossy(&raw);
                let date = datetime::parse_date_time(&text)
                    .ok_or_else(|| lexer.error(&format!("Invalid INTERNALDATE: {text}")))?;
                items.push(FetchItem::InternalDate(date));
            }
            "BODY" if lexer.peek() == Some(b'[') => {
                let section = parse_section(lexer)?;
                let origin = parse_origin(lexer)?;
                lexer.expect_space()?;
                let data = lexer.read_nstring_bytes()?;
                items.push(FetchItem::Body {
                    section,
                    origin,
                    data,
                });
            }
            _ => {
                // ENVELOPE, BODYSTRUCTURE and friends are not interpreted
                tracing::trace!(item = %name, "skipping FETCH item");
                if lexer.eat(b' ') {
                    skip_value(lexer)?;
                }
            }
        }
    }

    Ok(items)
}

/// Parses the `<origin>` suffix of a partial BODY response.
fn parse_origin(lexer: &mut Lexer<'_>) -> Result<Option<u32>> {
    if lexer.peek() != Some(b'<') {
        return Ok(None);
    }
    let raw = lexer.read_raw_atom()?;
    raw.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or_else(|| lexer.error(&format!("Invalid origin: {raw}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::{BodySection, SectionSpecifier};
    use crate::types::Flag;

    #[test]
    fn flags_uid_size() {
        let mut lexer = Lexer::new(b"(FLAGS (\\Seen \\Recent) UID 12345 RFC822.SIZE 44)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], FetchItem::Flags(f) if f.contains(&Flag::Recent)));
        assert!(matches!(items[1], FetchItem::Uid(u) if u.get() == 12345));
        assert_eq!(items[2], FetchItem::Rfc822Size(44));
    }

    #[test]
    fn body_literal_and_partial() {
        let mut lexer =
            Lexer::new(b"(BODY[HEADER] {5}\r\nHello BODY[TEXT]<10> \"abc\" BODY[1] NIL)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(
            items[0],
            FetchItem::Body {
                section: BodySection::of(SectionSpecifier::Header),
                origin: None,
                data: Some(b"Hello".to_vec()),
            }
        );
        assert_eq!(
            items[1],
            FetchItem::Body {
                section: BodySection::of(SectionSpecifier::Text),
                origin: Some(10),
                data: Some(b"abc".to_vec()),
            }
        );
        assert!(matches!(&items[2], FetchItem::Body { data: None, .. }));
    }

    #[test]
    fn internal_date() {
        let mut lexer = Lexer::new(b"(INTERNALDATE \"17-Jul-1996 02:44:25 -0700\")");
        let items = parse_fetch_response(&mut lexer).unwrap();
        let FetchItem::InternalDate(date) = &items[0] else {
            panic!("expected INTERNALDATE");
        };
        assert_eq!(date.timestamp(), 837_596_665);
    }

    #[test]
    fn unknown_items_are_skipped() {
        let mut lexer = Lexer::new(
            b"(ENVELOPE (NIL \"subj\" ((NIL NIL \"a\" \"b.c\")) NIL NIL NIL NIL NIL NIL NIL) UID 7)",
        );
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(7).unwrap())]);
    }
}
