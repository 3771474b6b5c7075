//! Server-side command parser.
//!
//! Turns one framed command line (literal data inline) into a tagged
//! [`Command`]. Mailbox names are decoded from modified UTF-7 unless the
//! session enabled UTF8=ACCEPT.

#![allow(clippy::missing_errors_doc)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::command::{
    AppendOptions, Command, FetchAttribute, FetchItems, SearchCriteria, SearchReturn, StoreAction,
};
use crate::parser::helpers::{decode_mailbox, parse_flag_list, parse_section, read_mailbox};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, SequenceSet, StatusItem, Tag, datetime, parse_rights,
};
use crate::Result;

/// Command parser.
pub struct CommandParser;

impl CommandParser {
    /// Parses a complete command line.
    pub fn parse(input: &[u8], utf8: bool) -> Result<(Tag, Command)> {
        let mut lexer = Lexer::new(input);
        let tag = read_tag(&mut lexer)?;
        lexer.expect_space()?;
        let command = parse_command(&mut lexer, utf8)?;
        lexer.expect_end()?;
        Ok((tag, command))
    }

    /// Recovers the tag of a line that failed to parse, so the error can be
    /// reported as a tagged BAD.
    #[must_use]
    pub fn tag(input: &[u8]) -> Option<Tag> {
        let mut lexer = Lexer::new(input);
        let tag = read_tag(&mut lexer).ok()?;
        (lexer.peek() == Some(b' ')).then_some(tag)
    }
}

fn read_tag(lexer: &mut Lexer<'_>) -> Result<Tag> {
    let tag = Tag::new(lexer.read_raw_atom()?);
    if tag.is_valid() {
        Ok(tag)
    } else {
        Err(lexer.error(&format!("Invalid tag: {tag}")))
    }
}

#[allow(clippy::too_many_lines)]
fn parse_command(lexer: &mut Lexer<'_>, utf8: bool) -> Result<Command> {
    let name = lexer.read_raw_atom()?.to_ascii_uppercase();

    Ok(match name.as_str() {
        "CAPABILITY" => Command::Capability,
        "NOOP" => Command::Noop,
        "LOGOUT" => Command::Logout,
        "STARTTLS" => Command::StartTls,
        "IDLE" => Command::Idle,
        "CLOSE" => Command::Close,
        "UNSELECT" => Command::Unselect,
        "EXPUNGE" => Command::Expunge,
        "LOGIN" => {
            lexer.expect_space()?;
            let username = lexer.read_astring()?;
            lexer.expect_space()?;
            let password = lexer.read_astring()?;
            Command::Login { username, password }
        }
        "AUTHENTICATE" => {
            lexer.expect_space()?;
            let mechanism = lexer.read_raw_atom()?.to_ascii_uppercase();
            let initial_response = if lexer.eat(b' ') {
                Some(decode_sasl(lexer.read_raw_atom()?).ok_or_else(|| {
                    lexer.error("Invalid base64 in initial response")
                })?)
            } else {
                None
            };
            Command::Authenticate {
                mechanism,
                initial_response,
            }
        }
        "ENABLE" => {
            let mut capabilities = Vec::new();
            while lexer.eat(b' ') {
                capabilities.push(Capability::parse(lexer.read_raw_atom()?));
            }
            if capabilities.is_empty() {
                return Err(lexer.error("ENABLE needs at least one capability"));
            }
            Command::Enable { capabilities }
        }
        "SELECT" | "EXAMINE" | "CREATE" | "DELETE" | "GETACL" | "MYRIGHTS" => {
            lexer.expect_space()?;
            let mailbox = read_mailbox(lexer, utf8)?;
            match name.as_str() {
                "SELECT" => Command::Select { mailbox },
                "EXAMINE" => Command::Examine { mailbox },
                "CREATE" => Command::Create { mailbox },
                "DELETE" => Command::Delete { mailbox },
                "GETACL" => Command::GetAcl { mailbox },
                _ => Command::MyRights { mailbox },
            }
        }
        "LIST" => parse_list(lexer, utf8)?,
        "STATUS" => {
            lexer.expect_space()?;
            let mailbox = read_mailbox(lexer, utf8)?;
            lexer.expect_space()?;
            let items = parse_status_items(lexer)?;
            Command::Status { mailbox, items }
        }
        "APPEND" => parse_append(lexer, utf8)?,
        "SETACL" => {
            lexer.expect_space()?;
            let mailbox = read_mailbox(lexer, utf8)?;
            lexer.expect_space()?;
            let identifier = lexer.read_astring()?;
            lexer.expect_space()?;
            let (modification, rights) = parse_rights(&lexer.read_astring()?);
            Command::SetAcl {
                mailbox,
                identifier,
                modification,
                rights,
            }
        }
        "DELETEACL" => {
            lexer.expect_space()?;
            let mailbox = read_mailbox(lexer, utf8)?;
            lexer.expect_space()?;
            let identifier = lexer.read_astring()?;
            Command::DeleteAcl {
                mailbox,
                identifier,
            }
        }
        "SEARCH" => parse_search(lexer, false)?,
        "FETCH" => parse_fetch(lexer, false)?,
        "STORE" => parse_store(lexer, false)?,
        "UID" => {
            lexer.expect_space()?;
            let sub = lexer.read_raw_atom()?.to_ascii_uppercase();
            match sub.as_str() {
                "SEARCH" => parse_search(lexer, true)?,
                "FETCH" => parse_fetch(lexer, true)?,
                "STORE" => parse_store(lexer, true)?,
                "EXPUNGE" => {
                    lexer.expect_space()?;
                    Command::UidExpunge {
                        uids: read_sequence_set(lexer)?,
                    }
                }
                _ => return Err(lexer.error(&format!("Unknown UID command: {sub}"))),
            }
        }
        _ => return Err(lexer.error(&format!("Unknown command: {name}"))),
    })
}

/// Decodes a SASL response; `=` stands for an empty one.
pub(crate) fn decode_sasl(s: &str) -> Option<Vec<u8>> {
    if s == "=" {
        return Some(Vec::new());
    }
    BASE64.decode(s).ok()
}

fn read_sequence_set(lexer: &mut Lexer<'_>) -> Result<SequenceSet> {
    let raw = lexer.read_sequence_set()?;
    SequenceSet::parse(raw)
}

fn parse_list(lexer: &mut Lexer<'_>, utf8: bool) -> Result<Command> {
    lexer.expect_space()?;
    let reference = decode_mailbox(lexer.read_astring()?, utf8);
    lexer.expect_space()?;
    let pattern = decode_mailbox(lexer.read_list_mailbox()?, utf8);

    let mut return_status = Vec::new();
    if lexer.eat(b' ') {
        let keyword = lexer.read_raw_atom()?;
        if !keyword.eq_ignore_ascii_case("RETURN") {
            return Err(lexer.error(&format!("Unexpected LIST argument: {keyword}")));
        }
        lexer.expect_space()?;
        lexer.expect(Token::LParen)?;
        loop {
            lexer.skip_spaces();
            if lexer.eat(b')') {
                break;
            }
            let option = lexer.read_raw_atom()?;
            if option.eq_ignore_ascii_case("STATUS") {
                lexer.expect_space()?;
                return_status = parse_status_items(lexer)?;
            } else {
                tracing::trace!(option, "ignoring LIST return option");
            }
        }
    }

    Ok(Command::List {
        reference,
        pattern,
        return_status,
    })
}

fn parse_status_items(lexer: &mut Lexer<'_>) -> Result<Vec<StatusItem>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();
    loop {
        lexer.skip_spaces();
        if lexer.eat(b')') {
            break;
        }
        let name = lexer.read_raw_atom()?;
        let item =
            StatusItem::parse(name).ok_or_else(|| lexer.error(&format!("Unknown STATUS item: {name}")))?;
        items.push(item);
    }
    if items.is_empty() {
        return Err(lexer.error("Empty STATUS item list"));
    }
    Ok(items)
}

fn parse_append(lexer: &mut Lexer<'_>, utf8: bool) -> Result<Command> {
    lexer.expect_space()?;
    let mailbox = read_mailbox(lexer, utf8)?;
    lexer.expect_space()?;

    let mut options = AppendOptions::default();
    if lexer.peek() == Some(b'(') {
        options.flags = parse_flag_list(lexer)?.into_iter().collect();
        lexer.expect_space()?;
    }
    if lexer.peek() == Some(b'"') {
        let raw = lexer.read_astring()?;
        let date = datetime::parse_date_time(&raw)
            .ok_or_else(|| lexer.error(&format!("Invalid date-time: {raw}")))?;
        options.date = Some(date);
        lexer.expect_space()?;
    }
    if lexer.peek() != Some(b'{') {
        return Err(lexer.error("APPEND message must be a literal"));
    }
    let message = lexer.read_string_bytes()?;

    Ok(Command::Append {
        mailbox,
        options,
        message,
    })
}

fn parse_search(lexer: &mut Lexer<'_>, uid: bool) -> Result<Command> {
    lexer.expect_space()?;

    let mut returns = None;
    if peek_keyword(lexer, "RETURN") {
        lexer.read_raw_atom()?;
        lexer.expect_space()?;
        lexer.expect(Token::LParen)?;
        let mut options = Vec::new();
        loop {
            lexer.skip_spaces();
            if lexer.eat(b')') {
                break;
            }
            let name = lexer.read_raw_atom()?;
            options.push(
                SearchReturn::parse(name)
                    .ok_or_else(|| lexer.error(&format!("Unknown RETURN option: {name}")))?,
            );
        }
        // RETURN () is the same as RETURN (ALL)
        if options.is_empty() {
            options.push(SearchReturn::All);
        }
        returns = Some(options);
        lexer.expect_space()?;
    }

    if peek_keyword(lexer, "CHARSET") {
        lexer.read_raw_atom()?;
        lexer.expect_space()?;
        let charset = lexer.read_astring()?;
        if !charset.eq_ignore_ascii_case("UTF-8") && !charset.eq_ignore_ascii_case("US-ASCII") {
            return Err(lexer.error(&format!("Unsupported charset: {charset}")));
        }
        lexer.expect_space()?;
    }

    let mut keys = vec![parse_search_key(lexer, 0)?];
    while lexer.eat(b' ') {
        keys.push(parse_search_key(lexer, 0)?);
    }
    let criteria = if keys.len() == 1 {
        keys.remove(0)
    } else {
        SearchCriteria::And(keys)
    };

    Ok(Command::Search {
        criteria,
        returns,
        uid,
    })
}

fn peek_keyword(lexer: &Lexer<'_>, keyword: &str) -> bool {
    let rest = lexer.remaining();
    rest.len() > keyword.len()
        && rest[..keyword.len()].eq_ignore_ascii_case(keyword.as_bytes())
        && rest[keyword.len()] == b' '
}

/// Deepest nesting of parenthesized, `NOT` and `OR` search keys.
const MAX_SEARCH_DEPTH: usize = 64;

fn parse_search_key(lexer: &mut Lexer<'_>, depth: usize) -> Result<SearchCriteria> {
    if depth > MAX_SEARCH_DEPTH {
        return Err(lexer.error("Search key nesting too deep"));
    }
    match lexer.peek() {
        Some(b'(') => {
            lexer.advance();
            let mut keys = vec![parse_search_key(lexer, depth + 1)?];
            while lexer.eat(b' ') {
                keys.push(parse_search_key(lexer, depth + 1)?);
            }
            lexer.expect(Token::RParen)?;
            return Ok(if keys.len() == 1 {
                keys.remove(0)
            } else {
                SearchCriteria::And(keys)
            });
        }
        Some(b'0'..=b'9' | b'*') => {
            return read_sequence_set(lexer).map(SearchCriteria::SequenceSet);
        }
        _ => {}
    }

    let name = lexer.read_raw_atom()?.to_ascii_uppercase();
    let arg = |lexer: &mut Lexer<'_>| -> Result<String> {
        lexer.expect_space()?;
        lexer.read_astring()
    };

    Ok(match name.as_str() {
        "ALL" => SearchCriteria::All,
        "ANSWERED" => SearchCriteria::Answered,
        "DELETED" => SearchCriteria::Deleted,
        "DRAFT" => SearchCriteria::Draft,
        "FLAGGED" => SearchCriteria::Flagged,
        "SEEN" => SearchCriteria::Seen,
        "UNANSWERED" => SearchCriteria::Unanswered,
        "UNDELETED" => SearchCriteria::Undeleted,
        "UNDRAFT" => SearchCriteria::Undraft,
        "UNFLAGGED" => SearchCriteria::Unflagged,
        "UNSEEN" => SearchCriteria::Unseen,
        "KEYWORD" => SearchCriteria::Keyword(arg(lexer)?),
        "UNKEYWORD" => SearchCriteria::Unkeyword(arg(lexer)?),
        "SUBJECT" => SearchCriteria::Subject(arg(lexer)?),
        "FROM" => SearchCriteria::From(arg(lexer)?),
        "TO" => SearchCriteria::To(arg(lexer)?),
        "CC" => SearchCriteria::Header("Cc".into(), arg(lexer)?),
        "BCC" => SearchCriteria::Header("Bcc".into(), arg(lexer)?),
        "BODY" => SearchCriteria::Body(arg(lexer)?),
        "TEXT" => SearchCriteria::Text(arg(lexer)?),
        "HEADER" => {
            let field = arg(lexer)?;
            SearchCriteria::Header(field, arg(lexer)?)
        }
        "SINCE" | "BEFORE" | "ON" => {
            let raw = arg(lexer)?;
            let date = datetime::parse_date(&raw)
                .ok_or_else(|| lexer.error(&format!("Invalid date: {raw}")))?;
            match name.as_str() {
                "SINCE" => SearchCriteria::Since(date),
                "BEFORE" => SearchCriteria::Before(date),
                _ => SearchCriteria::On(date),
            }
        }
        "LARGER" | "SMALLER" => {
            lexer.expect_space()?;
            let n = lexer.read_number64()?;
            if name == "LARGER" {
                SearchCriteria::Larger(n)
            } else {
                SearchCriteria::Smaller(n)
            }
        }
        "UID" => {
            lexer.expect_space()?;
            SearchCriteria::Uid(read_sequence_set(lexer)?)
        }
        "NOT" => {
            lexer.expect_space()?;
            SearchCriteria::not(parse_search_key(lexer, depth + 1)?)
        }
        "OR" => {
            lexer.expect_space()?;
            let a = parse_search_key(lexer, depth + 1)?;
            lexer.expect_space()?;
            let b = parse_search_key(lexer, depth + 1)?;
            SearchCriteria::or(a, b)
        }
        _ => return Err(lexer.error(&format!("Unknown search key: {name}"))),
    })
}

fn parse_fetch(lexer: &mut Lexer<'_>, uid: bool) -> Result<Command> {
    lexer.expect_space()?;
    let sequence = read_sequence_set(lexer)?;
    lexer.expect_space()?;

    let items = if lexer.eat(b'(') {
        let mut attrs = Vec::new();
        loop {
            lexer.skip_spaces();
            if lexer.eat(b')') {
                break;
            }
            attrs.push(parse_fetch_attribute(lexer)?);
        }
        if attrs.is_empty() {
            return Err(lexer.error("Empty FETCH item list"));
        }
        FetchItems::Items(attrs)
    } else if peek_macro(lexer, "FAST") {
        lexer.read_raw_atom()?;
        FetchItems::Fast
    } else {
        FetchItems::Items(vec![parse_fetch_attribute(lexer)?])
    };

    Ok(Command::Fetch {
        sequence,
        items,
        uid,
    })
}

fn peek_macro(lexer: &Lexer<'_>, name: &str) -> bool {
    let rest = lexer.remaining();
    rest.len() >= name.len()
        && rest[..name.len()].eq_ignore_ascii_case(name.as_bytes())
        && matches!(rest.get(name.len()), None | Some(b'\r'))
}

fn parse_fetch_attribute(lexer: &mut Lexer<'_>) -> Result<FetchAttribute> {
    let name = lexer.read_raw_atom()?.to_ascii_uppercase();
    Ok(match name.as_str() {
        "FLAGS" => FetchAttribute::Flags,
        "INTERNALDATE" => FetchAttribute::InternalDate,
        "RFC822.SIZE" => FetchAttribute::Rfc822Size,
        "UID" => FetchAttribute::Uid,
        "BODY" | "BODY.PEEK" if lexer.peek() == Some(b'[') => {
            let section = parse_section(lexer)?;
            let partial = parse_partial(lexer)?;
            FetchAttribute::Body {
                section,
                peek: name == "BODY.PEEK",
                partial,
            }
        }
        _ => return Err(lexer.error(&format!("Unsupported FETCH item: {name}"))),
    })
}

/// Parses `<origin.length>`.
fn parse_partial(lexer: &mut Lexer<'_>) -> Result<Option<(u32, u32)>> {
    if lexer.peek() != Some(b'<') {
        return Ok(None);
    }
    let raw = lexer.read_raw_atom()?;
    raw.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .and_then(|s| s.split_once('.'))
        .and_then(|(origin, len)| Some((origin.parse().ok()?, len.parse().ok()?)))
        .filter(|&(_, len)| len > 0)
        .map(Some)
        .ok_or_else(|| lexer.error(&format!("Invalid partial range: {raw}")))
}

fn parse_store(lexer: &mut Lexer<'_>, uid: bool) -> Result<Command> {
    lexer.expect_space()?;
    let sequence = read_sequence_set(lexer)?;
    lexer.expect_space()?;

    let item = lexer.read_raw_atom()?.to_ascii_uppercase();
    let (base, silent) = match item.strip_suffix(".SILENT") {
        Some(base) => (base, true),
        None => (item.as_str(), false),
    };
    lexer.expect_space()?;

    let flags: Vec<Flag> = if lexer.peek() == Some(b'(') {
        parse_flag_list(lexer)?.into_iter().collect()
    } else {
        let mut flags = vec![Flag::parse(lexer.read_raw_atom()?)];
        while lexer.eat(b' ') {
            flags.push(Flag::parse(lexer.read_raw_atom()?));
        }
        flags
    };

    let action = match base {
        "FLAGS" => StoreAction::SetFlags(flags),
        "+FLAGS" => StoreAction::AddFlags(flags),
        "-FLAGS" => StoreAction::RemoveFlags(flags),
        _ => return Err(lexer.error(&format!("Unknown STORE item: {item}"))),
    };

    Ok(Command::Store {
        sequence,
        action,
        silent,
        uid,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::codec::LiteralMode;
    use crate::command::{BodySection, SectionSpecifier};
    use crate::types::{Mailbox, RightModification, RightSet};

    fn parse(input: &str) -> Command {
        let (tag, cmd) = CommandParser::parse(input.as_bytes(), false).unwrap();
        assert_eq!(tag.as_str(), "A1");
        cmd
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("A1 NOOP\r\n"), Command::Noop);
        assert_eq!(parse("A1 capability\r\n"), Command::Capability);
        assert_eq!(parse("A1 UNSELECT"), Command::Unselect);
        assert_eq!(
            parse("A1 LOGIN test-user \"test-password\"\r\n"),
            Command::Login {
                username: "test-user".into(),
                password: "test-password".into(),
            }
        );
    }

    #[test]
    fn authenticate_initial_response() {
        assert_eq!(
            parse("A1 AUTHENTICATE plain AHVzZXIAcGFzcw==\r\n"),
            Command::Authenticate {
                mechanism: "PLAIN".into(),
                initial_response: Some(b"\0user\0pass".to_vec()),
            }
        );
        assert_eq!(
            parse("A1 AUTHENTICATE PLAIN =\r\n"),
            Command::Authenticate {
                mechanism: "PLAIN".into(),
                initial_response: Some(Vec::new()),
            }
        );
        assert!(CommandParser::parse(b"A1 AUTHENTICATE PLAIN !!\r\n", false).is_err());
    }

    #[test]
    fn mailbox_names_follow_utf8_mode() {
        assert_eq!(
            parse("A1 CREATE Caf&AOg-\r\n"),
            Command::Create {
                mailbox: Mailbox::new("Cafè"),
            }
        );
        let (_, cmd) = CommandParser::parse("A1 CREATE \"Cafè\"\r\n".as_bytes(), true).unwrap();
        assert_eq!(
            cmd,
            Command::Create {
                mailbox: Mailbox::new("Cafè"),
            }
        );
        assert_eq!(
            parse("A1 SELECT inbox\r\n"),
            Command::Select {
                mailbox: Mailbox::inbox(),
            }
        );
    }

    #[test]
    fn list_return_status() {
        assert_eq!(
            parse("A1 LIST \"\" % RETURN (STATUS (MESSAGES UIDNEXT))\r\n"),
            Command::List {
                reference: String::new(),
                pattern: "%".into(),
                return_status: vec![StatusItem::Messages, StatusItem::UidNext],
            }
        );
        assert_eq!(
            parse("A1 LIST \"\" *\r\n"),
            Command::List {
                reference: String::new(),
                pattern: "*".into(),
                return_status: vec![],
            }
        );
    }

    #[test]
    fn acl_commands() {
        assert_eq!(
            parse("A1 SETACL MyFolder test-user +rwi\r\n"),
            Command::SetAcl {
                mailbox: Mailbox::new("MyFolder"),
                identifier: "test-user".into(),
                modification: RightModification::Add,
                rights: RightSet::from("rwi"),
            }
        );
        assert_eq!(
            parse("A1 DELETEACL MyFolder anyone\r\n"),
            Command::DeleteAcl {
                mailbox: Mailbox::new("MyFolder"),
                identifier: "anyone".into(),
            }
        );
        assert_eq!(
            parse("A1 MYRIGHTS INBOX\r\n"),
            Command::MyRights {
                mailbox: Mailbox::inbox(),
            }
        );
    }

    #[test]
    fn append_with_flags_and_date() {
        let cmd = parse("A1 APPEND INBOX (\\Seen) \"17-Jul-1996 02:44:25 -0700\" {5}\r\nHello\r\n");
        let Command::Append {
            mailbox,
            options,
            message,
        } = cmd
        else {
            panic!("expected APPEND");
        };
        assert!(mailbox.is_inbox());
        assert_eq!(options.flags, vec![Flag::Seen]);
        assert!(options.date.is_some());
        assert_eq!(message, b"Hello");

        assert!(CommandParser::parse(b"A1 APPEND INBOX \"inline\"\r\n", false).is_err());
    }

    #[test]
    fn search_criteria() {
        let cmd = parse(
            "A1 UID SEARCH RETURN (MIN COUNT) CHARSET UTF-8 HEADER Message-Id <1@example.com> OR SINCE 5-Jan-2024 (SEEN LARGER 10) NOT 1:3\r\n",
        );
        assert_eq!(
            cmd,
            Command::Search {
                criteria: SearchCriteria::And(vec![
                    SearchCriteria::Header("Message-Id".into(), "<1@example.com>".into()),
                    SearchCriteria::or(
                        SearchCriteria::Since(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()),
                        SearchCriteria::And(vec![SearchCriteria::Seen, SearchCriteria::Larger(10)]),
                    ),
                    SearchCriteria::not(SearchCriteria::SequenceSet(
                        SequenceSet::range(1, 3).unwrap()
                    )),
                ]),
                returns: Some(vec![SearchReturn::Min, SearchReturn::Count]),
                uid: true,
            }
        );

        assert_eq!(
            parse("A1 SEARCH RETURN () ALL\r\n"),
            Command::Search {
                criteria: SearchCriteria::All,
                returns: Some(vec![SearchReturn::All]),
                uid: false,
            }
        );
        assert!(CommandParser::parse(b"A1 SEARCH CHARSET KOI8-R ALL\r\n", false).is_err());
        assert!(CommandParser::parse(b"A1 SEARCH\r\n", false).is_err());
    }

    #[test]
    fn oversized_literal_fails() {
        let input = b"A1 LOGIN {18446744073709551615}\r\n";
        assert!(CommandParser::parse(input, false).is_err());
    }

    #[test]
    fn deeply_nested_search_keys_fail() {
        let nested = |depth: usize| {
            format!("A1 SEARCH {}ALL{}\r\n", "(".repeat(depth), ")".repeat(depth))
        };
        assert!(CommandParser::parse(nested(100_000).as_bytes(), false).is_err());
        assert!(CommandParser::parse(nested(8).as_bytes(), false).is_ok());

        let nots = format!("A1 SEARCH {}ALL\r\n", "NOT ".repeat(100_000));
        assert!(CommandParser::parse(nots.as_bytes(), false).is_err());
        let ors = format!("A1 SEARCH {}ALL\r\n", "OR ALL ".repeat(100));
        assert!(CommandParser::parse(ors.as_bytes(), false).is_err());
    }

    #[test]
    fn serialized_commands_parse_back() {
        let cmd = Command::Search {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Subject("hello world".into()),
                SearchCriteria::Unkeyword("$Junk".into()),
            ]),
            returns: None,
            uid: false,
        };
        let bytes = cmd
            .encode(&Tag::new("A1"), LiteralMode::NonSynchronizing, false)
            .to_vec();
        assert_eq!(CommandParser::parse(&bytes, false).unwrap().1, cmd);
    }

    #[test]
    fn fetch_items() {
        assert_eq!(
            parse("A1 FETCH 1:* FAST\r\n"),
            Command::Fetch {
                sequence: SequenceSet::parse("1:*").unwrap(),
                items: FetchItems::Fast,
                uid: false,
            }
        );
        assert_eq!(
            parse("A1 UID FETCH 7 (UID FLAGS BODY.PEEK[HEADER.FIELDS (Subject)]<0.100>)\r\n"),
            Command::Fetch {
                sequence: SequenceSet::single(7).unwrap(),
                items: FetchItems::Items(vec![
                    FetchAttribute::Uid,
                    FetchAttribute::Flags,
                    FetchAttribute::Body {
                        section: BodySection::of(SectionSpecifier::HeaderFields(vec![
                            "Subject".into()
                        ])),
                        peek: true,
                        partial: Some((0, 100)),
                    },
                ]),
                uid: true,
            }
        );
        assert_eq!(
            parse("A1 FETCH 1 BODY[]\r\n"),
            Command::Fetch {
                sequence: SequenceSet::single(1).unwrap(),
                items: FetchItems::Items(vec![FetchAttribute::full_body(false)]),
                uid: false,
            }
        );
        assert!(CommandParser::parse(b"A1 FETCH 1 ENVELOPE\r\n", false).is_err());
        assert!(CommandParser::parse(b"A1 FETCH 1 BODY[]<0.0>\r\n", false).is_err());
    }

    #[test]
    fn store_forms() {
        assert_eq!(
            parse("A1 STORE 1 +FLAGS.SILENT (\\Deleted)\r\n"),
            Command::Store {
                sequence: SequenceSet::single(1).unwrap(),
                action: StoreAction::AddFlags(vec![Flag::Deleted]),
                silent: true,
                uid: false,
            }
        );
        assert_eq!(
            parse("A1 UID STORE 2:4 -FLAGS \\Seen $Junk\r\n"),
            Command::Store {
                sequence: SequenceSet::range(2, 4).unwrap(),
                action: StoreAction::RemoveFlags(vec![Flag::Seen, Flag::Keyword("$Junk".into())]),
                silent: false,
                uid: true,
            }
        );
        assert!(CommandParser::parse(b"A1 STORE 1 X-FLAGS (\\Seen)\r\n", false).is_err());
    }

    #[test]
    fn tag_recovery() {
        assert!(CommandParser::parse(b"A1 BOGUS\r\n", false).is_err());
        assert_eq!(CommandParser::tag(b"A1 BOGUS\r\n"), Some(Tag::new("A1")));
        assert_eq!(CommandParser::tag(b"+bad NOOP\r\n"), None);
        assert_eq!(CommandParser::tag(b"\r\n"), None);
        assert!(CommandParser::parse(b"A1 NOOP extra\r\n", false).is_err());
    }
}
