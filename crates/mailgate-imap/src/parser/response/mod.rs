//! IMAP response parser.
//!
//! Parses server responses according to RFC 9051 grammar.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::match_same_arms)]

mod fetch;
mod serialize;
mod types;

pub use types::{AclData, FetchItem, FetchMessage, Response, SearchData, UntaggedResponse};

use crate::parser::helpers::{
    decode_mailbox, parse_capability_data, parse_flag_list, parse_response_code, read_mailbox,
    skip_value,
};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    ListData, Mailbox, MailboxAttribute, ResponseCode, RightSet, SeqNum, SequenceSet, Status, StatusData,
    StatusItem, Tag, Uid, UidValidity,
};
use crate::{Error, Result};

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response, decoding mailbox names from modified
    /// UTF-7.
    pub fn parse(input: &[u8]) -> Result<Response> {
        Self::parse_with(input, false)
    }

    /// Parses a complete response. With `utf8` set (UTF8=ACCEPT enabled)
    /// mailbox names are taken verbatim.
    pub fn parse_with(input: &[u8], utf8: bool) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer, utf8),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            Token::Number(n) => Self::parse_tagged(&mut lexer, &n.to_string()),
            token => Err(Error::parse(
                0,
                format!("Expected *, +, or tag, got {token:?}"),
            )),
        }
    }

    /// Parses a tagged response.
    fn parse_tagged(lexer: &mut Lexer<'_>, tag_str: &str) -> Result<Response> {
        lexer.expect_space()?;

        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag_str),
            status,
            code,
            text,
        })
    }

    /// Parses an untagged response.
    fn parse_untagged(lexer: &mut Lexer<'_>, utf8: bool) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(s) => Self::parse_untagged_atom(lexer, s, utf8)?,
            Token::Number(n) => Self::parse_message_data(lexer, n)?,
            token => {
                return Err(lexer.error(&format!(
                    "Unexpected token in untagged response: {token:?}"
                )));
            }
        };

        Ok(Response::Untagged(untagged))
    }

    fn parse_untagged_atom(
        lexer: &mut Lexer<'_>,
        keyword: &str,
        utf8: bool,
    ) -> Result<UntaggedResponse> {
        let upper = keyword.to_uppercase();
        Ok(match upper.as_str() {
            "OK" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Ok { code, text }
            }
            "NO" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::No { code, text }
            }
            "BAD" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Bad { code, text }
            }
            "PREAUTH" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::PreAuth { code, text }
            }
            "BYE" => {
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Bye { code, text }
            }
            "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
            "ENABLED" => UntaggedResponse::Enabled(parse_capability_data(lexer)?),
            "FLAGS" => {
                lexer.expect_space()?;
                UntaggedResponse::Flags(parse_flag_list(lexer)?)
            }
            "LIST" => {
                lexer.expect_space()?;
                UntaggedResponse::List(parse_list_response(lexer, utf8)?)
            }
            "STATUS" => {
                lexer.expect_space()?;
                UntaggedResponse::MailboxStatus(parse_status_response(lexer, utf8)?)
            }
            "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
            "ESEARCH" => {
                let (tag, data) = parse_esearch_response(lexer)?;
                UntaggedResponse::Esearch { tag, data }
            }
            "ACL" => {
                lexer.expect_space()?;
                UntaggedResponse::Acl(parse_acl_response(lexer, utf8)?)
            }
            "MYRIGHTS" => {
                lexer.expect_space()?;
                let mailbox = read_mailbox(lexer, utf8)?;
                lexer.expect_space()?;
                let rights = RightSet::from(lexer.read_astring()?.as_str());
                UntaggedResponse::MyRights { mailbox, rights }
            }
            _ => {
                return Err(lexer.error(&format!("Unknown untagged response: {keyword}")));
            }
        })
    }

    fn parse_message_data(lexer: &mut Lexer<'_>, n: u32) -> Result<UntaggedResponse> {
        lexer.expect_space()?;
        let keyword = lexer.read_atom_string()?;
        let upper = keyword.to_uppercase();
        if upper == "EXISTS" {
            return Ok(UntaggedResponse::Exists(n));
        }
        if upper == "RECENT" {
            return Ok(UntaggedResponse::Recent(n));
        }
        let seq = SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?;

        Ok(match upper.as_str() {
            "EXPUNGE" => UntaggedResponse::Expunge(seq),
            "FETCH" => {
                lexer.expect_space()?;
                let items = fetch::parse_fetch_response(lexer)?;
                UntaggedResponse::Fetch(FetchMessage { seq, items })
            }
            _ => {
                return Err(lexer.error(&format!("Unknown message data: {keyword}")));
            }
        })
    }

    /// Parses a continuation response.
    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        lexer.eat(b' ');
        let text = lexer.read_text();

        Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        }
    }

    /// Parses a status keyword.
    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("Invalid status: {s}"))),
        }
    }

    /// Parses response text with optional response code. Lenient about a
    /// missing space or text.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        lexer.eat(b' ');
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        lexer.eat(b' ');
        let text = lexer.read_text();

        Ok((code, text))
    }
}

/// Parses a LIST response.
fn parse_list_response(lexer: &mut Lexer<'_>, utf8: bool) -> Result<ListData> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            Token::Space => {}
            token => {
                return Err(lexer.error(&format!("Unexpected token in LIST attributes: {token:?}")));
            }
        }
    }

    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => return Err(lexer.error(&format!("Expected delimiter, got {token:?}"))),
    };

    lexer.expect_space()?;
    let raw = lexer.read_astring()?;

    // Extended data (RFC 5258) is not interpreted
    while lexer.eat(b' ') {
        skip_value(lexer)?;
    }

    Ok(ListData {
        attributes,
        delimiter,
        mailbox: Mailbox::new(decode_mailbox(raw, utf8)),
        status: None,
    })
}

/// Parses a STATUS response.
fn parse_status_response(lexer: &mut Lexer<'_>, utf8: bool) -> Result<StatusData> {
    let mut data = StatusData {
        mailbox: read_mailbox(lexer, utf8)?,
        ..StatusData::default()
    };
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    loop {
        lexer.skip_spaces();
        if lexer.eat(b')') {
            break;
        }
        let name = lexer.read_raw_atom()?;
        lexer.expect_space()?;
        let value = lexer.read_number64()?;
        let small = u32::try_from(value).ok();
        match StatusItem::parse(name) {
            Some(StatusItem::Messages) => data.messages = small,
            Some(StatusItem::Recent) => data.recent = small,
            Some(StatusItem::UidNext) => data.uid_next = small.and_then(Uid::new),
            Some(StatusItem::UidValidity) => {
                data.uid_validity = small.and_then(UidValidity::new);
            }
            Some(StatusItem::Unseen) => data.unseen = small,
            Some(StatusItem::Deleted) => data.deleted = small,
            Some(StatusItem::Size) => data.size = Some(value),
            None => tracing::trace!(item = name, "ignoring unknown STATUS item"),
        }
    }

    Ok(data)
}

/// Parses a SEARCH response.
fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut nums = Vec::new();

    while lexer.eat(b' ') {
        if lexer.at_line_end() {
            break;
        }
        // Trailing `(MODSEQ n)` from CONDSTORE servers
        if lexer.peek() == Some(b'(') {
            skip_value(lexer)?;
            continue;
        }
        nums.push(lexer.read_number()?);
    }

    Ok(nums)
}

/// Parses an ESEARCH response.
fn parse_esearch_response(lexer: &mut Lexer<'_>) -> Result<(Option<Tag>, SearchData)> {
    let mut tag = None;
    let mut data = SearchData::default();

    if lexer.peek_at(1) == Some(b'(') && lexer.eat(b' ') {
        lexer.expect(Token::LParen)?;
        let name = lexer.read_raw_atom()?;
        if !name.eq_ignore_ascii_case("TAG") {
            return Err(lexer.error(&format!("Unknown ESEARCH correlator: {name}")));
        }
        lexer.expect_space()?;
        tag = Some(Tag::new(lexer.read_astring()?));
        lexer.expect(Token::RParen)?;
    }

    while lexer.eat(b' ') {
        if lexer.at_line_end() {
            break;
        }
        let name = lexer.read_raw_atom()?.to_ascii_uppercase();
        if name == "UID" {
            data.uid = true;
            continue;
        }
        lexer.expect_space()?;
        match name.as_str() {
            "MIN" => data.min = Some(lexer.read_number()?),
            "MAX" => data.max = Some(lexer.read_number()?),
            "COUNT" => data.count = Some(lexer.read_number()?),
            "ALL" => {
                let set = lexer.read_sequence_set()?;
                data.all = SequenceSet::parse(set)?;
            }
            _ => skip_value(lexer)?,
        }
    }

    Ok((tag, data))
}

/// Parses an ACL response.
fn parse_acl_response(lexer: &mut Lexer<'_>, utf8: bool) -> Result<AclData> {
    let mailbox = read_mailbox(lexer, utf8)?;
    let mut entries = Vec::new();

    while lexer.eat(b' ') {
        if lexer.at_line_end() {
            break;
        }
        let identifier = lexer.read_astring()?;
        lexer.expect_space()?;
        let rights = RightSet::from(lexer.read_astring()?.as_str());
        entries.push((identifier, rights));
    }

    Ok(AclData { mailbox, entries })
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
    use crate::types::{Capability, Flag, MailboxAttribute, ResponseCode};

    use super::*;

    #[test]
    fn test_parse_ok_response() {
        let input = b"* OK IMAP4rev2 server ready\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev2 server ready");
            }
            _ => panic!("Expected untagged OK"),
        }
    }

    #[test]
    fn test_parse_greeting_with_capabilities() {
        let input = b"* OK [CAPABILITY IMAP4rev2 STARTTLS AUTH=PLAIN] IMAP4rev2 Service Ready\r\n";
        let Response::Untagged(UntaggedResponse::Ok { code, text }) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected untagged OK");
        };
        let Some(ResponseCode::Capability(caps)) = code else {
            panic!("Expected CAPABILITY code");
        };
        assert!(caps.contains(&Capability::StartTls));
        assert!(caps.contains(&Capability::Auth("PLAIN".into())));
        assert_eq!(text, "IMAP4rev2 Service Ready");
    }

    #[test]
    fn test_parse_tagged_ok() {
        let input = b"A001 OK LOGIN completed\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "A001");
                assert_eq!(status, Status::Ok);
                assert!(code.is_none());
                assert_eq!(text, "LOGIN completed");
            }
            _ => panic!("Expected tagged response"),
        }
    }

    #[test]
    fn test_parse_tagged_no_with_code() {
        let input = b"A002 NO [NONEXISTENT] No such mailbox\r\n";
        let Response::Tagged {
            status, code, text, ..
        } = ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected tagged response");
        };
        assert_eq!(status, Status::No);
        assert_eq!(code, Some(ResponseCode::NonExistent));
        assert_eq!(text, "No such mailbox");
    }

    #[test]
    fn test_parse_capability_and_enabled() {
        let response = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE ACL\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Capability(caps)) = response else {
            panic!("Expected capability response");
        };
        assert_eq!(
            caps,
            vec![Capability::Imap4Rev1, Capability::Idle, Capability::Acl]
        );

        let response = ResponseParser::parse(b"* ENABLED UTF8=ACCEPT\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Enabled(vec![Capability::Utf8Accept]))
        );
        let response = ResponseParser::parse(b"* ENABLED\r\n").unwrap();
        assert_eq!(response, Response::Untagged(UntaggedResponse::Enabled(vec![])));
    }

    #[test]
    fn test_parse_message_data() {
        assert_eq!(
            ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Exists(23))
        );
        assert_eq!(
            ResponseParser::parse(b"* 1 EXPUNGE\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Expunge(SeqNum::new(1).unwrap()))
        );
        assert!(ResponseParser::parse(b"* 0 EXPUNGE\r\n").is_err());
    }

    #[test]
    fn test_parse_flags() {
        let input = b"* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n";
        let Response::Untagged(UntaggedResponse::Flags(flags)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected FLAGS");
        };
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Draft));
    }

    #[test]
    fn test_parse_permanent_flags_wildcard() {
        let input = b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n";
        let Response::Untagged(UntaggedResponse::Ok { code, .. }) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected OK");
        };
        assert_eq!(
            code,
            Some(ResponseCode::PermanentFlags(vec![
                Flag::Deleted,
                Flag::Seen,
                Flag::Wildcard
            ]))
        );
    }

    #[test]
    fn test_parse_list() {
        let input = b"* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Mail\"\r\n";
        let Response::Untagged(UntaggedResponse::List(list)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected LIST");
        };
        assert!(list.attributes.contains(&MailboxAttribute::HasNoChildren));
        assert!(list.attributes.contains(&MailboxAttribute::Sent));
        assert_eq!(list.delimiter, Some('/'));
        assert_eq!(list.mailbox.as_str(), "Sent Mail");

        let input = b"* LIST () \"/\" Caf&AOg- (\"CHILDINFO\" (\"SUBSCRIBED\"))\r\n";
        let Response::Untagged(UntaggedResponse::List(list)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected LIST");
        };
        assert_eq!(list.mailbox.as_str(), "Cafè");
    }

    #[test]
    fn test_parse_list_utf8() {
        let input = "* LIST () \"/\" \"Cafè\"\r\n".as_bytes();
        let Response::Untagged(UntaggedResponse::List(list)) =
            ResponseParser::parse_with(input, true).unwrap()
        else {
            panic!("Expected LIST");
        };
        assert_eq!(list.mailbox.as_str(), "Cafè");
    }

    #[test]
    fn test_parse_status() {
        let input = b"* STATUS INBOX (MESSAGES 1 UIDNEXT 2 UIDVALIDITY 1 UNSEEN 1 SIZE 440)\r\n";
        let Response::Untagged(UntaggedResponse::MailboxStatus(status)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected STATUS");
        };
        assert!(status.mailbox.is_inbox());
        assert_eq!(status.messages, Some(1));
        assert_eq!(status.uid_next, Uid::new(2));
        assert_eq!(status.unseen, Some(1));
        assert_eq!(status.size, Some(440));
        assert_eq!(status.deleted, None);
    }

    #[test]
    fn test_parse_continuation() {
        let input = b"+ Ready for literal\r\n";
        assert_eq!(
            ResponseParser::parse(input).unwrap(),
            Response::Continuation {
                text: Some("Ready for literal".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn test_parse_response_code() {
        let input = b"* OK [UIDVALIDITY 1234567890] UIDs valid\r\n";
        let Response::Untagged(UntaggedResponse::Ok { code, text }) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected untagged OK");
        };
        assert_eq!(
            code,
            Some(ResponseCode::UidValidity(UidValidity::new(1_234_567_890).unwrap()))
        );
        assert_eq!(text, "UIDs valid");
    }

    #[test]
    fn test_parse_fetch() {
        let input = b"* 1 FETCH (FLAGS (\\Seen) UID 12345)\r\n";
        let Response::Untagged(UntaggedResponse::Fetch(msg)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected FETCH");
        };
        assert_eq!(msg.seq.get(), 1);
        assert_eq!(msg.uid(), Uid::new(12345));
        assert!(msg.flags().unwrap().is_seen());
    }

    #[test]
    fn test_parse_search() {
        let input = b"* SEARCH 1 2 3 5 8 13\r\n";
        assert_eq!(
            ResponseParser::parse(input).unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![1, 2, 3, 5, 8, 13]))
        );
        assert_eq!(
            ResponseParser::parse(b"* SEARCH\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Search(vec![]))
        );
    }

    #[test]
    fn test_parse_esearch() {
        let input = b"* ESEARCH (TAG \"A282\") UID MIN 2 MAX 47 COUNT 3 ALL 2,10:11,47\r\n";
        let Response::Untagged(UntaggedResponse::Esearch { tag, data }) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected ESEARCH");
        };
        assert_eq!(tag, Some(Tag::new("A282")));
        assert!(data.uid);
        assert_eq!(data.min, Some(2));
        assert_eq!(data.max, Some(47));
        assert_eq!(data.count, Some(3));
        assert_eq!(data.numbers(), vec![2, 10, 11, 47]);

        let Response::Untagged(UntaggedResponse::Esearch { tag, data }) =
            ResponseParser::parse(b"* ESEARCH\r\n").unwrap()
        else {
            panic!("Expected ESEARCH");
        };
        assert!(tag.is_none());
        assert!(data.count.is_none());

        let Response::Untagged(UntaggedResponse::Esearch { data, .. }) =
            ResponseParser::parse(b"* ESEARCH ALL 1:4294967295\r\n").unwrap()
        else {
            panic!("Expected ESEARCH");
        };
        assert!(data.numbers().is_empty());
        assert!(data.all.contains(4_000_000_000, 0));
    }

    #[test]
    fn test_parse_oversized_literal() {
        let input = b"* 1 FETCH (BODY[] {18446744073709551615}\r\n)\r\n";
        assert!(ResponseParser::parse(input).is_err());
    }

    #[test]
    fn test_parse_acl_and_myrights() {
        let input = b"* ACL MyFolder test-user ailw anyone lr\r\n";
        let Response::Untagged(UntaggedResponse::Acl(acl)) =
            ResponseParser::parse(input).unwrap()
        else {
            panic!("Expected ACL");
        };
        assert_eq!(acl.mailbox.as_str(), "MyFolder");
        assert_eq!(acl.rights("test-user"), Some(&RightSet::from("ailw")));
        assert_eq!(acl.rights("anyone"), Some(&RightSet::from("rl")));

        let input = b"* MYRIGHTS INBOX akxeilprwtscd\r\n";
        assert_eq!(
            ResponseParser::parse(input).unwrap(),
            Response::Untagged(UntaggedResponse::MyRights {
                mailbox: crate::types::Mailbox::inbox(),
                rights: RightSet::from("akxeilprwtscd"),
            })
        );
    }

    #[test]
    fn test_parse_bye_and_errors() {
        assert_eq!(
            ResponseParser::parse(b"* BYE Server shutting down\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Bye {
                code: None,
                text: "Server shutting down".into()
            })
        );
        assert!(ResponseParser::parse(b"* FOO bar\r\n").is_err());
        assert!(ResponseParser::parse(b"(oops)\r\n").is_err());
        assert!(ResponseParser::parse(b"A1 MAYBE\r\n").is_err());
    }
}
