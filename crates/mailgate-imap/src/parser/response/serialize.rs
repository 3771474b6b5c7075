//! Response serialization, used by the server side.

use crate::codec::Encoder;
use crate::command::{write_flags, write_section};
use crate::types::{Capability, ResponseCode, StatusData, datetime};

use super::types::{FetchItem, FetchMessage, Response, SearchData, UntaggedResponse};

impl Response {
    /// Writes the response, including the trailing CRLF.
    pub fn serialize(&self, enc: &mut Encoder) {
        match self {
            Self::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                enc.atom(tag.as_str()).sp().atom(status.as_str());
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::Continuation { text } => {
                enc.raw(b"+ ");
                if let Some(text) = text {
                    enc.raw(text.as_bytes());
                }
                enc.crlf();
            }
            Self::Untagged(data) => data.serialize(enc),
        }
    }

    /// Encodes the response as a single buffer.
    #[must_use]
    pub fn to_bytes(&self, utf8: bool) -> Vec<u8> {
        let mut enc = Encoder::response().utf8(utf8);
        self.serialize(&mut enc);
        enc.into_bytes()
    }
}

impl UntaggedResponse {
    /// Writes `* ...` lines for this data. A LIST entry carrying STATUS
    /// data is followed by its STATUS line.
    pub fn serialize(&self, enc: &mut Encoder) {
        enc.raw(b"* ");
        match self {
            Self::Ok { code, text } => {
                enc.atom("OK");
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::No { code, text } => {
                enc.atom("NO");
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::Bad { code, text } => {
                enc.atom("BAD");
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::PreAuth { code, text } => {
                enc.atom("PREAUTH");
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::Bye { code, text } => {
                enc.atom("BYE");
                write_resp_text(enc, code.as_ref(), text);
            }
            Self::Capability(caps) => {
                enc.atom("CAPABILITY");
                write_capabilities(enc, caps);
                enc.crlf();
            }
            Self::Enabled(caps) => {
                enc.atom("ENABLED");
                write_capabilities(enc, caps);
                enc.crlf();
            }
            Self::List(list) => {
                enc.atom("LIST ").list(&list.attributes, |e, attr| {
                    e.atom(attr.as_str());
                });
                enc.sp();
                match list.delimiter {
                    Some(delim) => enc.quoted(delim.encode_utf8(&mut [0; 4])),
                    None => enc.atom("NIL"),
                };
                enc.sp().mailbox(list.mailbox.as_str()).crlf();
                if let Some(status) = &list.status {
                    enc.raw(b"* ");
                    write_status(enc, status);
                }
            }
            Self::MailboxStatus(status) => write_status(enc, status),
            Self::Flags(flags) => {
                enc.atom("FLAGS ");
                let flags: Vec<_> = flags.iter().cloned().collect();
                write_flags(enc, &flags);
                enc.crlf();
            }
            Self::Exists(n) => {
                enc.number(n).atom(" EXISTS").crlf();
            }
            Self::Recent(n) => {
                enc.number(n).atom(" RECENT").crlf();
            }
            Self::Expunge(seq) => {
                enc.number(seq).atom(" EXPUNGE").crlf();
            }
            Self::Fetch(msg) => write_fetch(enc, msg),
            Self::Search(nums) => {
                enc.atom("SEARCH");
                for n in nums {
                    enc.sp().number(n);
                }
                enc.crlf();
            }
            Self::Esearch { tag, data } => {
                enc.atom("ESEARCH");
                if let Some(tag) = tag {
                    enc.atom(" (TAG ").quoted(tag.as_str()).raw(b")");
                }
                write_search_data(enc, data);
                enc.crlf();
            }
            Self::Acl(acl) => {
                enc.atom("ACL ").mailbox(acl.mailbox.as_str());
                for (identifier, rights) in &acl.entries {
                    enc.sp().astring(identifier).sp().astring(&rights.to_string());
                }
                enc.crlf();
            }
            Self::MyRights { mailbox, rights } => {
                enc.atom("MYRIGHTS ")
                    .mailbox(mailbox.as_str())
                    .sp()
                    .astring(&rights.to_string())
                    .crlf();
            }
        }
    }
}

fn write_resp_text(enc: &mut Encoder, code: Option<&ResponseCode>, text: &str) {
    if let Some(code) = code {
        enc.raw(b" [").atom(&code.to_string()).raw(b"]");
    }
    if !text.is_empty() {
        enc.sp().raw(text.as_bytes());
    }
    enc.crlf();
}

fn write_capabilities(enc: &mut Encoder, caps: &[Capability]) {
    for cap in caps {
        enc.sp().atom(&cap.to_string());
    }
}

fn write_status(enc: &mut Encoder, status: &StatusData) {
    let items = [
        ("MESSAGES", status.messages.map(u64::from)),
        ("UIDNEXT", status.uid_next.map(|u| u64::from(u.get()))),
        ("UIDVALIDITY", status.uid_validity.map(|v| u64::from(v.get()))),
        ("UNSEEN", status.unseen.map(u64::from)),
        ("DELETED", status.deleted.map(u64::from)),
        ("SIZE", status.size),
        ("RECENT", status.recent.map(u64::from)),
    ];
    enc.atom("STATUS ").mailbox(status.mailbox.as_str()).sp();
    enc.list(
        items.iter().filter_map(|(name, v)| v.map(|v| (*name, v))),
        |e, (name, v)| {
            e.atom(name).sp().number(v);
        },
    );
    enc.crlf();
}

fn write_fetch(enc: &mut Encoder, msg: &FetchMessage) {
    enc.number(msg.seq).atom(" FETCH ");
    enc.list(&msg.items, |e, item| match item {
        FetchItem::Flags(flags) => {
            e.atom("FLAGS ");
            let flags: Vec<_> = flags.iter().cloned().collect();
            write_flags(e, &flags);
        }
        FetchItem::InternalDate(date) => {
            e.atom("INTERNALDATE ")
                .quoted(&datetime::format_date_time(date));
        }
        FetchItem::Rfc822Size(size) => {
            e.atom("RFC822.SIZE ").number(size);
        }
        FetchItem::Uid(uid) => {
            e.atom("UID ").number(uid);
        }
        FetchItem::Body {
            section,
            origin,
            data,
        } => {
            e.atom("BODY");
            write_section(e, section);
            if let Some(origin) = origin {
                e.atom(&format!("<{origin}>"));
            }
            e.sp();
            // Message data may hold any octet, so it always goes out as a literal
            match data {
                Some(data) => e.literal(data),
                None => e.atom("NIL"),
            };
        }
    });
    enc.crlf();
}

fn write_search_data(enc: &mut Encoder, data: &SearchData) {
    if data.uid {
        enc.atom(" UID");
    }
    if let Some(min) = data.min {
        enc.atom(" MIN ").number(min);
    }
    if let Some(max) = data.max {
        enc.atom(" MAX ").number(max);
    }
    if !data.all.is_empty() {
        enc.atom(" ALL ").atom(&data.all.to_string());
    }
    if let Some(count) = data.count {
        enc.atom(" COUNT ").number(count);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::command::{BodySection, SectionSpecifier};
    use crate::parser::response::{AclData, ResponseParser};
    use crate::types::{
        Flag, Flags, ListData, Mailbox, MailboxAttribute, RightSet, SeqNum, Status, Tag, Uid,
    };

    fn wire(response: &Response) -> String {
        String::from_utf8(response.to_bytes(false)).unwrap()
    }

    #[test]
    fn tagged_and_continuation() {
        let ok = Response::tagged(Tag::new("A1"), Status::Ok, None, "LOGIN completed");
        assert_eq!(wire(&ok), "A1 OK LOGIN completed\r\n");

        let no = Response::tagged(
            Tag::new("A2"),
            Status::No,
            Some(ResponseCode::NonExistent),
            "No such mailbox",
        );
        assert_eq!(wire(&no), "A2 NO [NONEXISTENT] No such mailbox\r\n");

        let cont = Response::Continuation {
            text: Some("idling".into()),
        };
        assert_eq!(wire(&cont), "+ idling\r\n");
    }

    #[test]
    fn list_with_status_emits_two_lines() {
        let list = UntaggedResponse::List(ListData {
            attributes: vec![MailboxAttribute::HasNoChildren],
            delimiter: Some('/'),
            mailbox: Mailbox::new("Cafè"),
            status: Some(StatusData {
                mailbox: Mailbox::new("Cafè"),
                messages: Some(1),
                ..StatusData::default()
            }),
        });
        assert_eq!(
            wire(&Response::Untagged(list)),
            "* LIST (\\HasNoChildren) \"/\" Caf&AOg-\r\n* STATUS Caf&AOg- (MESSAGES 1)\r\n"
        );
    }

    #[test]
    fn fetch_body_is_a_literal() {
        let msg = FetchMessage {
            seq: SeqNum::new(1).unwrap(),
            items: vec![
                FetchItem::Uid(Uid::new(7).unwrap()),
                FetchItem::Flags(Flags::from_vec(vec![Flag::Seen])),
                FetchItem::InternalDate(
                    DateTime::parse_from_rfc3339("1996-07-17T02:44:25-07:00").unwrap(),
                ),
                FetchItem::Body {
                    section: BodySection::of(SectionSpecifier::Text),
                    origin: None,
                    data: Some(b"Hi".to_vec()),
                },
            ],
        };
        let bytes = Response::Untagged(UntaggedResponse::Fetch(msg.clone())).to_bytes(false);
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            "* 1 FETCH (UID 7 FLAGS (\\Seen) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" BODY[TEXT] {2}\r\nHi)\r\n"
        );
        assert_eq!(
            ResponseParser::parse(&bytes).unwrap(),
            Response::Untagged(UntaggedResponse::Fetch(msg))
        );
    }

    #[test]
    fn esearch_and_acl() {
        let esearch = UntaggedResponse::Esearch {
            tag: Some(Tag::new("A5")),
            data: SearchData::from_matches(true, &[1, 2, 3, 9]),
        };
        assert_eq!(
            wire(&Response::Untagged(esearch)),
            "* ESEARCH (TAG \"A5\") UID MIN 1 MAX 9 ALL 1:3,9 COUNT 4\r\n"
        );

        let empty = UntaggedResponse::Esearch {
            tag: None,
            data: SearchData::from_matches(false, &[]),
        };
        assert_eq!(wire(&Response::Untagged(empty)), "* ESEARCH COUNT 0\r\n");

        let acl = UntaggedResponse::Acl(AclData {
            mailbox: Mailbox::new("Angus & Julia"),
            entries: vec![("test-user".into(), RightSet::from("ailw"))],
        });
        assert_eq!(
            wire(&Response::Untagged(acl)),
            "* ACL \"Angus &- Julia\" test-user ailw\r\n"
        );
    }

    #[test]
    fn utf8_mailbox_names_are_sent_verbatim() {
        let rights = Response::Untagged(UntaggedResponse::MyRights {
            mailbox: Mailbox::new("Cafè"),
            rights: RightSet::from("lr"),
        });
        assert_eq!(
            String::from_utf8(rights.to_bytes(true)).unwrap(),
            "* MYRIGHTS \"Cafè\" lr\r\n"
        );
    }
}
