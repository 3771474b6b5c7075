//! Command serialization helpers.

use crate::codec::Encoder;
use crate::types::{Flag, datetime};

use super::types::{
    BodySection, FetchAttribute, FetchItems, SearchCriteria, SearchReturn, SectionSpecifier,
    StoreAction,
};

/// Writes a parenthesized flag list.
pub fn write_flags(enc: &mut Encoder, flags: &[Flag]) {
    enc.list(flags, |e, flag| {
        e.atom(flag.as_str());
    });
}

/// Writes FETCH items.
pub fn write_fetch_items(enc: &mut Encoder, items: &FetchItems) {
    match items {
        FetchItems::Fast => {
            enc.atom("FAST");
        }
        FetchItems::Items(attrs) if attrs.len() == 1 => write_fetch_attribute(enc, &attrs[0]),
        FetchItems::Items(attrs) => {
            enc.list(attrs, write_fetch_attribute);
        }
    }
}

/// Writes a single FETCH attribute.
pub fn write_fetch_attribute(enc: &mut Encoder, attr: &FetchAttribute) {
    let name = match attr {
        FetchAttribute::Flags => "FLAGS",
        FetchAttribute::InternalDate => "INTERNALDATE",
        FetchAttribute::Rfc822Size => "RFC822.SIZE",
        FetchAttribute::Uid => "UID",
        FetchAttribute::Body {
            section,
            peek,
            partial,
        } => {
            enc.atom(if *peek { "BODY.PEEK" } else { "BODY" });
            write_section(enc, section);
            if let Some((origin, len)) = partial {
                enc.atom(&format!("<{origin}.{len}>"));
            }
            return;
        }
    };
    enc.atom(name);
}

/// Writes `[section]`, quoting header field names as needed.
pub fn write_section(enc: &mut Encoder, section: &BodySection) {
    enc.raw(b"[");
    let fields = match &section.specifier {
        SectionSpecifier::HeaderFields(fields) | SectionSpecifier::HeaderFieldsNot(fields) => {
            Some(fields)
        }
        _ => None,
    };
    match fields {
        None => {
            enc.atom(&section.to_string());
        }
        Some(fields) => {
            let prefix = BodySection {
                part: section.part.clone(),
                specifier: SectionSpecifier::Full,
            }
            .to_string();
            if !prefix.is_empty() {
                enc.atom(&prefix).raw(b".");
            }
            let name = match section.specifier {
                SectionSpecifier::HeaderFieldsNot(_) => "HEADER.FIELDS.NOT",
                _ => "HEADER.FIELDS",
            };
            enc.atom(name).sp().list(fields, |e, f| {
                e.astring(f);
            });
        }
    }
    enc.raw(b"]");
}

/// Writes a STORE action.
pub fn write_store_action(enc: &mut Encoder, action: &StoreAction, silent: bool) {
    enc.atom(action.item_name());
    if silent {
        enc.atom(".SILENT");
    }
    enc.sp();
    write_flags(enc, action.flags());
}

/// Writes `RETURN (...)`.
pub fn write_search_return(enc: &mut Encoder, returns: &[SearchReturn]) {
    enc.atom("RETURN ").list(returns, |e, r| {
        e.atom(r.as_str());
    });
}

/// Writes SEARCH criteria.
pub fn write_search_criteria(enc: &mut Encoder, criteria: &SearchCriteria) {
    write_criteria(enc, criteria, true);
}

fn write_criteria(enc: &mut Encoder, criteria: &SearchCriteria, top: bool) {
    let keyword = |enc: &mut Encoder, name: &str, arg: &str| {
        enc.atom(name).sp().astring(arg);
    };
    match criteria {
        SearchCriteria::All => {
            enc.atom("ALL");
        }
        SearchCriteria::Answered => {
            enc.atom("ANSWERED");
        }
        SearchCriteria::Deleted => {
            enc.atom("DELETED");
        }
        SearchCriteria::Draft => {
            enc.atom("DRAFT");
        }
        SearchCriteria::Flagged => {
            enc.atom("FLAGGED");
        }
        SearchCriteria::Seen => {
            enc.atom("SEEN");
        }
        SearchCriteria::Unanswered => {
            enc.atom("UNANSWERED");
        }
        SearchCriteria::Undeleted => {
            enc.atom("UNDELETED");
        }
        SearchCriteria::Undraft => {
            enc.atom("UNDRAFT");
        }
        SearchCriteria::Unflagged => {
            enc.atom("UNFLAGGED");
        }
        SearchCriteria::Unseen => {
            enc.atom("UNSEEN");
        }
        SearchCriteria::Keyword(k) => enc_atom_arg(enc, "KEYWORD", k),
        SearchCriteria::Unkeyword(k) => enc_atom_arg(enc, "UNKEYWORD", k),
        SearchCriteria::SequenceSet(set) => {
            enc.number(set);
        }
        SearchCriteria::Uid(set) => {
            enc.atom("UID ").number(set);
        }
        SearchCriteria::Subject(s) => keyword(enc, "SUBJECT", s),
        SearchCriteria::From(s) => keyword(enc, "FROM", s),
        SearchCriteria::To(s) => keyword(enc, "TO", s),
        SearchCriteria::Body(s) => keyword(enc, "BODY", s),
        SearchCriteria::Text(s) => keyword(enc, "TEXT", s),
        SearchCriteria::Since(d) => enc_atom_arg(enc, "SINCE", &datetime::format_date(*d)),
        SearchCriteria::Before(d) => enc_atom_arg(enc, "BEFORE", &datetime::format_date(*d)),
        SearchCriteria::On(d) => enc_atom_arg(enc, "ON", &datetime::format_date(*d)),
        SearchCriteria::Larger(n) => {
            enc.atom("LARGER ").number(n);
        }
        SearchCriteria::Smaller(n) => {
            enc.atom("SMALLER ").number(n);
        }
        SearchCriteria::Header(name, value) => {
            enc.atom("HEADER ").astring(name).sp().astring(value);
        }
        SearchCriteria::And(all) if all.is_empty() => {
            enc.atom("ALL");
        }
        SearchCriteria::And(all) if top || all.len() == 1 => {
            for (i, c) in all.iter().enumerate() {
                if i > 0 {
                    enc.sp();
                }
                write_criteria(enc, c, top);
            }
        }
        SearchCriteria::And(all) => {
            enc.list(all, |e, c| write_criteria(e, c, true));
        }
        SearchCriteria::Or(a, b) => {
            enc.atom("OR ");
            write_criteria(enc, a, false);
            enc.sp();
            write_criteria(enc, b, false);
        }
        SearchCriteria::Not(c) => {
            enc.atom("NOT ");
            write_criteria(enc, c, false);
        }
    }
}

fn enc_atom_arg(enc: &mut Encoder, name: &str, arg: &str) {
    enc.atom(name).sp().atom(arg);
}
