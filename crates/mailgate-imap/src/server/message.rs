//! Raw message access for FETCH and SEARCH.
//!
//! Messages are opaque octets. Only the RFC 5322 header is looked at: it is
//! split from the body, and its fields are unfolded for matching. MIME
//! structure is not parsed, so part `1` of any message is its body.

use crate::command::{BodySection, SectionSpecifier};

/// Splits a message into header (including the blank separator line) and
/// body.
pub fn split(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        raw.split_at(pos + 4)
    } else if let Some(pos) = find(raw, b"\n\n") {
        raw.split_at(pos + 2)
    } else {
        (raw, &[])
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Returns each header field as its raw lines, folding included.
fn field_blocks(header: &[u8]) -> Vec<&[u8]> {
    let mut blocks: Vec<&[u8]> = Vec::new();
    let mut start = None;
    let mut pos = 0;
    while pos < header.len() {
        let end = header[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(header.len(), |i| pos + i + 1);
        let line = &header[pos..end];
        let blank = line.iter().all(|b| matches!(b, b'\r' | b'\n'));
        let folded = matches!(line.first(), Some(b' ' | b'\t'));
        if !folded {
            if let Some(s) = start.take() {
                blocks.push(&header[s..pos]);
            }
            if blank {
                return blocks;
            }
            start = Some(pos);
        }
        pos = end;
    }
    if let Some(s) = start {
        blocks.push(&header[s..]);
    }
    blocks
}

fn block_name(block: &[u8]) -> Option<&str> {
    let colon = block.iter().position(|&b| b == b':')?;
    std::str::from_utf8(&block[..colon]).ok().map(str::trim)
}

/// Returns the unfolded `(name, value)` pairs of a header.
pub fn header_fields(header: &[u8]) -> Vec<(String, String)> {
    field_blocks(header)
        .into_iter()
        .filter_map(|block| {
            let name = block_name(block)?.to_string();
            let colon = block.iter().position(|&b| b == b':')?;
            let value = String::from_utf8_lossy(&block[colon + 1..])
                .split(['\r', '\n'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Some((name, value))
        })
        .collect()
}

/// Returns the values of every field called `name`.
pub fn header_values(raw: &[u8], name: &str) -> Vec<String> {
    let (header, _) = split(raw);
    header_fields(header)
        .into_iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .collect()
}

fn filter_fields(header: &[u8], names: &[String], keep: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for block in field_blocks(header) {
        let listed = block_name(block)
            .is_some_and(|n| names.iter().any(|want| want.eq_ignore_ascii_case(n)));
        if listed == keep {
            out.extend_from_slice(block);
        }
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Extracts a body section. Returns `None` for sections the message does
/// not have.
pub fn section(raw: &[u8], section: &BodySection) -> Option<Vec<u8>> {
    let (header, body) = split(raw);
    match (section.part.as_slice(), &section.specifier) {
        ([], SectionSpecifier::Full) => Some(raw.to_vec()),
        ([], SectionSpecifier::Header) => Some(header.to_vec()),
        ([], SectionSpecifier::Text) | ([1], SectionSpecifier::Full) => Some(body.to_vec()),
        ([], SectionSpecifier::HeaderFields(names)) => Some(filter_fields(header, names, true)),
        ([], SectionSpecifier::HeaderFieldsNot(names)) => {
            Some(filter_fields(header, names, false))
        }
        _ => None,
    }
}

/// Applies a `<origin.length>` partial range.
pub fn partial(data: Vec<u8>, origin: u32, length: u32) -> Vec<u8> {
    let start = (origin as usize).min(data.len());
    let end = start.saturating_add(length as usize).min(data.len());
    data[start..end].to_vec()
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
    use super::*;

    const MESSAGE: &[u8] = b"MIME-Version: 1.0\r\n\
Message-Id: <191101702316132@example.com>\r\n\
Subject: Hello\r\n  world\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
This is my letter!";

    #[test]
    fn split_header_and_body() {
        let (header, body) = split(MESSAGE);
        assert!(header.ends_with(b"\r\n\r\n"));
        assert_eq!(body, b"This is my letter!");

        let (header, body) = split(b"Subject: x\n\nbody");
        assert_eq!(header, b"Subject: x\n\n");
        assert_eq!(body, b"body");

        let (header, body) = split(b"Subject: no body");
        assert_eq!(header, b"Subject: no body");
        assert!(body.is_empty());
    }

    #[test]
    fn folded_fields_are_unfolded() {
        assert_eq!(header_values(MESSAGE, "subject"), vec!["Hello world"]);
        assert_eq!(
            header_values(MESSAGE, "Message-ID"),
            vec!["<191101702316132@example.com>"]
        );
        assert!(header_values(MESSAGE, "From").is_empty());
    }

    #[test]
    fn sections() {
        assert_eq!(section(MESSAGE, &BodySection::full()).unwrap(), MESSAGE);
        assert_eq!(
            section(MESSAGE, &BodySection::of(SectionSpecifier::Text)).unwrap(),
            b"This is my letter!"
        );
        let part_one = BodySection {
            part: vec![1],
            specifier: SectionSpecifier::Full,
        };
        assert_eq!(section(MESSAGE, &part_one).unwrap(), b"This is my letter!");
        let part_two = BodySection {
            part: vec![2],
            specifier: SectionSpecifier::Full,
        };
        assert!(section(MESSAGE, &part_two).is_none());
    }

    #[test]
    fn header_field_sections() {
        let fields = BodySection::of(SectionSpecifier::HeaderFields(vec!["SUBJECT".into()]));
        assert_eq!(
            section(MESSAGE, &fields).unwrap(),
            b"Subject: Hello\r\n  world\r\n\r\n"
        );

        let rest = BodySection::of(SectionSpecifier::HeaderFieldsNot(vec![
            "Subject".into(),
            "Content-Type".into(),
            "MIME-Version".into(),
        ]));
        assert_eq!(
            section(MESSAGE, &rest).unwrap(),
            b"Message-Id: <191101702316132@example.com>\r\n\r\n"
        );
    }

    #[test]
    fn partial_ranges() {
        assert_eq!(partial(b"Hello".to_vec(), 1, 3), b"ell");
        assert_eq!(partial(b"Hello".to_vec(), 3, 100), b"lo");
        assert!(partial(b"Hello".to_vec(), 10, 2).is_empty());
    }
}
