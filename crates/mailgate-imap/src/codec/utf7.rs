//! Modified UTF-7 mailbox names (RFC 3501 Section 5.1.3).
//!
//! Printable ASCII other than `&` is sent as-is; `&` becomes `&-`; every
//! other run of characters is UTF-16BE, base64 encoded with `,` in place of
//! `/`, wrapped in `&` ... `-`.

use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, general_purpose};

use crate::error::{Error, Result};

const MUTF7: GeneralPurpose = GeneralPurpose::new(&alphabet::IMAP_MUTF7, general_purpose::NO_PAD);

const fn is_direct(c: char) -> bool {
    matches!(c, '\x20'..='\x7e') && c != '&'
}

/// Encodes a UTF-8 mailbox name.
#[must_use]
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u16> = Vec::new();

    for c in name.chars() {
        if is_direct(c) || c == '&' {
            flush(&mut out, &mut pending);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut buf = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut pending);
    out
}

fn flush(out: &mut String, pending: &mut Vec<u16>) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
    out.push('&');
    out.push_str(&MUTF7.encode(bytes));
    out.push('-');
    pending.clear();
}

/// Decodes a modified UTF-7 mailbox name.
///
/// # Errors
///
/// Returns a parse error for 8-bit input, unterminated shifts, bad base64 or
/// unpaired UTF-16 surrogates.
pub fn decode(name: &str) -> Result<String> {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(idx) = rest.find(|c: char| !is_direct(c)) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if !tail.starts_with('&') {
            return Err(Error::parse(
                name.len() - tail.len(),
                "non-ASCII character in modified UTF-7 name",
            ));
        }
        let end = tail
            .find('-')
            .ok_or_else(|| Error::parse(name.len() - tail.len(), "unterminated UTF-7 shift"))?;
        let encoded = &tail[1..end];
        if encoded.is_empty() {
            out.push('&');
        } else {
            out.push_str(&decode_run(encoded)?);
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_run(encoded: &str) -> Result<String> {
    let bytes = MUTF7
        .decode(encoded)
        .map_err(|e| Error::parse(0, format!("invalid UTF-7 base64: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(Error::parse(0, "odd UTF-16 byte count in UTF-7 name"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::parse(0, "invalid UTF-16 in UTF-7 name"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_known_values() {
        assert_eq!(encode("INBOX"), "INBOX");
        assert_eq!(encode("Lost & Found"), "Lost &- Found");
        assert_eq!(encode("Cafè"), "Caf&AOg-");
        assert_eq!(encode("☺!"), "&Jjo-!");
        assert_eq!(encode("台北日本語"), "&U,BTF2XlZyyKng-");
        assert_eq!(
            encode("~peter/mail/台北/日本語"),
            "~peter/mail/&U,BTFw-/&ZeVnLIqe-"
        );
    }

    #[test]
    fn decode_known_values() {
        assert_eq!(decode("Angus &- Julia").unwrap(), "Angus & Julia");
        assert_eq!(decode("Caf&AOg-").unwrap(), "Cafè");
        assert_eq!(
            decode("~peter/mail/&U,BTFw-/&ZeVnLIqe-").unwrap(),
            "~peter/mail/台北/日本語"
        );
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(decode("&U,BTFw").is_err());
        assert!(decode("Café").is_err());
        assert!(decode("&A-").is_err());
        assert!(decode("&2AA-").is_err());
    }

    proptest! {
        #[test]
        fn encoding_is_reversible(s in ".*") {
            prop_assert_eq!(decode(&encode(&s)).unwrap(), s);
        }
    }
}
