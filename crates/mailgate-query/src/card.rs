//! Minimal vCard model used by address-book filtering.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FilterError, Result};

/// `VERSION` property name.
pub const FIELD_VERSION: &str = "VERSION";
/// `UID` property name.
pub const FIELD_UID: &str = "UID";
/// `FN` property name.
pub const FIELD_FORMATTED_NAME: &str = "FN";
/// `N` property name.
pub const FIELD_NAME: &str = "N";
/// `EMAIL` property name.
pub const FIELD_EMAIL: &str = "EMAIL";

/// One property occurrence within a card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    /// Property value, unescaped.
    pub value: String,
    /// Parameters keyed by upper-cased name.
    pub params: BTreeMap<String, Vec<String>>,
    /// Optional property group.
    pub group: Option<String>,
}

impl Field {
    /// Creates a field with no parameters.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// A contact card: property name to its occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Card {
    fields: BTreeMap<String, Vec<Field>>,
}

impl Card {
    /// Creates an empty card.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an occurrence of a property.
    pub fn add(&mut self, name: &str, field: Field) {
        self.fields
            .entry(name.to_ascii_uppercase())
            .or_default()
            .push(field);
    }

    /// Returns the first occurrence of a property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields(name).first()
    }

    /// Returns every occurrence of a property.
    #[must_use]
    pub fn fields(&self, name: &str) -> &[Field] {
        self.fields
            .get(&name.to_ascii_uppercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Returns the first value of a property.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|f| f.value.as_str())
    }

    /// Returns true if the card carries the property.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        !self.fields(name).is_empty()
    }

    /// Returns true if the card has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Field])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns a copy keeping only the named properties.
    #[must_use]
    pub fn project<'a, I>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = BTreeMap::new();
        for name in names {
            let key = name.to_ascii_uppercase();
            if let Some(values) = self.fields.get(&key) {
                fields.insert(key, values.clone());
            }
        }
        Self { fields }
    }

    /// Decodes a single vCard from text.
    ///
    /// Folded lines are joined, `BEGIN:VCARD`/`END:VCARD` delimiters are
    /// required and not stored.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidCard`] when the delimiters are missing
    /// or a content line has no `:` separator.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines: Vec<String> = Vec::new();
        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(rest) = line.strip_prefix([' ', '\t'])
                && let Some(last) = lines.last_mut()
            {
                last.push_str(rest);
                continue;
            }
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        let mut iter = lines.iter();
        match iter.next() {
            Some(first) if first.eq_ignore_ascii_case("BEGIN:VCARD") => {}
            _ => return Err(FilterError::InvalidCard("missing BEGIN:VCARD".into())),
        }

        let mut card = Self::new();
        let mut ended = false;
        for line in iter {
            if line.eq_ignore_ascii_case("END:VCARD") {
                ended = true;
                break;
            }
            let (name, field) = parse_content_line(line)?;
            card.add(&name, field);
        }

        if !ended {
            return Err(FilterError::InvalidCard("missing END:VCARD".into()));
        }
        Ok(card)
    }
}

fn parse_content_line(line: &str) -> Result<(String, Field)> {
    let (head, value) = split_unquoted(line, ':')
        .ok_or_else(|| FilterError::InvalidCard(format!("no value separator in {line:?}")))?;

    let mut parts = head.split(';');
    let mut name = parts.next().unwrap_or_default().to_string();
    let mut group = None;
    if let Some((g, n)) = name.split_once('.') {
        group = Some(g.to_string());
        name = n.to_string();
    }
    if name.is_empty() {
        return Err(FilterError::InvalidCard(format!("empty property name in {line:?}")));
    }

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for param in parts {
        let (key, values) = param.split_once('=').unwrap_or(("TYPE", param));
        let entry = params.entry(key.to_ascii_uppercase()).or_default();
        entry.extend(values.split(',').map(|v| v.trim_matches('"').to_string()));
    }

    Ok((
        name.to_ascii_uppercase(),
        Field {
            value: unescape(value),
            params,
            group,
        },
    ))
}

// Finds the first separator outside double quotes.
fn split_unquoted(line: &str, sep: char) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c == sep && !quoted => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(',') => out.push(','),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BEGIN:VCARD\r\n")?;
        // VERSION must come first.
        let ordered = self
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() == FIELD_VERSION)
            .chain(self.fields.iter().filter(|(k, _)| k.as_str() != FIELD_VERSION));
        for (name, values) in ordered {
            for field in values {
                if let Some(group) = &field.group {
                    write!(f, "{group}.")?;
                }
                f.write_str(name)?;
                for (key, vals) in &field.params {
                    write!(f, ";{key}={}", vals.join(","))?;
                }
                write!(f, ":{}\r\n", escape(&field.value))?;
            }
        }
        f.write_str("END:VCARD\r\n")
    }
}

/// A stored address object: its resource path plus the decoded card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressObject {
    /// Resource path within the address book.
    pub path: String,
    /// Decoded card.
    pub card: Card,
}

impl AddressObject {
    /// Creates an address object.
    #[must_use]
    pub fn new(path: impl Into<String>, card: Card) -> Self {
        Self {
            path: path.into(),
            card,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALICE: &str = "BEGIN:VCARD\n\
VERSION:4.0\n\
UID:urn:uuid:4fbe8971-0bc3-424c-9c26-36c3e1eff6b1\n\
FN;PID=1.1:Alice Gopher\n\
N:Gopher;Alice;;;\n\
EMAIL;PID=1.1:alice@example.com\n\
END:VCARD";

    #[test]
    fn test_parse_card() {
        let card = Card::parse(ALICE).unwrap();
        assert_eq!(card.value(FIELD_VERSION), Some("4.0"));
        assert_eq!(card.value("fn"), Some("Alice Gopher"));
        assert_eq!(card.value(FIELD_NAME), Some("Gopher;Alice;;;"));
        let email = card.get(FIELD_EMAIL).unwrap();
        assert_eq!(email.params.get("PID").unwrap(), &vec!["1.1".to_string()]);
        assert!(!card.contains("TEL"));
    }

    #[test]
    fn test_parse_folded_and_grouped() {
        let text = "BEGIN:VCARD\r\nVERSION:4.0\r\nitem1.NOTE:first line\r\n  continued\\nnext\r\nEND:VCARD\r\n";
        let card = Card::parse(text).unwrap();
        let note = card.get("NOTE").unwrap();
        assert_eq!(note.group.as_deref(), Some("item1"));
        assert_eq!(note.value, "first line continued\nnext");
    }

    #[test]
    fn test_parse_rejects_missing_delimiters() {
        assert!(matches!(
            Card::parse("VERSION:4.0\nEND:VCARD"),
            Err(FilterError::InvalidCard(_))
        ));
        assert!(matches!(
            Card::parse("BEGIN:VCARD\nVERSION:4.0"),
            Err(FilterError::InvalidCard(_))
        ));
        assert!(Card::parse("BEGIN:VCARD\nnovalue\nEND:VCARD").is_err());
    }

    #[test]
    fn test_project_and_display() {
        let card = Card::parse(ALICE).unwrap();
        let projected = card.project([FIELD_UID, FIELD_VERSION, "X-MISSING"]);
        assert_eq!(projected.iter().count(), 2);

        let text = projected.to_string();
        assert!(text.starts_with("BEGIN:VCARD\r\nVERSION:4.0\r\n"));
        assert_eq!(Card::parse(&text).unwrap(), projected);
    }

    #[test]
    fn test_multiple_occurrences() {
        let card = Card::parse(
            "BEGIN:VCARD\nEMAIL:a@example.com\nEMAIL:b@example.org\nEND:VCARD",
        )
        .unwrap();
        assert_eq!(card.fields(FIELD_EMAIL).len(), 2);
        assert_eq!(card.value(FIELD_EMAIL), Some("a@example.com"));
    }
}
