//! # mailgate-query
//!
//! Text-match and property-filter algebra.
//!
//! The same [`TextMatch`] clauses drive two consumers:
//!
//! - **Address-book queries**: [`AddressBookQuery`] evaluates property
//!   filters against vCard-style [`Card`]s with limits and projection.
//! - **Mailbox search**: the IMAP server evaluates `SUBJECT`, `BODY`,
//!   `HEADER` and friends as case-insensitive `contains` clauses.
//!
//! ## Example
//!
//! ```
//! use mailgate_query::{AddressBookQuery, AddressObject, Card, PropFilter, TextMatch, filter};
//!
//! let card = Card::parse("BEGIN:VCARD\nVERSION:4.0\nEMAIL:alice@example.com\nEND:VCARD")?;
//! let objects = vec![AddressObject::new("/alice.vcf", card)];
//!
//! let query = AddressBookQuery {
//!     prop_filters: vec![PropFilter::new("EMAIL", TextMatch::contains("ALICE"))],
//!     ..AddressBookQuery::default()
//! };
//! assert_eq!(filter(Some(&query), &objects).len(), 1);
//! # Ok::<(), mailgate_query::FilterError>(())
//! ```

pub mod card;
pub mod error;
pub mod query;
pub mod text;

pub use card::{AddressObject, Card, Field};
pub use error::{FilterError, Result};
pub use query::{AddressBookQuery, AddressDataRequest, PropFilter, filter, matches};
pub use text::{Collation, FilterTest, MatchType, TextMatch};
