//! IMAP wire encoding.
//!
//! The decoding half lives in [`crate::parser`]; this module holds the
//! encoder shared by command and response serialization, plus the modified
//! UTF-7 mailbox name transform.

mod encoder;
pub mod utf7;

pub use encoder::{Encoded, Encoder, LiteralMode};
