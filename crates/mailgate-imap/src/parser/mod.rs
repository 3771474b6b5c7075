//! IMAP protocol parser.
//!
//! Sans-I/O parsers for both directions of the protocol: server responses
//! (used by the client) and client commands (used by the server). Both
//! work on one complete framed line with any literal data inline.
//!
//! # Architecture
//!
//! - **Lexer**: Tokenizes raw bytes into IMAP tokens (atoms, strings, numbers, etc.)
//! - **Response Parser**: Builds structured response objects from tokens
//! - **Command Parser**: Builds tagged [`crate::Command`] values
//!
//! # Example
//!
//! ```
//! use mailgate_imap::parser::{ResponseParser, Response, UntaggedResponse};
//!
//! let input = b"* OK IMAP4rev2 server ready\r\n";
//! let response = ResponseParser::parse(input).unwrap();
//!
//! match response {
//!     Response::Untagged(UntaggedResponse::Ok { text, .. }) => {
//!         assert!(text.contains("IMAP4rev2"));
//!     }
//!     _ => panic!("Expected untagged OK"),
//! }
//! ```

mod command;
pub(crate) mod helpers;
pub mod lexer;
pub mod response;

pub use command::CommandParser;
pub(crate) use command::decode_sasl;
pub use lexer::{Lexer, Token};
pub use response::{
    AclData, FetchItem, FetchMessage, Response, ResponseParser, SearchData, UntaggedResponse,
};
