//! SASL mechanisms for AUTHENTICATE.
//!
//! Payloads here are raw bytes; base64 framing on the wire is handled by the
//! client and the server dispatcher.

use crate::{Error, Result};

/// Client side of a SASL mechanism.
pub trait SaslClient: Send {
    /// Mechanism name as advertised in `AUTH=`.
    fn mechanism(&self) -> &str;

    /// Returns the initial response, if the mechanism has one.
    fn start(&mut self) -> Result<Option<Vec<u8>>>;

    /// Answers a server challenge.
    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// Verified identity produced by a server mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Requested authorization identity, when distinct from `username`.
    pub authzid: Option<String>,
    /// Authentication identity.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Outcome of one server-side SASL step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this challenge and wait for another response.
    Challenge(Vec<u8>),
    /// The exchange is complete; check these credentials.
    Done(Credentials),
}

/// Server side of a SASL mechanism.
pub trait SaslServer: Send {
    /// Processes a client response. `None` means the client sent no initial
    /// response.
    fn next(&mut self, response: Option<&[u8]>) -> Result<Step>;
}

/// PLAIN (RFC 4616) client.
#[derive(Debug, Clone)]
pub struct PlainClient {
    authzid: String,
    username: String,
    password: String,
}

impl PlainClient {
    /// Creates a PLAIN client with an empty authorization identity.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            authzid: String::new(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Sets the authorization identity.
    #[must_use]
    pub fn authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = authzid.into();
        self
    }

    fn message(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.authzid.len() + self.username.len() + 2);
        out.extend_from_slice(self.authzid.as_bytes());
        out.push(0);
        out.extend_from_slice(self.username.as_bytes());
        out.push(0);
        out.extend_from_slice(self.password.as_bytes());
        out
    }
}

impl SaslClient for PlainClient {
    fn mechanism(&self) -> &str {
        "PLAIN"
    }

    fn start(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.message()))
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        // Servers without SASL-IR send an empty challenge first
        if challenge.is_empty() {
            Ok(self.message())
        } else {
            Err(Error::Auth("unexpected PLAIN challenge".to_string()))
        }
    }
}

/// PLAIN (RFC 4616) server.
#[derive(Debug, Default)]
pub struct PlainServer {
    challenged: bool,
}

impl PlainServer {
    /// Creates a PLAIN server mechanism.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaslServer for PlainServer {
    fn next(&mut self, response: Option<&[u8]>) -> Result<Step> {
        let Some(response) = response else {
            if self.challenged {
                return Err(Error::Auth("expected PLAIN response".to_string()));
            }
            self.challenged = true;
            return Ok(Step::Challenge(Vec::new()));
        };

        let mut parts = response.split(|&b| b == 0);
        let (Some(authzid), Some(username), Some(password), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Auth("malformed PLAIN response".to_string()));
        };
        let text = |b: &[u8]| {
            String::from_utf8(b.to_vec())
                .map_err(|_| Error::Auth("PLAIN response is not UTF-8".to_string()))
        };
        let authzid = text(authzid)?;
        let username = text(username)?;
        if !authzid.is_empty() && authzid != username {
            return Err(Error::Auth("authorization identity mismatch".to_string()));
        }
        Ok(Step::Done(Credentials {
            authzid: (!authzid.is_empty()).then_some(authzid),
            username,
            password: text(password)?,
        }))
    }
}

/// Returns a server mechanism by name.
#[must_use]
pub fn server_mechanism(name: &str) -> Option<Box<dyn SaslServer>> {
    if name.eq_ignore_ascii_case("PLAIN") {
        Some(Box::new(PlainServer::new()))
    } else {
        None
    }
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

    #[test]
    fn plain_client_message() {
        let mut client = PlainClient::new("test-user", "test-password");
        assert_eq!(client.mechanism(), "PLAIN");
        assert_eq!(
            client.start().unwrap().unwrap(),
            b"\0test-user\0test-password".to_vec()
        );
        assert_eq!(client.next(b"").unwrap(), b"\0test-user\0test-password");
        assert!(client.next(b"more").is_err());
    }

    #[test]
    fn plain_server_with_initial_response() {
        let mut server = PlainServer::new();
        let step = server.next(Some(b"\0test-user\0test-password")).unwrap();
        assert_eq!(
            step,
            Step::Done(Credentials {
                authzid: None,
                username: "test-user".into(),
                password: "test-password".into(),
            })
        );
    }

    #[test]
    fn plain_server_challenges_once() {
        let mut server = PlainServer::new();
        assert_eq!(server.next(None).unwrap(), Step::Challenge(Vec::new()));
        assert!(server.next(None).is_err());

        let mut server = PlainServer::new();
        server.next(None).unwrap();
        assert!(matches!(
            server.next(Some(b"admin\0admin\0pw")).unwrap(),
            Step::Done(Credentials { authzid: Some(_), .. })
        ));
    }

    #[test]
    fn plain_server_rejects_malformed() {
        let mut server = PlainServer::new();
        assert!(server.next(Some(b"no separators")).is_err());
        assert!(server.next(Some(b"a\0b\0c\0d")).is_err());
        assert!(server.next(Some(b"other\0test-user\0pw")).is_err());
        assert!(server_mechanism("plain").is_some());
        assert!(server_mechanism("XOAUTH2").is_none());
    }
}
