//! Response codes.

use super::{Capability, Flag, Uid, UidValidity};

/// Response code carried in brackets by status responses.
///
/// These provide additional information about command completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// PARSE: Error parsing message.
    Parse,
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(UidValidity),
    /// CLOSED: the previously selected mailbox was closed.
    Closed,
    /// AUTHENTICATIONFAILED (RFC 5530).
    AuthenticationFailed,
    /// PRIVACYREQUIRED: operation needs a protected connection.
    PrivacyRequired,
    /// NONEXISTENT: mailbox does not exist.
    NonExistent,
    /// ALREADYEXISTS: mailbox already exists.
    AlreadyExists,
    /// NOPERM: access control forbids the operation.
    NoPerm,
    /// CANNOT: operation can never succeed.
    Cannot,
    /// SERVERBUG: server-side failure.
    ServerBug,
    /// CLIENTBUG: client misbehaved but the command was processed.
    ClientBug,
    /// EXPUNGEISSUED: messages were expunged by another session.
    ExpungeIssued,
    /// Unknown response code.
    Unknown(String),
}

impl ResponseCode {
    /// Parses an argument-less response code atom.
    #[must_use]
    pub fn from_atom(atom: &str) -> Self {
        match atom.to_uppercase().as_str() {
            "ALERT" => Self::Alert,
            "PARSE" => Self::Parse,
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            "CLOSED" => Self::Closed,
            "AUTHENTICATIONFAILED" => Self::AuthenticationFailed,
            "PRIVACYREQUIRED" => Self::PrivacyRequired,
            "NONEXISTENT" => Self::NonExistent,
            "ALREADYEXISTS" => Self::AlreadyExists,
            "NOPERM" => Self::NoPerm,
            "CANNOT" => Self::Cannot,
            "SERVERBUG" => Self::ServerBug,
            "CLIENTBUG" => Self::ClientBug,
            "EXPUNGEISSUED" => Self::ExpungeIssued,
            _ => Self::Unknown(atom.to_string()),
        }
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alert => f.write_str("ALERT"),
            Self::Capability(caps) => {
                f.write_str("CAPABILITY")?;
                for cap in caps {
                    write!(f, " {cap}")?;
                }
                Ok(())
            }
            Self::Parse => f.write_str("PARSE"),
            Self::PermanentFlags(flags) => {
                let flags: Vec<_> = flags.iter().map(Flag::as_str).collect();
                write!(f, "PERMANENTFLAGS ({})", flags.join(" "))
            }
            Self::ReadOnly => f.write_str("READ-ONLY"),
            Self::ReadWrite => f.write_str("READ-WRITE"),
            Self::TryCreate => f.write_str("TRYCREATE"),
            Self::UidNext(uid) => write!(f, "UIDNEXT {uid}"),
            Self::UidValidity(v) => write!(f, "UIDVALIDITY {v}"),
            Self::Closed => f.write_str("CLOSED"),
            Self::AuthenticationFailed => f.write_str("AUTHENTICATIONFAILED"),
            Self::PrivacyRequired => f.write_str("PRIVACYREQUIRED"),
            Self::NonExistent => f.write_str("NONEXISTENT"),
            Self::AlreadyExists => f.write_str("ALREADYEXISTS"),
            Self::NoPerm => f.write_str("NOPERM"),
            Self::Cannot => f.write_str("CANNOT"),
            Self::ServerBug => f.write_str("SERVERBUG"),
            Self::ClientBug => f.write_str("CLIENTBUG"),
            Self::ExpungeIssued => f.write_str("EXPUNGEISSUED"),
            Self::Unknown(s) => f.write_str(s),
        }
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
    fn atoms_round_trip() {
        for code in [
            ResponseCode::Alert,
            ResponseCode::ReadOnly,
            ResponseCode::TryCreate,
            ResponseCode::NonExistent,
            ResponseCode::AlreadyExists,
            ResponseCode::AuthenticationFailed,
            ResponseCode::PrivacyRequired,
            ResponseCode::Closed,
        ] {
            assert_eq!(ResponseCode::from_atom(&code.to_string()), code);
        }
        assert_eq!(
            ResponseCode::from_atom("X-FOO"),
            ResponseCode::Unknown("X-FOO".into())
        );
    }

    #[test]
    fn display_with_arguments() {
        let code = ResponseCode::PermanentFlags(vec![Flag::Seen, Flag::Wildcard]);
        assert_eq!(code.to_string(), "PERMANENTFLAGS (\\Seen \\*)");

        let code = ResponseCode::Capability(vec![Capability::Imap4Rev2, Capability::Acl]);
        assert_eq!(code.to_string(), "CAPABILITY IMAP4rev2 ACL");

        let code = ResponseCode::UidNext(Uid::new(42).unwrap());
        assert_eq!(code.to_string(), "UIDNEXT 42");
    }
}
