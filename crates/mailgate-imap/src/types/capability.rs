//! Server capabilities and response status.

/// Response status from a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }

    /// Returns the wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        }
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// ACL extension (RFC 4314)
    Acl,
    /// ESEARCH extension (RFC 4731)
    Esearch,
    /// UNSELECT command (RFC 3691)
    Unselect,
    /// SASL initial response (RFC 4959)
    SaslIr,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// LITERAL- extension (RFC 7888)
    LiteralMinus,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// AUTH mechanism
    Auth(String),
    /// ENABLE command (RFC 5161)
    Enable,
    /// UTF8=ACCEPT (RFC 6855)
    Utf8Accept,
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// LIST-STATUS (RFC 5819)
    ListStatus,
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "ACL" => Self::Acl,
            "ESEARCH" => Self::Esearch,
            "UNSELECT" => Self::Unselect,
            "SASL-IR" => Self::SaslIr,
            "LITERAL+" => Self::LiteralPlus,
            "LITERAL-" => Self::LiteralMinus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "ENABLE" => Self::Enable,
            "UTF8=ACCEPT" => Self::Utf8Accept,
            "SPECIAL-USE" => Self::SpecialUse,
            "LIST-STATUS" => Self::ListStatus,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns true if the capability may be requested with ENABLE.
    #[must_use]
    pub const fn is_enableable(&self) -> bool {
        matches!(self, Self::Imap4Rev2 | Self::Utf8Accept)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Idle => write!(f, "IDLE"),
            Self::Acl => write!(f, "ACL"),
            Self::Esearch => write!(f, "ESEARCH"),
            Self::Unselect => write!(f, "UNSELECT"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::LiteralMinus => write!(f, "LITERAL-"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Enable => write!(f, "ENABLE"),
            Self::Utf8Accept => write!(f, "UTF8=ACCEPT"),
            Self::SpecialUse => write!(f, "SPECIAL-USE"),
            Self::ListStatus => write!(f, "LIST-STATUS"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// A set of capabilities with IMAP4rev2 implications applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    /// Creates a set from a list, dropping duplicates.
    #[must_use]
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        let mut set = Self::default();
        for cap in caps {
            set.insert(cap);
        }
        set
    }

    /// Inserts a capability if not yet present.
    pub fn insert(&mut self, cap: Capability) {
        if !self.0.contains(&cap) {
            self.0.push(cap);
        }
    }

    /// Returns true if the capability is present or implied.
    ///
    /// `IMAP4rev2` implies ENABLE, IDLE, ESEARCH, UNSELECT, SASL-IR,
    /// LITERAL- and LIST-STATUS.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        if self.0.contains(cap) {
            return true;
        }
        self.0.contains(&Capability::Imap4Rev2)
            && matches!(
                cap,
                Capability::Enable
                    | Capability::Idle
                    | Capability::Esearch
                    | Capability::Unselect
                    | Capability::SaslIr
                    | Capability::LiteralMinus
                    | Capability::ListStatus
            )
    }

    /// Returns true if the AUTH mechanism is advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Iterates the explicit capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Returns true if no capability is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Capability>> for CapabilitySet {
    fn from(caps: Vec<Capability>) -> Self {
        Self::new(caps)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(Status::PreAuth.is_ok());
        assert!(!Status::No.is_ok());
        assert!(!Status::Bad.is_ok());
        assert!(!Status::Bye.is_ok());
        assert_eq!(Status::Bad.as_str(), "BAD");
    }

    #[test]
    fn parse_case_insensitive() {
        assert_eq!(Capability::parse("imap4rev2"), Capability::Imap4Rev2);
        assert_eq!(Capability::parse("Acl"), Capability::Acl);
        assert_eq!(Capability::parse("utf8=accept"), Capability::Utf8Accept);
        assert_eq!(
            Capability::parse("auth=plain"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("X-CUSTOM"),
            Capability::Unknown("X-CUSTOM".to_string())
        );
    }

    #[test]
    fn display_round_trip() {
        for cap in [
            Capability::Imap4Rev1,
            Capability::Imap4Rev2,
            Capability::Acl,
            Capability::Esearch,
            Capability::SaslIr,
            Capability::LiteralPlus,
            Capability::Utf8Accept,
            Capability::Auth("PLAIN".into()),
        ] {
            assert_eq!(Capability::parse(&cap.to_string()), cap);
        }
    }

    #[test]
    fn enableable() {
        assert!(Capability::Imap4Rev2.is_enableable());
        assert!(Capability::Utf8Accept.is_enableable());
        assert!(!Capability::Acl.is_enableable());
        assert!(!Capability::Unknown("CONDSTORE".into()).is_enableable());
    }

    #[test]
    fn rev2_implies_extensions() {
        let set = CapabilitySet::new([Capability::Imap4Rev2, Capability::Imap4Rev2]);
        assert_eq!(set.iter().count(), 1);
        assert!(set.has(&Capability::Esearch));
        assert!(set.has(&Capability::Idle));
        assert!(!set.has(&Capability::Acl));

        let rev1 = CapabilitySet::new([Capability::Imap4Rev1, Capability::Auth("PLAIN".into())]);
        assert!(!rev1.has(&Capability::Esearch));
        assert!(rev1.has_auth("plain"));
        assert!(!rev1.has_auth("LOGIN"));
    }
}
