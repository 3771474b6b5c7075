//! Connection states (RFC 9051 Section 3).

use std::fmt;

/// IMAP connection state.
///
/// ```text
///                    +--------------------------------------+
///                    |   connection established, greeting   |
///                    +--------------------------------------+
///                            ||   (1)           ||   (2)
///                            VV                 ||
///                  +-----------------+          ||
///                  |Not Authenticated|          ||
///                  +-----------------+          ||
///                   || (3)        || (4)        ||
///                   ||            VV            VV
///                   ||         +----------------+
///                   ||         | Authenticated  |<=++
///                   ||         +----------------+  ||
///                   ||           || (4)     || (5) || (6)
///                   ||           ||         VV     ||
///                   ||           ||     +--------+ ||
///                   ||           ||     |Selected|==++
///                   ||           ||     +--------+
///                   VV           VV         || (7)
///                  +--------------------------------+
///                  |             Logout             |
///                  +--------------------------------+
/// ```
///
/// States are ordered so a command's minimum state can be compared directly;
/// `Logout` is terminal and satisfies no minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnState {
    /// Before LOGIN or AUTHENTICATE.
    #[default]
    NotAuthenticated,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected,
    /// Connection is closing.
    Logout,
}

impl ConnState {
    /// Returns true if a command requiring `min` may run in this state.
    #[must_use]
    pub fn satisfies(self, min: Self) -> bool {
        self != Self::Logout && self >= min
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "not authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::Logout => "logout",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfies() {
        assert!(ConnState::Selected.satisfies(ConnState::Authenticated));
        assert!(ConnState::Authenticated.satisfies(ConnState::NotAuthenticated));
        assert!(!ConnState::NotAuthenticated.satisfies(ConnState::Selected));
        assert!(!ConnState::Logout.satisfies(ConnState::NotAuthenticated));
    }

    #[test]
    fn display() {
        assert_eq!(ConnState::NotAuthenticated.to_string(), "not authenticated");
        assert_eq!(ConnState::Selected.to_string(), "selected");
    }
}
