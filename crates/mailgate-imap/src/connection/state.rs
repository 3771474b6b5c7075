//! Per-connection protocol state.
//!
//! The command task and unilateral-update producers share one
//! [`ConnectionState`]. All fields sit behind a single mutex and are only
//! reachable through the atomic operations below.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{Capability, ConnState, Mailbox};
use crate::{Error, Result};

/// State information when a mailbox is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMailbox {
    /// Name of the selected mailbox.
    pub mailbox: Mailbox,
    /// Whether the mailbox is read-only (EXAMINE vs SELECT).
    pub read_only: bool,
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnState,
    enabled: Vec<Capability>,
    selected: Option<SelectedMailbox>,
}

/// Mutable connection state guarded by one lock.
#[derive(Debug, Default)]
pub struct ConnectionState {
    inner: Mutex<Inner>,
}

impl ConnectionState {
    /// Creates the state of a fresh connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the state of a connection that starts authenticated
    /// (PREAUTH greeting).
    #[must_use]
    pub fn preauth() -> Self {
        let state = Self::new();
        state.lock().state = ConnState::Authenticated;
        state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        self.lock().state
    }

    /// Fails unless the connection is at least in `min`.
    pub fn check_state(&self, min: ConnState) -> Result<()> {
        let current = self.state();
        if current.satisfies(min) {
            Ok(())
        } else {
            Err(Error::BadState {
                required: min,
                current,
            })
        }
    }

    /// Fails if the connection is past `state` (used by commands only valid
    /// before authentication).
    pub fn check_not_state(&self, state: ConnState) -> Result<()> {
        let current = self.state();
        if current > state {
            Err(Error::InvalidState(format!(
                "command not allowed in {current} state"
            )))
        } else {
            Ok(())
        }
    }

    /// NotAuthenticated to Authenticated.
    pub fn authenticated(&self) {
        let mut inner = self.lock();
        if inner.state == ConnState::NotAuthenticated {
            inner.state = ConnState::Authenticated;
            tracing::debug!("state: authenticated");
        }
    }

    /// Enters Selected. A previously selected mailbox is implicitly closed.
    pub fn selected(&self, mailbox: Mailbox, read_only: bool) {
        let mut inner = self.lock();
        if inner.state == ConnState::Logout {
            return;
        }
        tracing::debug!(mailbox = %mailbox, read_only, "state: selected");
        inner.state = ConnState::Selected;
        inner.selected = Some(SelectedMailbox { mailbox, read_only });
    }

    /// Selected back to Authenticated.
    pub fn unselected(&self) {
        let mut inner = self.lock();
        if inner.state == ConnState::Selected {
            inner.state = ConnState::Authenticated;
            inner.selected = None;
            tracing::debug!("state: unselected");
        }
    }

    /// Enters the terminal Logout state. Returns true only for the call
    /// that performed the transition.
    pub fn logout(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == ConnState::Logout {
            return false;
        }
        inner.state = ConnState::Logout;
        inner.selected = None;
        true
    }

    /// Merges enableable capabilities into the enabled set and returns
    /// those that were not enabled before.
    pub fn enable(&self, requested: &[Capability]) -> Vec<Capability> {
        let mut inner = self.lock();
        let mut newly = Vec::new();
        for cap in requested {
            if cap.is_enableable() && !inner.enabled.contains(cap) && !newly.contains(cap) {
                newly.push(cap.clone());
            }
        }
        inner.enabled.extend(newly.iter().cloned());
        newly
    }

    /// Returns true if `cap` was enabled on this connection.
    #[must_use]
    pub fn is_enabled(&self, cap: &Capability) -> bool {
        self.lock().enabled.contains(cap)
    }

    /// Returns the selected mailbox, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<SelectedMailbox> {
        self.lock().selected.clone()
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
    fn test_selected_only_command_when_not_authenticated() {
        let state = ConnectionState::new();
        let err = state.check_state(ConnState::Selected).unwrap_err();
        assert!(matches!(
            err,
            Error::BadState {
                required: ConnState::Selected,
                current: ConnState::NotAuthenticated
            }
        ));
        assert!(state.check_state(ConnState::NotAuthenticated).is_ok());
    }

    #[test]
    fn test_transitions() {
        let state = ConnectionState::new();
        state.authenticated();
        assert_eq!(state.state(), ConnState::Authenticated);
        assert!(state.check_not_state(ConnState::NotAuthenticated).is_err());

        state.selected(Mailbox::inbox(), false);
        assert_eq!(state.state(), ConnState::Selected);
        state.selected(Mailbox::new("Archive"), true);
        let sel = state.selected_mailbox().unwrap();
        assert_eq!(sel.mailbox.as_str(), "Archive");
        assert!(sel.read_only);

        state.unselected();
        assert_eq!(state.state(), ConnState::Authenticated);
        assert!(state.selected_mailbox().is_none());
    }

    #[test]
    fn test_logout_is_terminal_and_happens_once() {
        for start in [
            ConnectionState::new(),
            ConnectionState::preauth(),
            {
                let s = ConnectionState::preauth();
                s.selected(Mailbox::inbox(), false);
                s
            },
        ] {
            assert!(start.logout());
            assert!(!start.logout());
            assert_eq!(start.state(), ConnState::Logout);
            start.authenticated();
            start.selected(Mailbox::inbox(), false);
            assert_eq!(start.state(), ConnState::Logout);
            assert!(start.check_state(ConnState::NotAuthenticated).is_err());
        }
    }

    #[test]
    fn test_enable_returns_only_new_capabilities() {
        let state = ConnectionState::preauth();
        assert!(state.enable(&[Capability::Unknown("X-FOO".into())]).is_empty());
        assert_eq!(
            state.enable(&[Capability::Imap4Rev2, Capability::Imap4Rev2]),
            vec![Capability::Imap4Rev2]
        );
        assert!(state.enable(&[Capability::Imap4Rev2]).is_empty());
        assert!(state.is_enabled(&Capability::Imap4Rev2));
        assert!(!state.is_enabled(&Capability::Utf8Accept));
    }

    #[test]
    fn test_concurrent_enable_merges() {
        let state = std::sync::Arc::new(ConnectionState::preauth());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                std::thread::spawn(move || {
                    let cap = if i % 2 == 0 {
                        Capability::Imap4Rev2
                    } else {
                        Capability::Utf8Accept
                    };
                    state.enable(&[cap]).len()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 2);
    }
}
