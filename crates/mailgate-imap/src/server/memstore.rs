//! In-memory storage backend.
//!
//! Every mailbox keeps its messages behind one mutex, so sequence numbers,
//! UIDs and flags are always read together. Each selected session keeps its
//! own `(UID, flags)` snapshot of the mailbox; changes by other sessions
//! become visible only when [`Session::poll`] reports them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::broadcast;

use super::message;
use super::search::{self, Candidate};
use super::session::{Backend, Session, StorageError, StorageResult};
use crate::command::{AppendOptions, FetchAttribute, SearchCriteria, StoreAction};
use crate::parser::{AclData, FetchItem, FetchMessage, UntaggedResponse};
use crate::types::{
    DELIMITER, Flag, Flags, ListData, Mailbox, MailboxAttribute, RightModification, RightSet,
    SelectData, SeqNum, SequenceSet, StatusData, StatusItem, Uid, UidValidity, list_matches,
};

/// Rights of a user on their own mailboxes when the ACL has no entry for
/// them.
const OWNER_RIGHTS: &str = "akxeilprwtscd";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct MemMessage {
    uid: Uid,
    flags: Flags,
    date: DateTime<FixedOffset>,
    raw: Arc<[u8]>,
}

#[derive(Debug)]
struct MailboxState {
    messages: Vec<MemMessage>,
    uid_next: u32,
    acl: Vec<(String, RightSet)>,
}

impl MailboxState {
    fn find(&self, uid: Uid) -> Option<usize> {
        self.messages.binary_search_by_key(&uid, |m| m.uid).ok()
    }
}

#[derive(Debug)]
struct MemMailbox {
    name: Mailbox,
    special_use: Vec<MailboxAttribute>,
    uid_validity: UidValidity,
    state: Mutex<MailboxState>,
    changes: broadcast::Sender<()>,
}

impl MemMailbox {
    fn new(name: Mailbox, special_use: Vec<MailboxAttribute>, uid_validity: UidValidity) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            name,
            special_use,
            uid_validity,
            state: Mutex::new(MailboxState {
                messages: Vec::new(),
                uid_next: 1,
                acl: Vec::new(),
            }),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        lock(&self.state)
    }

    fn notify(&self) {
        // No receivers simply means nobody is watching
        let _ = self.changes.send(());
    }

    fn status(&self, items: &[StatusItem]) -> StatusData {
        let state = self.lock();
        let count = |pred: fn(&MemMessage) -> bool| {
            u32::try_from(state.messages.iter().filter(|m| pred(m)).count()).unwrap_or(u32::MAX)
        };
        let mut data = StatusData {
            mailbox: self.name.clone(),
            ..StatusData::default()
        };
        for item in items {
            match item {
                StatusItem::Messages => data.messages = Some(count(|_| true)),
                StatusItem::UidNext => data.uid_next = Uid::new(state.uid_next),
                StatusItem::UidValidity => data.uid_validity = Some(self.uid_validity),
                StatusItem::Unseen => data.unseen = Some(count(|m| !m.flags.is_seen())),
                StatusItem::Deleted => data.deleted = Some(count(|m| m.flags.is_deleted())),
                StatusItem::Size => {
                    data.size = Some(state.messages.iter().map(|m| m.raw.len() as u64).sum());
                }
                StatusItem::Recent => data.recent = Some(0),
            }
        }
        data
    }

    fn append(&self, options: &AppendOptions, raw: &[u8]) -> Uid {
        let mut state = self.lock();
        let uid = Uid::new(state.uid_next).unwrap_or(Uid::MIN);
        state.uid_next += 1;
        state.messages.push(MemMessage {
            uid,
            flags: options.flags.iter().filter(|f| f.is_storable()).cloned().collect(),
            date: options.date.unwrap_or_else(|| Utc::now().fixed_offset()),
            raw: Arc::from(raw),
        });
        drop(state);
        self.notify();
        uid
    }
}

#[derive(Debug, Default)]
struct Mailboxes {
    by_name: BTreeMap<String, Arc<MemMailbox>>,
    last_validity: u32,
}

/// A user account with its mailboxes.
#[derive(Debug)]
pub struct User {
    name: String,
    password: String,
    mailboxes: Mutex<Mailboxes>,
}

impl User {
    /// Creates a user without mailboxes.
    #[must_use]
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            mailboxes: Mutex::new(Mailboxes::default()),
        }
    }

    /// Returns the user name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates a mailbox and any missing parents. `special_use` attributes
    /// are reported by LIST.
    ///
    /// # Errors
    ///
    /// Fails if the mailbox exists or the name is empty.
    pub fn create(&self, mailbox: &Mailbox, special_use: &[MailboxAttribute]) -> StorageResult<()> {
        let name = mailbox.as_str().trim_end_matches(DELIMITER);
        if name.is_empty() {
            return Err(StorageError::Other("Invalid mailbox name".to_string()));
        }
        let mailbox = Mailbox::new(name);
        let mut boxes = lock(&self.mailboxes);
        if boxes.by_name.contains_key(mailbox.as_str()) {
            return Err(StorageError::AlreadyExists);
        }

        let mut missing = vec![(mailbox, special_use.to_vec())];
        let mut parent = missing[0].0.parent();
        while let Some(p) = parent {
            if boxes.by_name.contains_key(p.as_str()) {
                break;
            }
            parent = p.parent();
            missing.push((p, Vec::new()));
        }
        for (name, attrs) in missing.into_iter().rev() {
            boxes.last_validity += 1;
            let validity = UidValidity::new(boxes.last_validity).unwrap_or(UidValidity::MIN);
            tracing::debug!(user = %self.name, mailbox = %name, "creating mailbox");
            boxes.by_name.insert(
                name.as_str().to_string(),
                Arc::new(MemMailbox::new(name, attrs, validity)),
            );
        }
        Ok(())
    }

    /// Appends a message to a mailbox and returns its UID.
    ///
    /// # Errors
    ///
    /// Fails if the mailbox does not exist.
    pub fn append(
        &self,
        mailbox: &Mailbox,
        options: &AppendOptions,
        message: &[u8],
    ) -> StorageResult<Uid> {
        Ok(self.get(mailbox)?.append(options, message))
    }

    fn get(&self, mailbox: &Mailbox) -> StorageResult<Arc<MemMailbox>> {
        lock(&self.mailboxes)
            .by_name
            .get(mailbox.as_str())
            .cloned()
            .ok_or(StorageError::NoSuchMailbox)
    }

    fn delete(&self, mailbox: &Mailbox) -> StorageResult<()> {
        if mailbox.is_inbox() {
            return Err(StorageError::Other("INBOX cannot be deleted".to_string()));
        }
        let mut boxes = lock(&self.mailboxes);
        if !boxes.by_name.contains_key(mailbox.as_str()) {
            return Err(StorageError::NoSuchMailbox);
        }
        let prefix = format!("{}{DELIMITER}", mailbox.as_str());
        if boxes.by_name.keys().any(|k| k.starts_with(&prefix)) {
            return Err(StorageError::Other("Mailbox has children".to_string()));
        }
        boxes.by_name.remove(mailbox.as_str());
        Ok(())
    }

    fn list(&self, pattern: &str, status: &[StatusItem]) -> Vec<ListData> {
        let boxes = lock(&self.mailboxes);
        let mut matched: Vec<&Arc<MemMailbox>> = boxes
            .by_name
            .iter()
            .filter(|(name, _)| list_matches(pattern, name))
            .map(|(_, mailbox)| mailbox)
            .collect();
        matched.sort_by_key(|m| (!m.name.is_inbox(), m.name.as_str().to_string()));

        matched
            .into_iter()
            .map(|mailbox| {
                let prefix = format!("{}{DELIMITER}", mailbox.name.as_str());
                let mut attributes = mailbox.special_use.clone();
                if boxes.by_name.keys().any(|k| k.starts_with(&prefix)) {
                    attributes.push(MailboxAttribute::HasChildren);
                }
                ListData {
                    attributes,
                    delimiter: Some(DELIMITER),
                    mailbox: mailbox.name.clone(),
                    status: (!status.is_empty()).then(|| mailbox.status(status)),
                }
            })
            .collect()
    }
}

/// Storage shared by all connections of a server.
#[derive(Debug, Clone, Default)]
pub struct MemBackend {
    users: Arc<Mutex<HashMap<String, Arc<User>>>>,
}

impl MemBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user, replacing any user of the same name.
    pub fn add_user(&self, user: User) -> Arc<User> {
        let user = Arc::new(user);
        lock(&self.users).insert(user.name.clone(), Arc::clone(&user));
        user
    }

    /// Looks up a user.
    #[must_use]
    pub fn user(&self, name: &str) -> Option<Arc<User>> {
        lock(&self.users).get(name).cloned()
    }
}

impl Backend for MemBackend {
    fn new_session(&self) -> Box<dyn Session> {
        Box::new(MemSession {
            backend: self.clone(),
            user: None,
            view: None,
        })
    }
}

/// A session's picture of the selected mailbox.
#[derive(Debug)]
struct View {
    mailbox: Arc<MemMailbox>,
    read_only: bool,
    snapshot: Vec<(Uid, Flags)>,
}

impl View {
    fn max_uid(&self) -> u32 {
        self.snapshot.last().map_or(0, |(uid, _)| uid.get())
    }

    /// Resolves a set to snapshot positions.
    fn targets(&self, set: &SequenceSet, uid: bool) -> StorageResult<Vec<usize>> {
        let len = u32::try_from(self.snapshot.len()).unwrap_or(u32::MAX);
        if uid {
            let max = self.max_uid();
            return Ok(self
                .snapshot
                .iter()
                .enumerate()
                .filter(|(_, (u, _))| set.contains(u.get(), max))
                .map(|(i, _)| i)
                .collect());
        }
        if !set.is_dynamic() && set.max_static().is_some_and(|n| n > len) {
            return Err(StorageError::Other(
                "Invalid message sequence number".to_string(),
            ));
        }
        Ok((1..=len)
            .filter(|&n| set.contains(n, len))
            .map(|n| n as usize - 1)
            .collect())
    }
}

fn seq(index: usize) -> SeqNum {
    u32::try_from(index + 1)
        .ok()
        .and_then(SeqNum::new)
        .unwrap_or(SeqNum::MIN)
}

/// Session of one connection.
#[derive(Debug)]
pub struct MemSession {
    backend: MemBackend,
    user: Option<Arc<User>>,
    view: Option<View>,
}

impl MemSession {
    fn user(&self) -> StorageResult<&Arc<User>> {
        self.user
            .as_ref()
            .ok_or_else(|| StorageError::Other("Not authenticated".to_string()))
    }

    fn view(&mut self) -> StorageResult<&mut View> {
        self.view
            .as_mut()
            .ok_or_else(|| StorageError::Other("No mailbox selected".to_string()))
    }

    fn writable_view(&mut self) -> StorageResult<&mut View> {
        let view = self.view()?;
        if view.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(view)
    }
}

fn apply_store(flags: &Flags, action: &StoreAction) -> Flags {
    let storable = action.flags().iter().filter(|f| f.is_storable()).cloned();
    match action {
        StoreAction::SetFlags(_) => storable.collect(),
        StoreAction::AddFlags(_) => {
            let mut out = flags.clone();
            storable.for_each(|f| out.insert(f));
            out
        }
        StoreAction::RemoveFlags(_) => {
            let mut out = flags.clone();
            storable.for_each(|f| out.remove(&f));
            out
        }
    }
}

fn fetch_item(msg: &MemMessage, attr: &FetchAttribute) -> FetchItem {
    match attr {
        FetchAttribute::Flags => FetchItem::Flags(msg.flags.clone()),
        FetchAttribute::InternalDate => FetchItem::InternalDate(msg.date),
        FetchAttribute::Rfc822Size => {
            FetchItem::Rfc822Size(u32::try_from(msg.raw.len()).unwrap_or(u32::MAX))
        }
        FetchAttribute::Uid => FetchItem::Uid(msg.uid),
        FetchAttribute::Body {
            section, partial, ..
        } => {
            let data = message::section(&msg.raw, section);
            FetchItem::Body {
                section: section.clone(),
                origin: partial.map(|(origin, _)| origin),
                data: match partial {
                    Some((origin, length)) => data.map(|d| message::partial(d, *origin, *length)),
                    None => data,
                },
            }
        }
    }
}

impl Session for MemSession {
    fn login(&mut self, username: &str, password: &str) -> StorageResult<()> {
        match self.backend.user(username) {
            Some(user) if user.password == password => {
                self.user = Some(user);
                Ok(())
            }
            _ => Err(StorageError::InvalidCredentials),
        }
    }

    fn create(&mut self, mailbox: &Mailbox) -> StorageResult<()> {
        self.user()?.create(mailbox, &[])
    }

    fn delete(&mut self, mailbox: &Mailbox) -> StorageResult<()> {
        self.user()?.delete(mailbox)
    }

    fn list(
        &mut self,
        reference: &str,
        pattern: &str,
        status: &[StatusItem],
    ) -> StorageResult<Vec<ListData>> {
        let user = self.user()?;
        if pattern.is_empty() {
            // Hierarchy delimiter discovery
            return Ok(vec![ListData {
                attributes: vec![MailboxAttribute::NoSelect],
                delimiter: Some(DELIMITER),
                mailbox: Mailbox(String::new()),
                status: None,
            }]);
        }
        let pattern = if reference.is_empty() || pattern.starts_with(DELIMITER) {
            pattern.to_string()
        } else {
            format!("{reference}{pattern}")
        };
        Ok(user.list(&pattern, status))
    }

    fn status(&mut self, mailbox: &Mailbox, items: &[StatusItem]) -> StorageResult<StatusData> {
        Ok(self.user()?.get(mailbox)?.status(items))
    }

    fn append(
        &mut self,
        mailbox: &Mailbox,
        options: &AppendOptions,
        message: &[u8],
    ) -> StorageResult<Uid> {
        self.user()?.append(mailbox, options, message)
    }

    fn select(&mut self, mailbox: &Mailbox, read_only: bool) -> StorageResult<SelectData> {
        self.view = None;
        let mailbox = self.user()?.get(mailbox)?;
        let state = mailbox.lock();
        let snapshot: Vec<(Uid, Flags)> = state
            .messages
            .iter()
            .map(|m| (m.uid, m.flags.clone()))
            .collect();
        let mut permanent_flags = Flags::new();
        if !read_only {
            Flag::system().into_iter().for_each(|f| permanent_flags.insert(f));
            permanent_flags.insert(Flag::Wildcard);
        }
        let data = SelectData {
            exists: u32::try_from(snapshot.len()).unwrap_or(u32::MAX),
            recent: None,
            uid_next: Uid::new(state.uid_next),
            uid_validity: Some(mailbox.uid_validity),
            flags: Flag::system().into_iter().collect(),
            permanent_flags,
            read_only,
        };
        drop(state);
        self.view = Some(View {
            mailbox,
            read_only,
            snapshot,
        });
        Ok(data)
    }

    fn unselect(&mut self, expunge: bool) -> StorageResult<()> {
        if let Some(view) = self.view.take()
            && expunge
            && !view.read_only
        {
            let mut state = view.mailbox.lock();
            let before = state.messages.len();
            state.messages.retain(|m| !m.flags.is_deleted());
            let changed = state.messages.len() != before;
            drop(state);
            if changed {
                view.mailbox.notify();
            }
        }
        Ok(())
    }

    fn fetch(
        &mut self,
        set: &SequenceSet,
        uid: bool,
        items: &[FetchAttribute],
    ) -> StorageResult<Vec<FetchMessage>> {
        let view = self.view()?;
        let targets = view.targets(set, uid)?;
        let marks_seen = !view.read_only
            && items
                .iter()
                .any(|a| matches!(a, FetchAttribute::Body { peek: false, .. }));
        let wants_flags = items.contains(&FetchAttribute::Flags);
        let wants_uid = items.contains(&FetchAttribute::Uid);

        let mailbox = Arc::clone(&view.mailbox);
        let mut state = mailbox.lock();
        let mut out = Vec::with_capacity(targets.len());
        let mut changed = false;
        for index in targets {
            let (uid_of, _) = view.snapshot[index];
            let Some(pos) = state.find(uid_of) else {
                continue;
            };
            let msg = &mut state.messages[pos];
            let mut newly_seen = false;
            if marks_seen && !msg.flags.is_seen() {
                msg.flags.insert(Flag::Seen);
                view.snapshot[index].1 = msg.flags.clone();
                newly_seen = true;
                changed = true;
            }
            let mut fetched = Vec::with_capacity(items.len() + 2);
            if uid && !wants_uid {
                fetched.push(FetchItem::Uid(msg.uid));
            }
            fetched.extend(items.iter().map(|attr| fetch_item(msg, attr)));
            if newly_seen && !wants_flags {
                fetched.push(FetchItem::Flags(msg.flags.clone()));
            }
            out.push(FetchMessage {
                seq: seq(index),
                items: fetched,
            });
        }
        drop(state);
        if changed {
            mailbox.notify();
        }
        Ok(out)
    }

    fn store(
        &mut self,
        set: &SequenceSet,
        uid: bool,
        action: &StoreAction,
        silent: bool,
    ) -> StorageResult<Vec<FetchMessage>> {
        let view = self.writable_view()?;
        let targets = view.targets(set, uid)?;
        let mailbox = Arc::clone(&view.mailbox);
        let mut state = mailbox.lock();
        let mut out = Vec::new();
        let mut changed = false;
        for index in targets {
            let (uid_of, _) = view.snapshot[index];
            let Some(pos) = state.find(uid_of) else {
                continue;
            };
            let msg = &mut state.messages[pos];
            let flags = apply_store(&msg.flags, action);
            if !flags.same_as(&msg.flags) {
                msg.flags = flags;
                changed = true;
            }
            view.snapshot[index].1 = msg.flags.clone();
            if !silent {
                let mut items = Vec::with_capacity(2);
                if uid {
                    items.push(FetchItem::Uid(msg.uid));
                }
                items.push(FetchItem::Flags(msg.flags.clone()));
                out.push(FetchMessage {
                    seq: seq(index),
                    items,
                });
            }
        }
        drop(state);
        if changed {
            mailbox.notify();
        }
        Ok(out)
    }

    fn expunge(&mut self, uids: Option<&SequenceSet>) -> StorageResult<Vec<SeqNum>> {
        let view = self.writable_view()?;
        let mailbox = Arc::clone(&view.mailbox);
        let mut state = mailbox.lock();
        let max_uid = state.messages.last().map_or(0, |m| m.uid.get());
        let mut removed = Vec::new();
        state.messages.retain(|m| {
            let hit = m.flags.is_deleted() && uids.is_none_or(|set| set.contains(m.uid.get(), max_uid));
            if hit {
                removed.push(m.uid);
            }
            !hit
        });
        drop(state);

        let mut expunged = Vec::with_capacity(removed.len());
        let mut index = 0;
        while index < view.snapshot.len() {
            if removed.contains(&view.snapshot[index].0) {
                view.snapshot.remove(index);
                expunged.push(seq(index));
            } else {
                index += 1;
            }
        }
        if !removed.is_empty() {
            tracing::debug!(mailbox = %mailbox.name, count = removed.len(), "expunged");
            mailbox.notify();
        }
        Ok(expunged)
    }

    fn search(&mut self, criteria: &SearchCriteria, uid: bool) -> StorageResult<Vec<u32>> {
        let view = self.view()?;
        let state = view.mailbox.lock();
        let max_seq = u32::try_from(view.snapshot.len()).unwrap_or(u32::MAX);
        let max_uid = view.max_uid();
        let mut hits = Vec::new();
        for (index, (uid_of, _)) in view.snapshot.iter().enumerate() {
            let Some(pos) = state.find(*uid_of) else {
                continue;
            };
            let msg = &state.messages[pos];
            let candidate = Candidate {
                seq: seq(index).get(),
                uid: msg.uid.get(),
                max_seq,
                max_uid,
                flags: &msg.flags,
                date: msg.date,
                raw: &msg.raw[..],
            };
            if search::matches(criteria, &candidate) {
                hits.push(if uid { candidate.uid } else { candidate.seq });
            }
        }
        Ok(hits)
    }

    fn set_acl(
        &mut self,
        mailbox: &Mailbox,
        identifier: &str,
        modification: RightModification,
        rights: &RightSet,
    ) -> StorageResult<()> {
        let user = self.user()?;
        let owner = user.name() == identifier;
        let mailbox = user.get(mailbox)?;
        let mut state = mailbox.lock();
        let current = state
            .acl
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| {
                if owner {
                    RightSet::from(OWNER_RIGHTS)
                } else {
                    RightSet::new()
                }
            });
        let updated = current.apply(modification, rights);
        state.acl.retain(|(id, _)| id != identifier);
        // The owner's entry stays even when empty.
        if owner || !updated.is_empty() {
            state.acl.push((identifier.to_string(), updated));
        }
        Ok(())
    }

    fn delete_acl(&mut self, mailbox: &Mailbox, identifier: &str) -> StorageResult<()> {
        let mailbox = self.user()?.get(mailbox)?;
        mailbox.lock().acl.retain(|(id, _)| id != identifier);
        Ok(())
    }

    fn get_acl(&mut self, mailbox: &Mailbox) -> StorageResult<AclData> {
        let user = self.user()?;
        let mailbox = user.get(mailbox)?;
        let mut entries = mailbox.lock().acl.clone();
        if !entries.iter().any(|(id, _)| id == user.name()) {
            entries.insert(0, (user.name().to_string(), RightSet::from(OWNER_RIGHTS)));
        }
        Ok(AclData {
            mailbox: mailbox.name.clone(),
            entries,
        })
    }

    fn my_rights(&mut self, mailbox: &Mailbox) -> StorageResult<RightSet> {
        let user = self.user()?;
        let mailbox = user.get(mailbox)?;
        let state = mailbox.lock();
        Ok(state
            .acl
            .iter()
            .find(|(id, _)| id == user.name())
            .map_or_else(|| RightSet::from(OWNER_RIGHTS), |(_, r)| r.clone()))
    }

    fn poll(&mut self, allow_expunge: bool) -> Vec<UntaggedResponse> {
        let Some(view) = self.view.as_mut() else {
            return Vec::new();
        };
        let mailbox = Arc::clone(&view.mailbox);
        let state = mailbox.lock();
        let mut updates = Vec::new();

        if allow_expunge {
            let mut index = 0;
            while index < view.snapshot.len() {
                if state.find(view.snapshot[index].0).is_none() {
                    view.snapshot.remove(index);
                    updates.push(UntaggedResponse::Expunge(seq(index)));
                } else {
                    index += 1;
                }
            }
        }

        for (index, (uid, flags)) in view.snapshot.iter_mut().enumerate() {
            if let Some(pos) = state.find(*uid)
                && !state.messages[pos].flags.same_as(flags)
            {
                *flags = state.messages[pos].flags.clone();
                updates.push(UntaggedResponse::Fetch(FetchMessage {
                    seq: seq(index),
                    items: vec![FetchItem::Uid(*uid), FetchItem::Flags(flags.clone())],
                }));
            }
        }

        let max_uid = view.max_uid();
        let known = view.snapshot.len();
        view.snapshot.extend(
            state
                .messages
                .iter()
                .filter(|m| m.uid.get() > max_uid)
                .map(|m| (m.uid, m.flags.clone())),
        );
        if view.snapshot.len() != known {
            updates.push(UntaggedResponse::Exists(
                u32::try_from(view.snapshot.len()).unwrap_or(u32::MAX),
            ));
        }
        updates
    }

    fn watch(&self) -> Option<broadcast::Receiver<()>> {
        self.view.as_ref().map(|view| view.mailbox.changes.subscribe())
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
    use crate::command::{BodySection, SectionSpecifier};

    const RAW: &[u8] = b"Subject: hi\r\nMessage-Id: <1@example.com>\r\n\r\nbody";

    fn backend() -> MemBackend {
        let backend = MemBackend::new();
        let user = backend.add_user(User::new("test-user", "test-password"));
        user.create(&Mailbox::inbox(), &[]).unwrap();
        user.append(&Mailbox::inbox(), &AppendOptions::default(), RAW)
            .unwrap();
        backend
    }

    fn session(backend: &MemBackend) -> Box<dyn Session> {
        let mut session = backend.new_session();
        session.login("test-user", "test-password").unwrap();
        session
    }

    fn all_seq() -> SequenceSet {
        SequenceSet::RangeFrom(SeqNum::MIN)
    }

    #[test]
    fn login_checks_password() {
        let backend = backend();
        let mut session = backend.new_session();
        assert_eq!(
            session.login("test-user", "nope"),
            Err(StorageError::InvalidCredentials)
        );
        assert_eq!(
            session.login("nobody", "test-password"),
            Err(StorageError::InvalidCredentials)
        );
        assert!(session.create(&Mailbox::new("x")).is_err());
        session.login("test-user", "test-password").unwrap();
    }

    #[test]
    fn create_makes_parents_and_lists_them() {
        let backend = backend();
        let mut s = session(&backend);
        s.create(&Mailbox::new("MyFolder/Child/Leaf")).unwrap();
        assert_eq!(
            s.create(&Mailbox::new("MyFolder/Child")),
            Err(StorageError::AlreadyExists)
        );

        let names: Vec<String> = s
            .list("", "*", &[])
            .unwrap()
            .into_iter()
            .map(|l| l.mailbox.0)
            .collect();
        assert_eq!(names, ["INBOX", "MyFolder", "MyFolder/Child", "MyFolder/Child/Leaf"]);

        let top = s.list("", "%", &[StatusItem::Messages]).unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].attributes.is_empty());
        assert_eq!(top[0].status.as_ref().unwrap().messages, Some(1));
        assert_eq!(top[1].attributes, vec![MailboxAttribute::HasChildren]);

        let children = s.list("MyFolder/", "%", &[]).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].mailbox.as_str(), "MyFolder/Child");

        assert_eq!(
            s.delete(&Mailbox::new("MyFolder")),
            Err(StorageError::Other("Mailbox has children".into()))
        );
        s.delete(&Mailbox::new("MyFolder/Child/Leaf")).unwrap();
        assert!(s.delete(&Mailbox::inbox()).is_err());
        assert_eq!(
            s.delete(&Mailbox::new("Nope")),
            Err(StorageError::NoSuchMailbox)
        );
    }

    #[test]
    fn status_counts() {
        let backend = backend();
        let mut s = session(&backend);
        let status = s
            .status(
                &Mailbox::inbox(),
                &[StatusItem::Messages, StatusItem::Unseen, StatusItem::UidNext],
            )
            .unwrap();
        assert_eq!(status.messages, Some(1));
        assert_eq!(status.unseen, Some(1));
        assert_eq!(status.uid_next.unwrap().get(), 2);
        assert_eq!(status.deleted, None);
    }

    #[test]
    fn fetch_marks_seen_unless_peek_or_read_only() {
        let backend = backend();
        let mut s = session(&backend);
        s.select(&Mailbox::inbox(), true).unwrap();
        let body = [FetchAttribute::full_body(false)];
        let msgs = s.fetch(&all_seq(), false, &body).unwrap();
        assert_eq!(msgs[0].body(&BodySection::full()), Some(RAW));
        assert!(msgs[0].flags().is_none());

        s.select(&Mailbox::inbox(), false).unwrap();
        let peek = [FetchAttribute::full_body(true)];
        assert!(s.fetch(&all_seq(), false, &peek).unwrap()[0].flags().is_none());

        let msgs = s.fetch(&all_seq(), true, &body).unwrap();
        assert_eq!(msgs[0].uid().unwrap().get(), 1);
        assert!(msgs[0].flags().unwrap().is_seen());

        let text = [FetchAttribute::Body {
            section: BodySection::of(SectionSpecifier::Text),
            peek: true,
            partial: Some((1, 2)),
        }];
        let msgs = s.fetch(&all_seq(), false, &text).unwrap();
        assert_eq!(
            msgs[0].items,
            vec![FetchItem::Body {
                section: BodySection::of(SectionSpecifier::Text),
                origin: Some(1),
                data: Some(b"od".to_vec()),
            }]
        );
    }

    #[test]
    fn invalid_sequence_numbers_fail() {
        let backend = backend();
        let mut s = session(&backend);
        s.select(&Mailbox::inbox(), false).unwrap();
        let set = SequenceSet::single(5).unwrap();
        assert!(s.fetch(&set, false, &[FetchAttribute::Flags]).is_err());
        // UID sets only address what exists
        assert!(s.fetch(&set, true, &[FetchAttribute::Flags]).unwrap().is_empty());

        let huge = SequenceSet::parse("1:4294967295").unwrap();
        assert!(s.fetch(&huge, false, &[FetchAttribute::Flags]).is_err());
        let action = StoreAction::AddFlags(vec![Flag::Flagged]);
        assert!(s.store(&huge, false, &action, false).is_err());
        assert_eq!(s.fetch(&huge, true, &[FetchAttribute::Flags]).unwrap().len(), 1);
    }

    #[test]
    fn expunge_after_store_deleted() {
        let backend = backend();
        let mut s = session(&backend);
        s.select(&Mailbox::inbox(), false).unwrap();
        assert!(s.expunge(None).unwrap().is_empty());

        let stored = s
            .store(
                &SequenceSet::single(1).unwrap(),
                false,
                &StoreAction::AddFlags(vec![Flag::Deleted]),
                false,
            )
            .unwrap();
        assert!(stored[0].flags().unwrap().is_deleted());

        let expunged: Vec<u32> = s.expunge(None).unwrap().into_iter().map(SeqNum::get).collect();
        assert_eq!(expunged, vec![1]);
    }

    #[test]
    fn expunge_reports_shifting_sequence_numbers() {
        let backend = backend();
        let user = backend.user("test-user").unwrap();
        for _ in 0..3 {
            user.append(&Mailbox::inbox(), &AppendOptions::default(), RAW)
                .unwrap();
        }
        let mut s = session(&backend);
        s.select(&Mailbox::inbox(), false).unwrap();
        s.store(
            &SequenceSet::from_numbers([2, 3]),
            false,
            &StoreAction::AddFlags(vec![Flag::Deleted]),
            true,
        )
        .unwrap();
        let expunged: Vec<u32> = s.expunge(None).unwrap().into_iter().map(SeqNum::get).collect();
        assert_eq!(expunged, vec![2, 2]);
        assert_eq!(s.search(&SearchCriteria::All, true).unwrap(), vec![1, 4]);
    }

    #[test]
    fn read_only_views_refuse_changes() {
        let backend = backend();
        let mut s = session(&backend);
        s.select(&Mailbox::inbox(), true).unwrap();
        let action = StoreAction::AddFlags(vec![Flag::Flagged]);
        assert_eq!(
            s.store(&all_seq(), false, &action, false),
            Err(StorageError::ReadOnly)
        );
        assert_eq!(s.expunge(None), Err(StorageError::ReadOnly));
    }

    #[test]
    fn other_sessions_see_changes_on_poll() {
        let backend = backend();
        let mut a = session(&backend);
        let mut b = session(&backend);
        a.select(&Mailbox::inbox(), false).unwrap();
        b.select(&Mailbox::inbox(), false).unwrap();
        let mut watch = b.watch().unwrap();

        a.append(&Mailbox::inbox(), &AppendOptions::default(), RAW)
            .unwrap();
        assert!(watch.try_recv().is_ok());
        assert_eq!(b.poll(true), vec![UntaggedResponse::Exists(2)]);
        assert!(b.poll(true).is_empty());

        a.store(
            &SequenceSet::single(1).unwrap(),
            false,
            &StoreAction::AddFlags(vec![Flag::Deleted]),
            true,
        )
        .unwrap();
        a.expunge(None).unwrap();

        // Held back while a FETCH, STORE or SEARCH is answered
        let held = b.poll(false);
        assert_eq!(held.len(), 0);
        assert_eq!(
            b.poll(true),
            vec![UntaggedResponse::Expunge(SeqNum::MIN)]
        );
    }

    #[test]
    fn flag_changes_are_reported_once() {
        let backend = backend();
        let mut a = session(&backend);
        let mut b = session(&backend);
        a.select(&Mailbox::inbox(), false).unwrap();
        b.select(&Mailbox::inbox(), false).unwrap();
        a.store(
            &all_seq(),
            false,
            &StoreAction::SetFlags(vec![Flag::Flagged]),
            true,
        )
        .unwrap();
        assert!(a.poll(true).is_empty());
        let updates = b.poll(true);
        assert_eq!(updates.len(), 1);
        let UntaggedResponse::Fetch(msg) = &updates[0] else {
            panic!("expected FETCH, got {updates:?}");
        };
        assert!(msg.flags().unwrap().contains(&Flag::Flagged));
        assert!(b.poll(true).is_empty());
    }

    #[test]
    fn acl_modifications() {
        let backend = backend();
        let mut s = session(&backend);
        s.create(&Mailbox::new("MyFolder")).unwrap();
        let folder = Mailbox::new("MyFolder");
        assert_eq!(s.my_rights(&folder).unwrap(), RightSet::from(OWNER_RIGHTS));

        let steps = [
            (RightModification::Replace, "ailw", "ailw"),
            (RightModification::Add, "rwi", "ailwr"),
            (RightModification::Remove, "iwc", "alr"),
            (RightModification::Replace, "a", "a"),
            (RightModification::Remove, "a", ""),
            (RightModification::Add, "l", "l"),
        ];
        for (modification, rights, expected) in steps {
            s.set_acl(&folder, "test-user", modification, &RightSet::from(rights))
                .unwrap();
            let acl = s.get_acl(&folder).unwrap();
            assert_eq!(acl.rights("test-user"), Some(&RightSet::from(expected)));
            assert_eq!(s.my_rights(&folder).unwrap(), RightSet::from(expected));
        }

        s.set_acl(&folder, "anyone", RightModification::Replace, &RightSet::from("lr"))
            .unwrap();
        s.set_acl(&folder, "anyone", RightModification::Remove, &RightSet::from("lr"))
            .unwrap();
        assert!(s.get_acl(&folder).unwrap().rights("anyone").is_none());
        s.set_acl(&folder, "anyone", RightModification::Replace, &RightSet::from("lr"))
            .unwrap();
        s.delete_acl(&folder, "anyone").unwrap();
        assert!(s.get_acl(&folder).unwrap().rights("anyone").is_none());

        // Without an explicit entry the owner starts from full rights.
        let other = Mailbox::new("Other");
        s.create(&other).unwrap();
        s.set_acl(&other, "test-user", RightModification::Remove, &RightSet::from("x"))
            .unwrap();
        assert_eq!(s.my_rights(&other).unwrap(), RightSet::from("akeilprwtscd"));

        assert_eq!(
            s.set_acl(
                &Mailbox::new("BibiMailbox"),
                "test-user",
                RightModification::Replace,
                &RightSet::new()
            ),
            Err(StorageError::NoSuchMailbox)
        );
    }

    #[test]
    fn close_expunges_silently() {
        let backend = backend();
        let mut a = session(&backend);
        a.select(&Mailbox::inbox(), false).unwrap();
        a.store(
            &all_seq(),
            false,
            &StoreAction::AddFlags(vec![Flag::Deleted]),
            true,
        )
        .unwrap();
        a.unselect(true).unwrap();
        assert!(a.poll(true).is_empty());
        let status = a.status(&Mailbox::inbox(), &[StatusItem::Messages]).unwrap();
        assert_eq!(status.messages, Some(0));
    }
}
