//! Optimistic mutation state machine.
//!
//! Each gesture applies its change to the [`ItemStore`] immediately, calls the
//! [`RemoteGateway`], then commits or rolls back. Per entry the lifecycle is
//! `Idle -> Pending(kind) -> Committed | RolledBack -> Idle`; an entry with a
//! pending mutation rejects further gestures until that mutation resolves.
//!
//! The state lock is taken only around synchronous store steps and is never
//! held across a remote call, so mutations on distinct entries interleave
//! freely while each apply, commit and rollback stays atomic.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use shared::domain::{Item, ItemName};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, warn};

use crate::{
    error::{StoreError, SyncError},
    gateway::RemoteGateway,
    store::{Anchor, EntryKey, ItemPatch, ItemStore, ListEntry},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PendingKind {
    Creating,
    Updating,
    Deleting,
}

/// Rollback data for the one in-flight mutation of an entry.
#[derive(Debug, Clone)]
enum PendingMutation {
    /// The placeholder itself lives in the store.
    Creating,
    Updating { previous_checked: bool },
    /// The entry is out of the store until the delete resolves.
    Deleting { anchor: Anchor, snapshot: ListEntry },
}

impl PendingMutation {
    fn kind(&self) -> PendingKind {
        match self {
            Self::Creating => PendingKind::Creating,
            Self::Updating { .. } => PendingKind::Updating,
            Self::Deleting { .. } => PendingKind::Deleting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Pending(PendingKind),
    UnknownItem,
    /// Not yet confirmed by the server, so not addressable.
    Provisional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    RolledBack(SyncError),
    /// No transition happened.
    Ignored(IgnoreReason),
    /// Refused locally before any transition or remote call.
    Rejected(SyncError),
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::RolledBack(err) | Self::Rejected(err) => Some(err),
            Self::Committed | Self::Ignored(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied(PendingKind),
    Committed(PendingKind),
    RolledBack(PendingKind),
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub entry: ListEntry,
    pub pending: Option<PendingKind>,
}

/// Read-only copy of the store plus the pending kind of each entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub entries: Vec<EntryView>,
}

impl StoreSnapshot {
    pub fn get(&self, key: &EntryKey) -> Option<&EntryView> {
        self.entries.iter().find(|view| &view.entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Confirmed items in display order; placeholders are skipped.
    pub fn items(&self) -> Vec<Item> {
        self.entries
            .iter()
            .filter_map(|view| view.entry.item())
            .collect()
    }
}

/// Published after every store transition.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub key: Option<EntryKey>,
    pub transition: Transition,
    pub snapshot: StoreSnapshot,
}

#[derive(Default)]
struct ReconcilerState {
    store: ItemStore,
    pending: HashMap<EntryKey, PendingMutation>,
    next_provisional: u64,
    /// Bumped on every commit.
    generation: u64,
    refreshes_in_flight: usize,
    /// Keys committed while a refresh was in flight, tagged with their
    /// generation. Cleared once no refresh is in flight.
    recent_commits: Vec<(u64, EntryKey)>,
}

impl ReconcilerState {
    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            entries: self
                .store
                .all()
                .iter()
                .map(|entry| EntryView {
                    pending: self.pending.get(&entry.key).map(PendingMutation::kind),
                    entry: entry.clone(),
                })
                .collect(),
        }
    }

    fn record_commit(&mut self, key: &EntryKey) {
        self.generation += 1;
        if self.refreshes_in_flight > 0 {
            self.recent_commits.push((self.generation, key.clone()));
        }
    }

    fn begin_refresh(&mut self) -> u64 {
        self.refreshes_in_flight += 1;
        self.generation
    }

    /// Keys committed after generation `since`.
    fn finish_refresh(&mut self, since: u64) -> HashSet<EntryKey> {
        self.refreshes_in_flight = self.refreshes_in_flight.saturating_sub(1);
        let committed = self
            .recent_commits
            .iter()
            .filter(|(generation, _)| *generation > since)
            .map(|(_, key)| key.clone())
            .collect();
        if self.refreshes_in_flight == 0 {
            self.recent_commits.clear();
        }
        committed
    }

    /// Gate shared by toggle and delete: the entry must be confirmed, present
    /// and idle.
    fn check_idle(&self, key: &EntryKey) -> Result<(), IgnoreReason> {
        if key.is_provisional() {
            return Err(IgnoreReason::Provisional);
        }
        if let Some(pending) = self.pending.get(key) {
            return Err(IgnoreReason::Pending(pending.kind()));
        }
        if !self.store.has(key) {
            return Err(IgnoreReason::UnknownItem);
        }
        Ok(())
    }
}

pub struct Reconciler {
    gateway: Arc<dyn RemoteGateway>,
    inner: Mutex<ReconcilerState>,
    events: broadcast::Sender<StoreEvent>,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            gateway,
            inner: Mutex::new(ReconcilerState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().await.snapshot()
    }

    pub async fn pending(&self, key: &EntryKey) -> Option<PendingKind> {
        self.inner
            .lock()
            .await
            .pending
            .get(key)
            .map(PendingMutation::kind)
    }

    fn publish(&self, state: &ReconcilerState, key: Option<EntryKey>, transition: Transition) {
        let _ = self.events.send(StoreEvent {
            key,
            transition,
            snapshot: state.snapshot(),
        });
    }

    /// Reloads the collection from the server, keeping pending local work
    /// visible. Entries committed while the listing was in flight keep their
    /// local state. Returns the number of entries now in the store.
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        let since = self.inner.lock().await.begin_refresh();
        let result = self.gateway.list().await;

        let mut state = self.inner.lock().await;
        let committed = state.finish_refresh(since);
        let items = match result {
            Ok(items) => items,
            Err(err) => {
                warn!(%err, "refresh failed; keeping local state");
                return Err(err);
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        let mut listed = HashSet::with_capacity(items.len());
        for item in items {
            let mut entry = ListEntry::from(item);
            listed.insert(entry.key.clone());
            match state.pending.get(&entry.key) {
                Some(PendingMutation::Deleting { .. }) => continue,
                Some(PendingMutation::Updating { .. }) => {
                    if let Some(local) = state.store.get(&entry.key) {
                        entry.checked = local.checked;
                    }
                }
                Some(PendingMutation::Creating) | None if committed.contains(&entry.key) => {
                    match state.store.get(&entry.key) {
                        Some(local) => entry = local.clone(),
                        None => {
                            debug!(key = %entry.key, "listed entry deleted since; skipped");
                            continue;
                        }
                    }
                }
                Some(PendingMutation::Creating) | None => {}
            }
            entries.push(entry);
        }
        let created_since: Vec<ListEntry> = state
            .store
            .all()
            .iter()
            .filter(|entry| committed.contains(&entry.key) && !listed.contains(&entry.key))
            .cloned()
            .collect();
        entries.extend(created_since);
        let placeholders: Vec<ListEntry> = state
            .store
            .all()
            .iter()
            .filter(|entry| entry.key.is_provisional())
            .cloned()
            .collect();
        entries.extend(placeholders);
        state.store.reset(entries);

        let count = state.store.len();
        debug!(count, "store refreshed");
        self.publish(&state, None, Transition::Refreshed);
        Ok(count)
    }

    pub async fn create(&self, raw_name: &str) -> Outcome {
        let name = match ItemName::parse(raw_name) {
            Ok(name) => name,
            Err(err) => {
                debug!("create rejected: {err}");
                return Outcome::Rejected(err.into());
            }
        };

        let key = {
            let mut state = self.inner.lock().await;
            let n = state.next_provisional;
            state.next_provisional += 1;
            let placeholder = ListEntry::provisional(n, name.clone());
            let key = placeholder.key.clone();
            if let Err(err) = state.store.insert(placeholder) {
                error!(%key, %err, "provisional key collision");
                return Outcome::RolledBack(err.into());
            }
            state.pending.insert(key.clone(), PendingMutation::Creating);
            debug!(%key, %name, "applied optimistic create");
            self.publish(&state, Some(key.clone()), Transition::Applied(PendingKind::Creating));
            key
        };

        let result = self.gateway.create(&name).await;

        let mut state = self.inner.lock().await;
        state.pending.remove(&key);
        match result {
            Ok(item) => {
                let committed = ListEntry::from(item);
                let committed_key = committed.key.clone();
                match state.store.replace(&key, committed) {
                    Ok(_) => {
                        state.record_commit(&committed_key);
                        debug!(%key, id = %committed_key, "create committed");
                        self.publish(
                            &state,
                            Some(committed_key),
                            Transition::Committed(PendingKind::Creating),
                        );
                        Outcome::Committed
                    }
                    Err(StoreError::Conflict(existing)) => {
                        // A refresh already brought the server item in.
                        if let Err(store_err) = state.store.remove(&key) {
                            error!(%key, %store_err, "placeholder missing at commit; store desynchronized");
                        }
                        state.record_commit(&existing);
                        warn!(%key, id = %existing, "created item already listed; dropped placeholder");
                        self.publish(
                            &state,
                            Some(existing),
                            Transition::Committed(PendingKind::Creating),
                        );
                        Outcome::Committed
                    }
                    Err(err) => {
                        error!(%key, %err, "placeholder missing at commit; store desynchronized");
                        self.publish(
                            &state,
                            Some(key),
                            Transition::RolledBack(PendingKind::Creating),
                        );
                        Outcome::RolledBack(err.into())
                    }
                }
            }
            Err(err) => {
                if let Err(store_err) = state.store.remove(&key) {
                    error!(%key, %store_err, "placeholder missing at rollback; store desynchronized");
                }
                warn!(%key, %err, "create failed; discarded placeholder");
                self.publish(
                    &state,
                    Some(key),
                    Transition::RolledBack(PendingKind::Creating),
                );
                Outcome::RolledBack(err)
            }
        }
    }

    pub async fn toggle(&self, key: &EntryKey) -> Outcome {
        let (id, checked) = {
            let mut state = self.inner.lock().await;
            if let Err(reason) = state.check_idle(key) {
                debug!(%key, ?reason, "toggle ignored");
                return Outcome::Ignored(reason);
            }
            let Some(id) = key.item_id().cloned() else {
                return Outcome::Ignored(IgnoreReason::Provisional);
            };
            let previous = match state.store.get(key) {
                Some(entry) => entry.checked,
                None => return Outcome::Ignored(IgnoreReason::UnknownItem),
            };
            let checked = !previous;
            if let Err(err) = state.store.update(key, ItemPatch::checked(checked)) {
                error!(%key, %err, "optimistic toggle failed");
                return Outcome::RolledBack(err.into());
            }
            state.pending.insert(
                key.clone(),
                PendingMutation::Updating {
                    previous_checked: previous,
                },
            );
            debug!(%key, checked, "applied optimistic toggle");
            self.publish(&state, Some(key.clone()), Transition::Applied(PendingKind::Updating));
            (id, checked)
        };

        let result = self.gateway.set_checked(&id, checked).await;

        let mut state = self.inner.lock().await;
        let previous_checked = match state.pending.remove(key) {
            Some(PendingMutation::Updating { previous_checked }) => previous_checked,
            _ => !checked,
        };
        match result {
            Ok(()) if state.store.has(key) => {
                state.record_commit(key);
                debug!(%key, checked, "toggle committed");
                self.publish(&state, Some(key.clone()), Transition::Committed(PendingKind::Updating));
                Outcome::Committed
            }
            Ok(()) => {
                error!(%key, "toggle confirmed for an entry no longer in the store; store desynchronized");
                self.publish(&state, Some(key.clone()), Transition::RolledBack(PendingKind::Updating));
                Outcome::RolledBack(StoreError::NotFound(key.clone()).into())
            }
            Err(err) => {
                match state.store.update(key, ItemPatch::checked(previous_checked)) {
                    Ok(_) if err.is_desync() => {
                        error!(%key, %err, "server has no such item; toggle reverted")
                    }
                    Ok(_) => warn!(%key, %err, "toggle failed; reverted"),
                    Err(store_err) => {
                        error!(%key, %store_err, "cannot revert toggle; store desynchronized")
                    }
                }
                self.publish(&state, Some(key.clone()), Transition::RolledBack(PendingKind::Updating));
                Outcome::RolledBack(err)
            }
        }
    }

    pub async fn delete(&self, key: &EntryKey) -> Outcome {
        let id = {
            let mut state = self.inner.lock().await;
            if let Err(reason) = state.check_idle(key) {
                debug!(%key, ?reason, "delete ignored");
                return Outcome::Ignored(reason);
            }
            let Some(id) = key.item_id().cloned() else {
                return Outcome::Ignored(IgnoreReason::Provisional);
            };
            let (anchor, snapshot) = match state.store.remove(key) {
                Ok(removed) => removed,
                Err(_) => return Outcome::Ignored(IgnoreReason::UnknownItem),
            };
            state
                .pending
                .insert(key.clone(), PendingMutation::Deleting { anchor, snapshot });
            debug!(%key, "applied optimistic delete");
            self.publish(&state, Some(key.clone()), Transition::Applied(PendingKind::Deleting));
            id
        };

        let result = self.gateway.delete(&id).await;

        let mut state = self.inner.lock().await;
        let pending = state.pending.remove(key);
        match result {
            Ok(()) => {
                state.record_commit(key);
                debug!(%key, "delete committed");
                self.publish(&state, Some(key.clone()), Transition::Committed(PendingKind::Deleting));
                Outcome::Committed
            }
            Err(err) => {
                match pending {
                    Some(PendingMutation::Deleting { anchor, snapshot }) => {
                        match state.store.insert_at(&anchor, snapshot) {
                            Ok(index) if err.is_desync() => {
                                error!(%key, %err, index, "server has no such item; entry reinserted")
                            }
                            Ok(index) => warn!(%key, %err, index, "delete failed; entry reinserted"),
                            Err(store_err) => error!(
                                %key,
                                %store_err,
                                "cannot reinsert deleted entry; store desynchronized"
                            ),
                        }
                    }
                    _ => error!(%key, "delete snapshot missing; store desynchronized"),
                }
                self.publish(&state, Some(key.clone()), Transition::RolledBack(PendingKind::Deleting));
                Outcome::RolledBack(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
