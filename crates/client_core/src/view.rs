//! Render model and gesture binding.
//!
//! [`ViewBinder`] turns reconciler snapshots into a [`ViewNode`] tree for a
//! [`Renderer`] and turns user gestures into reconciler calls. Every in-flight
//! reconciliation is polled on the binder's own task.

use std::{collections::HashSet, sync::Arc};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::{
    broadcast::{self, error::RecvError, error::TryRecvError},
    mpsc,
};
use tracing::{debug, warn};

use crate::{
    error::SyncError,
    reconciler::{Outcome, PendingKind, Reconciler, StoreEvent, StoreSnapshot},
    store::EntryKey,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    /// Form submission with the raw input text.
    Submit(String),
    /// Primary click on a row.
    Toggle(EntryKey),
    /// Click on a row's delete control.
    Delete(EntryKey),
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowNode {
    pub key: EntryKey,
    pub label: String,
    pub checked: bool,
    pub locked: bool,
    pub pending: Option<PendingKind>,
    /// Only checked, confirmed rows offer the delete control.
    pub delete_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormNode {
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewNode {
    pub form: FormNode,
    pub rows: Vec<RowNode>,
    pub notice: Option<String>,
}

impl ViewNode {
    pub fn row(&self, key: &EntryKey) -> Option<&RowNode> {
        self.rows.iter().find(|row| &row.key == key)
    }
}

pub trait Renderer: Send {
    fn render(&mut self, view: &ViewNode);
}

enum Control {
    Form,
    Row(EntryKey),
}

enum Settled {
    Gesture { control: Control, outcome: Outcome },
    Refresh(Result<usize, SyncError>),
}

pub struct ViewBinder<R: Renderer> {
    reconciler: Arc<Reconciler>,
    renderer: R,
    events: broadcast::Receiver<StoreEvent>,
    events_open: bool,
    snapshot: StoreSnapshot,
    locked_rows: HashSet<EntryKey>,
    form_locked: bool,
    refreshing: bool,
    notice: Option<String>,
}

impl<R: Renderer> ViewBinder<R> {
    pub async fn new(reconciler: Arc<Reconciler>, renderer: R) -> Self {
        let events = reconciler.subscribe();
        let snapshot = reconciler.snapshot().await;
        Self {
            reconciler,
            renderer,
            events,
            events_open: true,
            snapshot,
            locked_rows: HashSet::new(),
            form_locked: false,
            refreshing: false,
            notice: None,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Shows a passive notice on the next render.
    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn view(&self) -> ViewNode {
        let rows = self
            .snapshot
            .entries
            .iter()
            .map(|view| RowNode {
                key: view.entry.key.clone(),
                label: view.entry.name.to_string(),
                checked: view.entry.checked,
                locked: view.pending.is_some() || self.locked_rows.contains(&view.entry.key),
                pending: view.pending,
                delete_control: view.entry.checked && !view.entry.key.is_provisional(),
            })
            .collect();
        ViewNode {
            form: FormNode {
                locked: self.form_locked,
            },
            rows,
            notice: self.notice.clone(),
        }
    }

    /// Consumes gestures until the channel closes and every reconciliation
    /// it started has settled.
    pub async fn run(&mut self, mut gestures: mpsc::Receiver<Gesture>) {
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Settled>> = FuturesUnordered::new();
        let mut gestures_open = true;
        self.render();

        while gestures_open || !in_flight.is_empty() {
            tokio::select! {
                gesture = gestures.recv(), if gestures_open => match gesture {
                    Some(gesture) => {
                        if let Some(task) = self.bind(gesture) {
                            in_flight.push(task);
                            self.render();
                        }
                    }
                    None => gestures_open = false,
                },
                Some(settled) = in_flight.next(), if !in_flight.is_empty() => {
                    self.settle(settled);
                    self.render();
                }
                event = self.events.recv(), if self.events_open => self.apply_event(event).await,
            }
        }

        self.drain_events().await;
    }

    fn bind(&mut self, gesture: Gesture) -> Option<BoxFuture<'static, Settled>> {
        let reconciler = Arc::clone(&self.reconciler);
        match gesture {
            Gesture::Submit(text) => {
                if self.form_locked {
                    debug!("submit ignored; form locked");
                    return None;
                }
                self.form_locked = true;
                Some(
                    async move {
                        let outcome = reconciler.create(&text).await;
                        Settled::Gesture {
                            control: Control::Form,
                            outcome,
                        }
                    }
                    .boxed(),
                )
            }
            Gesture::Toggle(key) => {
                if !self.row_available(&key) {
                    debug!(%key, "toggle ignored; row locked or missing");
                    return None;
                }
                self.locked_rows.insert(key.clone());
                Some(
                    async move {
                        let outcome = reconciler.toggle(&key).await;
                        Settled::Gesture {
                            control: Control::Row(key),
                            outcome,
                        }
                    }
                    .boxed(),
                )
            }
            Gesture::Delete(key) => {
                let has_control = self
                    .snapshot
                    .get(&key)
                    .is_some_and(|view| view.entry.checked);
                if !has_control || !self.row_available(&key) {
                    debug!(%key, "delete ignored; no available delete control");
                    return None;
                }
                self.locked_rows.insert(key.clone());
                Some(
                    async move {
                        let outcome = reconciler.delete(&key).await;
                        Settled::Gesture {
                            control: Control::Row(key),
                            outcome,
                        }
                    }
                    .boxed(),
                )
            }
            Gesture::Refresh => {
                if self.refreshing {
                    return None;
                }
                self.refreshing = true;
                Some(async move { Settled::Refresh(reconciler.refresh().await) }.boxed())
            }
        }
    }

    fn row_available(&self, key: &EntryKey) -> bool {
        !self.locked_rows.contains(key)
            && self
                .snapshot
                .get(key)
                .is_some_and(|view| view.pending.is_none())
    }

    fn settle(&mut self, settled: Settled) {
        match settled {
            Settled::Gesture { control, outcome } => {
                match control {
                    Control::Form => self.form_locked = false,
                    Control::Row(key) => {
                        self.locked_rows.remove(&key);
                    }
                }
                match outcome {
                    Outcome::Committed => self.notice = None,
                    Outcome::RolledBack(err) => {
                        warn!(%err, "change not saved; reverted");
                        self.notice = Some(format!("Could not save change: {err}"));
                    }
                    Outcome::Rejected(err) => self.notice = Some(err.to_string()),
                    Outcome::Ignored(reason) => debug!(?reason, "gesture ignored by reconciler"),
                }
            }
            Settled::Refresh(result) => {
                self.refreshing = false;
                match result {
                    Ok(count) => {
                        debug!(count, "list refreshed");
                        self.notice = None;
                    }
                    Err(err) => {
                        warn!(%err, "list refresh failed");
                        self.notice = Some(format!("Could not load items: {err}"));
                    }
                }
            }
        }
    }

    async fn apply_event(&mut self, event: Result<StoreEvent, RecvError>) {
        match event {
            Ok(event) => self.snapshot = event.snapshot,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "view fell behind store events; resyncing");
                self.snapshot = self.reconciler.snapshot().await;
            }
            Err(RecvError::Closed) => {
                self.events_open = false;
                return;
            }
        }
        self.render();
    }

    /// Renders transitions published after the last select iteration.
    async fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply_event(Ok(event)).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    self.apply_event(Err(RecvError::Lagged(skipped))).await
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.render();
    }

    fn render(&mut self) {
        let view = self.view();
        self.renderer.render(&view);
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
