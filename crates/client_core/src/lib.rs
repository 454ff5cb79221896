//! Client-side synchronization for the shoplist item collection.
//!
//! [`ItemStore`] holds what the user sees, [`RemoteGateway`] talks to the
//! items server, [`Reconciler`] applies changes optimistically and repairs
//! them when the server disagrees, and [`ViewBinder`] connects gestures and
//! rendering to the reconciler.

pub mod error;
pub mod gateway;
pub mod reconciler;
pub mod store;
pub mod view;

pub use error::{StoreError, SyncError};
pub use gateway::{HttpGateway, RemoteGateway};
pub use reconciler::{
    EntryView, IgnoreReason, Outcome, PendingKind, Reconciler, StoreEvent, StoreSnapshot,
    Transition,
};
pub use store::{Anchor, EntryKey, ItemPatch, ItemStore, ListEntry};
pub use view::{FormNode, Gesture, Renderer, RowNode, ViewBinder, ViewNode};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
