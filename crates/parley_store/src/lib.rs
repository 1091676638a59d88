#![forbid(unsafe_code)]

//! Normalized client-side store for a messaging session: partners, threads,
//! thread caches, messages and attachments, plus the views derived from them.

use thiserror::Error;

use parley_domain::{EntityKind, Identity};

pub mod attachment;
pub mod chat_window;
pub mod entities;
mod handle;
mod indexes;
mod mutation;
pub mod pagination;
pub mod squash;
mod store;
pub mod suggestions;

#[cfg(test)]
mod pagination_tests;

pub use chat_window::{
	AutofocusDecision, AutofocusTracker, ChatWindowItem, ChatWindowLayout, ChatWindowManager, DiscussState, HiddenMenu,
	LayoutConstants, OpenMode, ShiftDirection, Viewport, VisibleWindow,
};
pub use entities::{Attachment, Message, Partner, Thread, ThreadCache, UploadState};
pub use handle::StoreHandle;
pub use mutation::{Applied, CachePatch, Mutation, ThreadCounter};
pub use pagination::{LoadKind, LoadPlan, PAGE_SIZE};
pub use squash::SquashPolicy;
pub use store::{MailFailure, Store};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
	/// A relationship target does not exist; the caller applied mutations
	/// out of order.
	#[error("missing {kind}: {identity}")]
	Missing { kind: EntityKind, identity: Identity },
}
