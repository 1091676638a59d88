#![forbid(unsafe_code)]

//! Shared ownership of the store for async callers.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{Applied, Mutation, Store, StoreError};

/// Cloneable handle to one session's store.
///
/// Closures passed to [`read`](Self::read) and [`update`](Self::update) run
/// under the lock and must not await. After an update that advanced the
/// revision, the new revision is published to subscribers.
#[derive(Clone)]
pub struct StoreHandle {
	inner: Arc<Mutex<Store>>,
	revision_tx: Arc<watch::Sender<u64>>,
}

impl StoreHandle {
	pub fn new(store: Store) -> Self {
		let (revision_tx, _) = watch::channel(store.revision());
		Self {
			inner: Arc::new(Mutex::new(store)),
			revision_tx: Arc::new(revision_tx),
		}
	}

	pub fn read<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
		let guard = self.inner.lock();
		f(&guard)
	}

	pub fn update<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
		let (result, before, after) = {
			let mut guard = self.inner.lock();
			let before = guard.revision();
			let result = f(&mut guard);
			(result, before, guard.revision())
		};
		if after != before {
			self.revision_tx.send_replace(after);
		}
		result
	}

	pub fn apply(&self, mutation: Mutation) -> Result<Applied, StoreError> {
		self.update(|store| store.apply(mutation))
	}

	/// Apply mutations in order, stopping at the first error.
	pub fn apply_all(&self, mutations: impl IntoIterator<Item = Mutation>) -> Result<Vec<Applied>, StoreError> {
		self.update(|store| mutations.into_iter().map(|m| store.apply(m)).collect())
	}

	pub fn revision(&self) -> u64 {
		*self.revision_tx.borrow()
	}

	/// Receiver that sees every published revision.
	pub fn subscribe(&self) -> watch::Receiver<u64> {
		self.revision_tx.subscribe()
	}
}

impl std::fmt::Debug for StoreHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StoreHandle")
			.field("revision", &self.revision())
			.finish_non_exhaustive()
	}
}
