#![forbid(unsafe_code)]

//! Store side of the per-cache load state machine:
//! `empty -> loading -> loaded`, plus `loading_more` for backward pages.
//!
//! `begin_*` decides what to fetch and sets the in-flight flag in the same
//! call, so two callers holding the same lock can never both start a fetch
//! for one cache. The fetch itself happens outside the store.

use std::collections::BTreeSet;

use serde_json::{Value, json};
use tracing::debug;

use parley_domain::{EntityKind, Filter, Identity, Mailbox, MessageData, MessageId, ThreadFields};

use crate::entities::Thread;
use crate::mutation::{CachePatch, Mutation};
use crate::store::missing;
use crate::{Store, StoreError};

/// Messages requested per fetch.
pub const PAGE_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
	Initial,
	/// Newest page again, for a cache that was already loaded.
	Refresh,
	More,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadPlan {
	/// Search messages matching `filter`, newest first, at most `limit`.
	Fetch {
		cache: Identity,
		kind: LoadKind,
		filter: Filter,
		limit: usize,
	},
	/// Business-record thread: format these known ids.
	FetchIds {
		cache: Identity,
		kind: LoadKind,
		ids: Vec<i64>,
	},
}

impl LoadPlan {
	pub fn cache(&self) -> &Identity {
		match self {
			LoadPlan::Fetch { cache, .. } | LoadPlan::FetchIds { cache, .. } => cache,
		}
	}

	pub fn kind(&self) -> LoadKind {
		match self {
			LoadPlan::Fetch { kind, .. } | LoadPlan::FetchIds { kind, .. } => *kind,
		}
	}
}

/// Terms restricting a message search to `thread`.
pub fn thread_filter(thread: &Thread) -> Filter {
	let base = Filter::empty();
	match thread.mailbox() {
		Some(Mailbox::Inbox) => base.with_term("needaction", "=", true),
		Some(Mailbox::Starred) => base.with_term("starred", "=", true),
		Some(Mailbox::Moderation) => base.with_term("moderation_status", "=", "pending_moderation"),
		None if thread.is_channel() => base.with_term("channel_ids", "in", json!([thread.id])),
		None => base
			.with_term("model", "=", thread.model.as_str())
			.with_term("res_id", "=", json!(thread.id)),
	}
}

fn cursor_value(cursor: MessageId) -> Value {
	match cursor.as_int() {
		Some(id) => Value::from(id),
		None => Value::from(cursor.0),
	}
}

impl Store {
	/// Start loading the newest page of `(thread, filter)`. Creates the cache
	/// when needed; a loaded cache is refreshed. `None` while a load is
	/// already in flight.
	pub fn begin_load(
		&mut self,
		thread: &Identity,
		filter: &Filter,
		page_size: usize,
	) -> Result<Option<LoadPlan>, StoreError> {
		self.require(EntityKind::Thread, thread)?;
		self.apply(Mutation::InsertThreadCache {
			thread: thread.clone(),
			filter: filter.clone(),
		})?;
		let cache = Identity::thread_cache(thread, filter);
		let entry = self
			.thread_caches
			.get(&cache)
			.ok_or_else(|| missing(EntityKind::ThreadCache, &cache))?;
		if entry.loading {
			debug!(cache = %cache, "load skipped");
			return Ok(None);
		}
		let kind = if entry.loaded { LoadKind::Refresh } else { LoadKind::Initial };
		self.apply(Mutation::UpdateThreadCache {
			cache: cache.clone(),
			changes: CachePatch {
				loading: Some(true),
				..CachePatch::default()
			},
		})?;
		self.plan(thread, cache, filter, kind, page_size).map(Some)
	}

	/// Start fetching the page before the oldest cached message. `None` when
	/// the cache is not loaded yet, busy, or has no older history.
	pub fn begin_load_more(
		&mut self,
		thread: &Identity,
		filter: &Filter,
		page_size: usize,
	) -> Result<Option<LoadPlan>, StoreError> {
		self.require(EntityKind::Thread, thread)?;
		let cache = Identity::thread_cache(thread, filter);
		let entry = self
			.thread_caches
			.get(&cache)
			.ok_or_else(|| missing(EntityKind::ThreadCache, &cache))?;
		if !entry.loaded || entry.loading_more || entry.all_history_loaded {
			debug!(
				cache = %cache,
				loaded = entry.loaded,
				loading_more = entry.loading_more,
				all_history_loaded = entry.all_history_loaded,
				"load more skipped"
			);
			return Ok(None);
		}
		self.apply(Mutation::UpdateThreadCache {
			cache: cache.clone(),
			changes: CachePatch {
				loading_more: Some(true),
				..CachePatch::default()
			},
		})?;
		self.plan(thread, cache, filter, LoadKind::More, page_size).map(Some)
	}

	fn plan(
		&mut self,
		thread: &Identity,
		cache: Identity,
		filter: &Filter,
		kind: LoadKind,
		page_size: usize,
	) -> Result<LoadPlan, StoreError> {
		let owner = self
			.threads
			.get(thread)
			.ok_or_else(|| missing(EntityKind::Thread, thread))?;
		if owner.is_document() {
			let ids = self.plan_document_page(thread, &cache, page_size)?;
			return Ok(LoadPlan::FetchIds { cache, kind, ids });
		}

		let mut request = filter.extended(&thread_filter(owner));
		if kind == LoadKind::More
			&& let Some(cursor) = self.oldest_message_id(&cache)
		{
			request = request.with_term("id", "<", cursor_value(cursor));
		}
		Ok(LoadPlan::Fetch {
			cache,
			kind,
			filter: request,
			limit: page_size,
		})
	}

	/// Smallest message id in the cache: the backward pagination cursor.
	pub fn oldest_message_id(&self, cache: &Identity) -> Option<MessageId> {
		self.thread_caches
			.get(cache)?
			.message_identities
			.first()
			.and_then(|id| self.messages.get(id))
			.map(|m| m.id)
	}

	/// Next page of a business-record thread: the newest ids not linked yet.
	/// Ids already in the store are linked right away; only the rest are
	/// returned for fetching.
	fn plan_document_page(
		&mut self,
		thread: &Identity,
		cache: &Identity,
		page_size: usize,
	) -> Result<Vec<i64>, StoreError> {
		let page = self.unlinked_document_ids(thread, cache);
		let mut to_fetch = Vec::new();
		for id in page.into_iter().take(page_size) {
			let message = Identity::message(MessageId::from(id));
			if self.messages.contains_key(&message) {
				self.apply(Mutation::LinkMessageToThreadCache {
					message,
					cache: cache.clone(),
				})?;
			} else {
				to_fetch.push(id);
			}
		}
		Ok(to_fetch)
	}

	fn unlinked_document_ids(&self, thread: &Identity, cache: &Identity) -> Vec<i64> {
		let linked: BTreeSet<&Identity> = self
			.thread_caches
			.get(cache)
			.map(|c| c.message_identities.iter().collect())
			.unwrap_or_default();
		let mut ids: Vec<i64> = self
			.threads
			.get(thread)
			.map(|t| t.message_ids.clone())
			.unwrap_or_default();
		ids.sort_unstable_by(|a, b| b.cmp(a));
		ids.dedup();
		ids.into_iter()
			.filter(|id| !linked.contains(&Identity::message(MessageId::from(*id))))
			.collect()
	}

	/// Feed a fetch result into the cache and settle its flags.
	/// Returns the number of messages received.
	pub fn complete_load(&mut self, plan: &LoadPlan, messages: Vec<MessageData>) -> Result<usize, StoreError> {
		let cache = plan.cache().clone();
		let owner = self
			.thread_caches
			.get(&cache)
			.map(|c| c.thread.clone())
			.ok_or_else(|| missing(EntityKind::ThreadCache, &cache))?;

		let received = messages.len();
		if let LoadPlan::FetchIds { ids, .. } = plan {
			self.forget_unreturned_ids(&owner, ids, &messages)?;
		}
		for data in messages {
			let message = Identity::message(data.id);
			self.apply(Mutation::InsertMessage(data))?;
			self.apply(Mutation::LinkMessageToThreadCache {
				message,
				cache: cache.clone(),
			})?;
		}

		let all_history_loaded = match plan {
			LoadPlan::Fetch { limit, .. } => received < *limit,
			LoadPlan::FetchIds { .. } => self.unlinked_document_ids(&owner, &cache).is_empty(),
		};
		let changes = match plan.kind() {
			LoadKind::Initial | LoadKind::Refresh => CachePatch {
				loaded: Some(true),
				loading: Some(false),
				all_history_loaded: Some(all_history_loaded),
				..CachePatch::default()
			},
			LoadKind::More => CachePatch {
				loading_more: Some(false),
				all_history_loaded: Some(all_history_loaded),
				..CachePatch::default()
			},
		};
		self.apply(Mutation::UpdateThreadCache { cache: cache.clone(), changes })?;
		debug!(cache = %cache, received, all_history_loaded, "cache page loaded");
		Ok(received)
	}

	/// Clear the in-flight flag after a failed fetch so the load can be retried.
	pub fn abort_load(&mut self, plan: &LoadPlan) -> Result<(), StoreError> {
		let changes = match plan.kind() {
			LoadKind::Initial => CachePatch {
				loading: Some(false),
				..CachePatch::default()
			},
			// The cache still holds the pages of the earlier load.
			LoadKind::Refresh => CachePatch {
				loaded: Some(true),
				..CachePatch::default()
			},
			LoadKind::More => CachePatch {
				loading_more: Some(false),
				..CachePatch::default()
			},
		};
		self.apply(Mutation::UpdateThreadCache {
			cache: plan.cache().clone(),
			changes,
		})?;
		Ok(())
	}

	/// Requested ids the server did not format are gone; drop them from the
	/// thread so later pages stop asking for them.
	fn forget_unreturned_ids(
		&mut self,
		thread: &Identity,
		requested: &[i64],
		received: &[MessageData],
	) -> Result<(), StoreError> {
		let returned: BTreeSet<MessageId> = received.iter().map(|m| m.id).collect();
		let gone: BTreeSet<i64> = requested
			.iter()
			.copied()
			.filter(|id| !returned.contains(&MessageId::from(*id)))
			.collect();
		if gone.is_empty() {
			return Ok(());
		}
		let Some(known) = self.threads.get(thread).map(|t| t.message_ids.clone()) else {
			return Ok(());
		};
		debug!(thread = %thread, gone = gone.len(), "server dropped message ids");
		self.apply(Mutation::UpdateThread {
			thread: thread.clone(),
			changes: ThreadFields {
				message_ids: Some(known.into_iter().filter(|id| !gone.contains(id)).collect()),
				..ThreadFields::default()
			},
		})?;
		Ok(())
	}
}

