#![forbid(unsafe_code)]

//! Whether consecutive messages render as one visual block.

use chrono::TimeDelta;

use crate::Store;
use crate::entities::{Message, Thread, ThreadCache};

pub const DEFAULT_SQUASH_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquashPolicy {
	pub enabled: bool,
	pub window: TimeDelta,
}

impl Default for SquashPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			window: TimeDelta::seconds(DEFAULT_SQUASH_WINDOW_SECS),
		}
	}
}

impl SquashPolicy {
	/// Mailboxes aggregate unrelated threads and never squash.
	pub fn for_thread(thread: &Thread) -> Self {
		Self {
			enabled: !thread.is_mailbox(),
			..Self::default()
		}
	}

	pub fn with_window(mut self, window: TimeDelta) -> Self {
		self.window = window;
		self
	}

	pub fn should_squash(&self, store: &Store, prev: &Message, next: &Message) -> bool {
		if !self.enabled {
			return false;
		}
		let (Some(prev_date), Some(next_date)) = (prev.date, next.date) else {
			return false;
		};
		if (next_date - prev_date).abs() > self.window {
			return false;
		}
		if !prev.is_comment() || !next.is_comment() {
			return false;
		}
		if prev.author != next.author || prev.origin_thread != next.origin_thread {
			return false;
		}

		let origins = (
			prev.origin_thread.as_ref().and_then(|t| store.thread(t)),
			next.origin_thread.as_ref().and_then(|t| store.thread(t)),
		);
		match origins {
			(Some(a), Some(b)) => a.model == b.model && (a.is_channel() || a.id == b.id),
			_ => true,
		}
	}

	/// One flag per cached message, in display order; the first never squashes.
	pub fn squash_flags(&self, store: &Store, cache: &ThreadCache) -> Vec<bool> {
		let messages: Vec<&Message> = store.cache_messages(cache).collect();
		if messages.is_empty() {
			return Vec::new();
		}
		let mut flags = Vec::with_capacity(messages.len());
		flags.push(false);
		flags.extend(
			messages
				.windows(2)
				.map(|pair| self.should_squash(store, pair[0], pair[1])),
		);
		flags
	}
}
