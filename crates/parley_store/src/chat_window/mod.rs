#![forbid(unsafe_code)]

mod autofocus;
mod layout;

pub use autofocus::{AutofocusDecision, AutofocusTracker};
pub use layout::{ChatWindowLayout, HiddenMenu, LayoutConstants, VisibleWindow, layout};

use serde::Serialize;
use tracing::{debug, warn};

use parley_domain::{EntityKind, Filter, FoldState, Identity, Mailbox, ThreadFields};

use crate::mutation::{Applied, Mutation};
use crate::{Store, StoreError};

/// Something that can be shown in a floating chat window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatWindowItem {
	/// Blank window for starting a conversation.
	NewMessage,
	Thread(Identity),
}

impl ChatWindowItem {
	pub fn thread(&self) -> Option<&Identity> {
		match self {
			ChatWindowItem::Thread(thread) => Some(thread),
			ChatWindowItem::NewMessage => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
	/// Append at the end of the open list.
	Last,
	/// Append, then swap with the last visible window when it lands in the menu.
	LastVisible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDirection {
	Left,
	Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatWindowManager {
	items: Vec<ChatWindowItem>,
	autofocus_item: Option<ChatWindowItem>,
	autofocus_counter: u64,
	notified_autofocus_counter: u64,
}

impl ChatWindowManager {
	/// Open windows in open order.
	pub fn items(&self) -> &[ChatWindowItem] {
		&self.items
	}

	pub fn contains(&self, item: &ChatWindowItem) -> bool {
		self.items.contains(item)
	}

	/// Pending focus request: which window, and the request counter.
	pub fn autofocus_request(&self) -> Option<(&ChatWindowItem, u64)> {
		self.autofocus_item.as_ref().map(|item| (item, self.autofocus_counter))
	}

	pub fn notified_autofocus_counter(&self) -> u64 {
		self.notified_autofocus_counter
	}

	fn position(&self, item: &ChatWindowItem) -> Option<usize> {
		self.items.iter().position(|i| i == item)
	}
}

/// Full-screen discuss view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscussState {
	pub is_open: bool,
	pub thread: Option<Identity>,
	pub filter: Filter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Viewport {
	pub width: u32,
	pub is_mobile: bool,
}

impl Store {
	pub fn chat_windows(&self) -> &ChatWindowManager {
		&self.chat_windows
	}

	pub fn discuss(&self) -> &DiscussState {
		&self.discuss
	}

	pub fn viewport(&self) -> Viewport {
		self.viewport
	}

	pub fn layout_constants(&self) -> &LayoutConstants {
		&self.layout_constants
	}

	pub fn chat_window_layout(&self) -> ChatWindowLayout<ChatWindowItem> {
		layout(
			&self.chat_windows.items,
			self.viewport.width,
			self.viewport.is_mobile,
			self.discuss.is_open,
			&self.layout_constants,
		)
	}

	/// Resolve the pending focus request for one view. Returns the window to
	/// focus, and acknowledges the request in the store when due.
	pub fn autofocus(&mut self, tracker: &mut AutofocusTracker<ChatWindowItem>) -> Option<ChatWindowItem> {
		let (item, counter) = self
			.chat_windows
			.autofocus_request()
			.map(|(item, counter)| (item.clone(), counter))?;
		let decision = tracker.resolve(&item, counter, self.chat_windows.notified_autofocus_counter);
		if decision.acknowledges()
			&& let Err(err) = self.apply(Mutation::AcknowledgeAutofocus(counter))
		{
			warn!(error = %err, "failed to acknowledge autofocus");
		}
		(decision == AutofocusDecision::Focus).then_some(item)
	}

	pub(crate) fn set_viewport(&mut self, width: u32, is_mobile: bool) -> Applied {
		let next = Viewport { width, is_mobile };
		if self.viewport == next {
			return Applied::Unchanged;
		}
		self.viewport = next;
		Applied::Changed
	}

	pub(crate) fn open_discuss(&mut self, thread: Option<Identity>) -> Result<Applied, StoreError> {
		if let Some(thread) = &thread {
			self.require(EntityKind::Thread, thread)?;
		}
		let thread = thread
			.or_else(|| self.discuss.thread.clone())
			.unwrap_or_else(|| Mailbox::Inbox.identity());
		self.discuss.is_open = true;
		self.select_discuss_thread(thread, Filter::empty())
	}

	pub(crate) fn close_discuss(&mut self) -> Applied {
		if !self.discuss.is_open {
			return Applied::Unchanged;
		}
		self.discuss.is_open = false;
		Applied::Changed
	}

	pub(crate) fn select_discuss_thread(&mut self, thread: Identity, filter: Filter) -> Result<Applied, StoreError> {
		self.require(EntityKind::Thread, &thread)?;
		self.ensure_thread_cache(&thread, &filter)?;
		debug!(thread = %thread, "discuss thread selected");
		self.discuss.thread = Some(thread);
		self.discuss.filter = filter;
		Ok(Applied::Changed)
	}

	pub(crate) fn open_chat_window(&mut self, item: ChatWindowItem, mode: OpenMode) -> Result<Applied, StoreError> {
		if let Some(thread) = item.thread() {
			self.require(EntityKind::Thread, thread)?;
		}
		if !self.chat_windows.contains(&item) {
			self.chat_windows.items.push(item.clone());
		}

		if mode == OpenMode::LastVisible {
			let current = self.chat_window_layout();
			if current.is_hidden(&item)
				&& let Some(last_visible) = current.visible.last().map(|w| w.item.clone())
			{
				self.swap_chat_windows(&item, &last_visible);
			}
		}

		if let Some(thread) = item.thread().cloned() {
			self.update_thread(
				&thread,
				ThreadFields {
					is_minimized: Some(true),
					fold_state: Some(FoldState::Open),
					..ThreadFields::default()
				},
			)?;
		}
		self.focus_chat_window(item);
		Ok(Applied::Changed)
	}

	pub(crate) fn close_chat_window(&mut self, item: &ChatWindowItem) -> Result<Applied, StoreError> {
		let Some(position) = self.chat_windows.position(item) else {
			return Ok(Applied::Unchanged);
		};
		self.chat_windows.items.remove(position);
		if self.chat_windows.autofocus_item.as_ref() == Some(item) {
			self.chat_windows.autofocus_item = None;
		}
		if let Some(thread) = item.thread() {
			self.update_thread(
				thread,
				ThreadFields {
					is_minimized: Some(false),
					fold_state: Some(FoldState::Closed),
					..ThreadFields::default()
				},
			)?;
		}
		Ok(Applied::Changed)
	}

	pub(crate) fn shift_chat_window(&mut self, item: &ChatWindowItem, direction: ShiftDirection) -> Applied {
		let Some(position) = self.chat_windows.position(item) else {
			return Applied::Unchanged;
		};
		let target = match direction {
			ShiftDirection::Left => position.checked_sub(1),
			ShiftDirection::Right => Some(position + 1).filter(|t| *t < self.chat_windows.items.len()),
		};
		match target {
			Some(target) => {
				self.chat_windows.items.swap(position, target);
				Applied::Changed
			}
			None => Applied::Unchanged,
		}
	}

	pub(crate) fn swap_chat_windows(&mut self, a: &ChatWindowItem, b: &ChatWindowItem) -> Applied {
		match (self.chat_windows.position(a), self.chat_windows.position(b)) {
			(Some(x), Some(y)) if x != y => {
				self.chat_windows.items.swap(x, y);
				Applied::Changed
			}
			_ => Applied::Unchanged,
		}
	}

	pub(crate) fn focus_chat_window(&mut self, item: ChatWindowItem) -> Applied {
		if !self.chat_windows.contains(&item) {
			return Applied::Unchanged;
		}
		self.chat_windows.autofocus_item = Some(item);
		self.chat_windows.autofocus_counter += 1;
		Applied::Changed
	}

	pub(crate) fn acknowledge_autofocus(&mut self, counter: u64) -> Applied {
		if self.chat_windows.notified_autofocus_counter == counter {
			return Applied::Unchanged;
		}
		self.chat_windows.notified_autofocus_counter = counter;
		Applied::Changed
	}
}
