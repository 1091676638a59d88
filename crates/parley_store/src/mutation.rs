#![forbid(unsafe_code)]

//! Every write to the store is one of these variants, dispatched by
//! [`Store::apply`].

use tracing::trace;

use parley_domain::{
	AttachmentData, AttachmentFields, Filter, Identity, InitMessagingData, MailFailureData, MessageData, MessageFields,
	PartnerData, PartnerFields, ThreadData, ThreadFields,
};

use crate::chat_window::{ChatWindowItem, OpenMode, ShiftDirection};
use crate::{Store, StoreError};

/// Partial update of a cache's pagination flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePatch {
	pub loaded: Option<bool>,
	pub loading: Option<bool>,
	pub loading_more: Option<bool>,
	pub all_history_loaded: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCounter {
	Unread,
	Needaction,
	/// Mailbox-level counter (inbox, starred, moderation).
	Mailbox,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
	InitMessaging(Box<InitMessagingData>),

	CreatePartner(PartnerData),
	InsertPartner(PartnerData),
	UpdatePartner {
		partner: Identity,
		changes: PartnerFields,
	},

	CreateThread(ThreadData),
	InsertThread(ThreadData),
	UpdateThread {
		thread: Identity,
		changes: ThreadFields,
	},
	/// Saturating add on one of a thread's counters.
	AdjustThreadCounter {
		thread: Identity,
		counter: ThreadCounter,
		delta: i64,
	},

	CreateThreadCache {
		thread: Identity,
		filter: Filter,
	},
	InsertThreadCache {
		thread: Identity,
		filter: Filter,
	},
	UpdateThreadCache {
		cache: Identity,
		changes: CachePatch,
	},

	CreateMessage(MessageData),
	InsertMessage(MessageData),
	UpdateMessage {
		message: Identity,
		changes: MessageFields,
	},
	DeleteMessage(Identity),
	LinkMessageToThreadCache {
		message: Identity,
		cache: Identity,
	},
	UnlinkMessageFromThreadCache {
		message: Identity,
		cache: Identity,
	},

	CreateAttachment(AttachmentData),
	InsertAttachment(AttachmentData),
	UpdateAttachment {
		attachment: Identity,
		changes: AttachmentFields,
	},
	CreateTemporaryAttachment {
		filename: String,
		mimetype: Option<String>,
	},
	DeleteAttachment(Identity),

	SetMailFailure(MailFailureData),

	SetViewport {
		width: u32,
		is_mobile: bool,
	},
	OpenDiscuss {
		thread: Option<Identity>,
	},
	CloseDiscuss,
	SelectDiscussThread {
		thread: Identity,
		filter: Filter,
	},

	OpenChatWindow {
		item: ChatWindowItem,
		mode: OpenMode,
	},
	CloseChatWindow(ChatWindowItem),
	ShiftChatWindow {
		item: ChatWindowItem,
		direction: ShiftDirection,
	},
	SwapChatWindows(ChatWindowItem, ChatWindowItem),
	FocusChatWindow(ChatWindowItem),
	AcknowledgeAutofocus(u64),
}

impl Mutation {
	pub const fn name(&self) -> &'static str {
		match self {
			Mutation::InitMessaging(_) => "init_messaging",
			Mutation::CreatePartner(_) => "create_partner",
			Mutation::InsertPartner(_) => "insert_partner",
			Mutation::UpdatePartner { .. } => "update_partner",
			Mutation::CreateThread(_) => "create_thread",
			Mutation::InsertThread(_) => "insert_thread",
			Mutation::UpdateThread { .. } => "update_thread",
			Mutation::AdjustThreadCounter { .. } => "adjust_thread_counter",
			Mutation::CreateThreadCache { .. } => "create_thread_cache",
			Mutation::InsertThreadCache { .. } => "insert_thread_cache",
			Mutation::UpdateThreadCache { .. } => "update_thread_cache",
			Mutation::CreateMessage(_) => "create_message",
			Mutation::InsertMessage(_) => "insert_message",
			Mutation::UpdateMessage { .. } => "update_message",
			Mutation::DeleteMessage(_) => "delete_message",
			Mutation::LinkMessageToThreadCache { .. } => "link_message_to_thread_cache",
			Mutation::UnlinkMessageFromThreadCache { .. } => "unlink_message_from_thread_cache",
			Mutation::CreateAttachment(_) => "create_attachment",
			Mutation::InsertAttachment(_) => "insert_attachment",
			Mutation::UpdateAttachment { .. } => "update_attachment",
			Mutation::CreateTemporaryAttachment { .. } => "create_temporary_attachment",
			Mutation::DeleteAttachment(_) => "delete_attachment",
			Mutation::SetMailFailure(_) => "set_mail_failure",
			Mutation::SetViewport { .. } => "set_viewport",
			Mutation::OpenDiscuss { .. } => "open_discuss",
			Mutation::CloseDiscuss => "close_discuss",
			Mutation::SelectDiscussThread { .. } => "select_discuss_thread",
			Mutation::OpenChatWindow { .. } => "open_chat_window",
			Mutation::CloseChatWindow(_) => "close_chat_window",
			Mutation::ShiftChatWindow { .. } => "shift_chat_window",
			Mutation::SwapChatWindows(..) => "swap_chat_windows",
			Mutation::FocusChatWindow(_) => "focus_chat_window",
			Mutation::AcknowledgeAutofocus(_) => "acknowledge_autofocus",
		}
	}
}

/// Outcome of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
	Created(Identity),
	Updated(Identity),
	Removed(Identity),
	/// Create on an identity that already exists; nothing changed.
	Duplicate(Identity),
	/// Session-level state changed (layout, discuss, failures, ...).
	Changed,
	Unchanged,
}

impl Applied {
	pub fn identity(&self) -> Option<&Identity> {
		match self {
			Applied::Created(id) | Applied::Updated(id) | Applied::Removed(id) | Applied::Duplicate(id) => Some(id),
			Applied::Changed | Applied::Unchanged => None,
		}
	}

	pub fn into_identity(self) -> Option<Identity> {
		match self {
			Applied::Created(id) | Applied::Updated(id) | Applied::Removed(id) | Applied::Duplicate(id) => Some(id),
			Applied::Changed | Applied::Unchanged => None,
		}
	}

	pub fn is_change(&self) -> bool {
		!matches!(self, Applied::Duplicate(_) | Applied::Unchanged)
	}
}

impl Store {
	/// Apply one mutation. Missing relationship targets are fatal and
	/// returned as [`StoreError::Missing`]; duplicate creates are not.
	pub fn apply(&mut self, mutation: Mutation) -> Result<Applied, StoreError> {
		let name = mutation.name();
		let applied = match mutation {
			Mutation::InitMessaging(data) => self.init_messaging(*data),

			Mutation::CreatePartner(data) => self.create_partner(data),
			Mutation::InsertPartner(data) => self.insert_partner(data),
			Mutation::UpdatePartner { partner, changes } => self.update_partner(&partner, changes)?,

			Mutation::CreateThread(data) => self.create_thread(data),
			Mutation::InsertThread(data) => self.insert_thread(data),
			Mutation::UpdateThread { thread, changes } => self.update_thread(&thread, changes)?,
			Mutation::AdjustThreadCounter { thread, counter, delta } => {
				self.adjust_thread_counter(&thread, counter, delta)?
			}

			Mutation::CreateThreadCache { thread, filter } => self.create_thread_cache(&thread, filter)?,
			Mutation::InsertThreadCache { thread, filter } => self.insert_thread_cache(&thread, filter)?,
			Mutation::UpdateThreadCache { cache, changes } => self.update_thread_cache(&cache, changes)?,

			Mutation::CreateMessage(data) => self.create_message(data)?,
			Mutation::InsertMessage(data) => self.insert_message(data)?,
			Mutation::UpdateMessage { message, changes } => self.update_message(&message, changes)?,
			Mutation::DeleteMessage(message) => self.delete_message(&message)?,
			Mutation::LinkMessageToThreadCache { message, cache } => self.link_message_to_cache(&message, &cache)?,
			Mutation::UnlinkMessageFromThreadCache { message, cache } => {
				self.unlink_message_from_cache(&message, &cache)?
			}

			Mutation::CreateAttachment(data) => self.create_attachment(data),
			Mutation::InsertAttachment(data) => self.insert_attachment(data),
			Mutation::UpdateAttachment { attachment, changes } => self.update_attachment(&attachment, changes)?,
			Mutation::CreateTemporaryAttachment { filename, mimetype } => {
				self.create_temporary_attachment(filename, mimetype)
			}
			Mutation::DeleteAttachment(attachment) => self.delete_attachment(&attachment)?,

			Mutation::SetMailFailure(data) => self.set_mail_failure(data),

			Mutation::SetViewport { width, is_mobile } => self.set_viewport(width, is_mobile),
			Mutation::OpenDiscuss { thread } => self.open_discuss(thread)?,
			Mutation::CloseDiscuss => self.close_discuss(),
			Mutation::SelectDiscussThread { thread, filter } => self.select_discuss_thread(thread, filter)?,

			Mutation::OpenChatWindow { item, mode } => self.open_chat_window(item, mode)?,
			Mutation::CloseChatWindow(item) => self.close_chat_window(&item)?,
			Mutation::ShiftChatWindow { item, direction } => self.shift_chat_window(&item, direction),
			Mutation::SwapChatWindows(a, b) => self.swap_chat_windows(&a, &b),
			Mutation::FocusChatWindow(item) => self.focus_chat_window(item),
			Mutation::AcknowledgeAutofocus(counter) => self.acknowledge_autofocus(counter),
		};

		if applied.is_change() {
			self.revision += 1;
		}
		trace!(mutation = name, revision = self.revision, ?applied, "mutation applied");
		Ok(applied)
	}
}
