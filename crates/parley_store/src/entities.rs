#![forbid(unsafe_code)]

//! Entity records held by the store. Fields are public for reading; every
//! write goes through [`crate::Mutation`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_domain::{
	AttachmentKind, ChannelType, FoldState, Identity, Mailbox, MessageId, MessageType, RecordId, ThreadRef, model,
};

use crate::attachment::FileType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partner {
	pub identity: Identity,
	pub id: i64,
	pub name: Option<String>,
	pub email: Option<String>,
	pub im_status: Option<String>,
	pub user_id: Option<i64>,
	/// Messages authored by this partner.
	pub message_identities: BTreeSet<Identity>,
}

impl Partner {
	pub(crate) fn new(id: i64) -> Self {
		Self {
			identity: Identity::partner(id),
			id,
			name: None,
			email: None,
			im_status: None,
			user_id: None,
			message_identities: BTreeSet::new(),
		}
	}

	pub fn display_name(&self) -> &str {
		self.name.as_deref().unwrap_or_default()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
	pub identity: Identity,
	pub model: String,
	pub id: RecordId,
	pub name: Option<String>,
	pub channel_type: Option<ChannelType>,
	pub public: Option<String>,
	pub uuid: Option<String>,
	pub is_pinned: bool,
	pub is_minimized: bool,
	pub fold_state: FoldState,
	pub message_unread_counter: u32,
	pub message_needaction_counter: u32,
	/// Mailbox counter (inbox needaction count, starred count, ...).
	pub counter: u32,
	pub seen_message_id: Option<i64>,
	pub last_message_id: Option<i64>,
	pub member_identities: Vec<Identity>,
	pub direct_partner: Option<Identity>,
	/// Full id list of a business-record thread, newest first.
	pub message_ids: Vec<i64>,
	pub cache_identities: Vec<Identity>,
}

impl Thread {
	pub(crate) fn new(model: String, id: RecordId) -> Self {
		Self {
			identity: Identity::thread(&model, &id),
			model,
			id,
			name: None,
			channel_type: None,
			public: None,
			uuid: None,
			is_pinned: false,
			is_minimized: false,
			fold_state: FoldState::Closed,
			message_unread_counter: 0,
			message_needaction_counter: 0,
			counter: 0,
			seen_message_id: None,
			last_message_id: None,
			member_identities: Vec::new(),
			direct_partner: None,
			message_ids: Vec::new(),
			cache_identities: Vec::new(),
		}
	}

	pub fn thread_ref(&self) -> ThreadRef {
		ThreadRef::new(self.model.clone(), self.id.clone())
	}

	pub fn is_channel(&self) -> bool {
		self.model == model::CHANNEL
	}

	pub fn is_mailbox(&self) -> bool {
		self.model == model::MAILBOX
	}

	/// Thread attached to a business record (neither channel nor mailbox).
	pub fn is_document(&self) -> bool {
		!self.is_channel() && !self.is_mailbox()
	}

	pub fn mailbox(&self) -> Option<Mailbox> {
		match (&self.id, self.is_mailbox()) {
			(RecordId::Alias(alias), true) => alias.parse().ok(),
			_ => None,
		}
	}

	pub fn is_chat(&self) -> bool {
		matches!(self.channel_type, Some(ChannelType::Chat) | Some(ChannelType::Livechat))
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadCache {
	pub identity: Identity,
	pub thread: Identity,
	pub filter: parley_domain::Filter,
	/// Sorted ascending by message id.
	pub message_identities: Vec<Identity>,
	pub loaded: bool,
	pub loading: bool,
	pub loading_more: bool,
	pub all_history_loaded: bool,
}

impl ThreadCache {
	pub(crate) fn new(thread: Identity, filter: parley_domain::Filter) -> Self {
		Self {
			identity: Identity::thread_cache(&thread, &filter),
			thread,
			filter,
			message_identities: Vec::new(),
			loaded: false,
			loading: false,
			loading_more: false,
			all_history_loaded: false,
		}
	}

	pub fn contains(&self, message: &Identity) -> bool {
		self.message_identities.contains(message)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
	pub identity: Identity,
	pub id: MessageId,
	pub author: Option<Identity>,
	pub body: String,
	pub date: Option<DateTime<Utc>>,
	pub message_type: MessageType,
	pub subtype: Option<String>,
	pub channel_ids: BTreeSet<i64>,
	/// Thread the message was posted on, if any.
	pub origin_thread: Option<Identity>,
	pub model: Option<String>,
	pub res_id: Option<i64>,
	pub record_name: Option<String>,
	pub needaction_partner_ids: BTreeSet<i64>,
	pub starred_partner_ids: BTreeSet<i64>,
	pub moderation_status: Option<String>,
	pub attachment_identities: Vec<Identity>,
	/// Derived from channels, mailboxes and origin; never set directly.
	pub thread_identities: BTreeSet<Identity>,
	pub is_transient: bool,
	pub subject: Option<String>,
	pub email_from: Option<String>,
	pub customer_email_status: Option<String>,
}

impl Message {
	pub(crate) fn new(id: MessageId) -> Self {
		Self {
			identity: Identity::message(id),
			id,
			author: None,
			body: String::new(),
			date: None,
			message_type: MessageType::Comment,
			subtype: None,
			channel_ids: BTreeSet::new(),
			origin_thread: None,
			model: None,
			res_id: None,
			record_name: None,
			needaction_partner_ids: BTreeSet::new(),
			starred_partner_ids: BTreeSet::new(),
			moderation_status: None,
			attachment_identities: Vec::new(),
			thread_identities: BTreeSet::new(),
			is_transient: false,
			subject: None,
			email_from: None,
			customer_email_status: None,
		}
	}

	pub fn is_comment(&self) -> bool {
		self.message_type == MessageType::Comment
	}

	/// Record the message was posted on (a channel or a business record).
	pub fn origin_ref(&self) -> Option<ThreadRef> {
		match (&self.model, self.res_id) {
			(Some(model), Some(res_id)) => Some(ThreadRef::new(model.clone(), res_id)),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
	Temporary,
	Uploading,
	Uploaded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
	pub identity: Identity,
	pub id: i64,
	pub filename: Option<String>,
	pub name: Option<String>,
	pub mimetype: Option<String>,
	pub url: Option<String>,
	pub kind: AttachmentKind,
	pub upload_state: UploadState,
	pub file_type: Option<FileType>,
	pub is_viewable: bool,
	pub extension: Option<String>,
	pub media_type: Option<String>,
}

impl Attachment {
	pub(crate) fn new(id: i64) -> Self {
		Self {
			identity: Identity::attachment(id),
			id,
			filename: None,
			name: None,
			mimetype: None,
			url: None,
			kind: AttachmentKind::Binary,
			upload_state: if id < 0 { UploadState::Temporary } else { UploadState::Uploaded },
			file_type: None,
			is_viewable: false,
			extension: None,
			media_type: None,
		}
	}

	pub fn is_temporary(&self) -> bool {
		self.id < 0
	}

	pub fn display_name(&self) -> &str {
		self.name.as_deref().or(self.filename.as_deref()).unwrap_or_default()
	}
}
