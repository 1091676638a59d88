#![forbid(unsafe_code)]

//! The normalized entity graph and its create/insert/update/link engine.
//!
//! Mutating methods here are crate-private; callers reach them through
//! [`Store::apply`](crate::Store::apply) so every write is named by a
//! [`Mutation`](crate::Mutation) variant.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use parley_domain::{
	AttachmentData, AttachmentFields, CannedResponse, ChannelCommand, EntityKind, Filter, Identity, InitMessagingData,
	MailFailureData, Mailbox, MessageData, MessageFields, MessageId, PartnerData, PartnerFields, SessionInfo,
	ThreadData, ThreadFields, ThreadRef,
};

use crate::attachment;
use crate::chat_window::{ChatWindowManager, DiscussState, LayoutConstants, Viewport};
use crate::entities::{Attachment, Message, Partner, Thread, ThreadCache, UploadState};
use crate::indexes::{IndexKey, IndexList, ThreadIndexes};
use crate::mutation::{Applied, CachePatch, ThreadCounter};
use crate::StoreError;

/// A recorded delivery failure for one of our messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailFailure {
	pub message_id: MessageId,
	pub record_name: Option<String>,
	pub model: Option<String>,
	pub res_id: Option<i64>,
}

/// In-memory entity graph for one connected session.
#[derive(Debug)]
pub struct Store {
	session: SessionInfo,
	pub(crate) partners: HashMap<Identity, Partner>,
	pub(crate) threads: HashMap<Identity, Thread>,
	pub(crate) thread_caches: HashMap<Identity, ThreadCache>,
	pub(crate) messages: HashMap<Identity, Message>,
	pub(crate) attachments: HashMap<Identity, Attachment>,
	pub(crate) indexes: ThreadIndexes,
	pub(crate) chat_windows: ChatWindowManager,
	pub(crate) discuss: DiscussState,
	pub(crate) viewport: Viewport,
	pub(crate) layout_constants: LayoutConstants,
	mail_failures: BTreeMap<MessageId, MailFailure>,
	canned_responses: Vec<CannedResponse>,
	commands: Vec<ChannelCommand>,
	mention_suggestions: Vec<Identity>,
	root_partner: Option<Identity>,
	public_partner: Option<Identity>,
	is_moderator: bool,
	menu_id: Option<i64>,
	next_temporary_attachment_id: i64,
	initialized: bool,
	pub(crate) revision: u64,
	changed: BTreeSet<Identity>,
}

pub(crate) fn missing(kind: EntityKind, identity: &Identity) -> StoreError {
	StoreError::Missing {
		kind,
		identity: identity.clone(),
	}
}

impl Store {
	/// Store seeded with the current partner and the always-present mailboxes.
	pub fn new(session: SessionInfo) -> Self {
		let mut store = Self {
			session,
			partners: HashMap::new(),
			threads: HashMap::new(),
			thread_caches: HashMap::new(),
			messages: HashMap::new(),
			attachments: HashMap::new(),
			indexes: ThreadIndexes::default(),
			chat_windows: ChatWindowManager::default(),
			discuss: DiscussState::default(),
			viewport: Viewport::default(),
			layout_constants: LayoutConstants::default(),
			mail_failures: BTreeMap::new(),
			canned_responses: Vec::new(),
			commands: Vec::new(),
			mention_suggestions: Vec::new(),
			root_partner: None,
			public_partner: None,
			is_moderator: false,
			menu_id: None,
			next_temporary_attachment_id: -1,
			initialized: false,
			revision: 0,
			changed: BTreeSet::new(),
		};
		store.insert_partner(store.session_partner());
		store.insert_thread(ThreadData::mailbox(Mailbox::Inbox, 0));
		store.insert_thread(ThreadData::mailbox(Mailbox::Starred, 0));
		store.changed.clear();
		store
	}

	pub fn with_layout_constants(mut self, constants: LayoutConstants) -> Self {
		self.layout_constants = constants;
		self
	}

	fn session_partner(&self) -> PartnerData {
		PartnerData {
			id: self.session.partner_id,
			fields: PartnerFields {
				name: Some(self.session.partner_display_name.clone()),
				user_id: self.session.user_id,
				..PartnerFields::default()
			},
		}
	}

	// ---- read access -------------------------------------------------

	pub fn session(&self) -> &SessionInfo {
		&self.session
	}

	pub fn current_partner_id(&self) -> i64 {
		self.session.partner_id
	}

	pub fn current_partner(&self) -> Identity {
		Identity::partner(self.session.partner_id)
	}

	pub fn partner(&self, identity: &Identity) -> Option<&Partner> {
		self.partners.get(identity)
	}

	pub fn thread(&self, identity: &Identity) -> Option<&Thread> {
		self.threads.get(identity)
	}

	pub fn thread_cache(&self, identity: &Identity) -> Option<&ThreadCache> {
		self.thread_caches.get(identity)
	}

	pub fn message(&self, identity: &Identity) -> Option<&Message> {
		self.messages.get(identity)
	}

	pub fn attachment(&self, identity: &Identity) -> Option<&Attachment> {
		self.attachments.get(identity)
	}

	pub fn partners(&self) -> impl Iterator<Item = &Partner> {
		self.partners.values()
	}

	pub fn threads(&self) -> impl Iterator<Item = &Thread> {
		self.threads.values()
	}

	pub fn thread_caches(&self) -> impl Iterator<Item = &ThreadCache> {
		self.thread_caches.values()
	}

	pub fn messages(&self) -> impl Iterator<Item = &Message> {
		self.messages.values()
	}

	pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
		self.attachments.values()
	}

	/// Messages of a cache in ascending id order.
	pub fn cache_messages<'a>(&'a self, cache: &'a ThreadCache) -> impl Iterator<Item = &'a Message> + 'a {
		cache.message_identities.iter().filter_map(|id| self.messages.get(id))
	}

	pub fn max_message_id(&self) -> Option<MessageId> {
		self.messages.values().map(|m| m.id).max()
	}

	pub fn mail_failures(&self) -> impl Iterator<Item = &MailFailure> {
		self.mail_failures.values()
	}

	pub fn canned_responses(&self) -> &[CannedResponse] {
		&self.canned_responses
	}

	pub fn commands(&self) -> &[ChannelCommand] {
		&self.commands
	}

	pub fn mention_suggestions(&self) -> impl Iterator<Item = &Partner> {
		self.mention_suggestions.iter().filter_map(|id| self.partners.get(id))
	}

	/// The well-known bot partner, author of transient messages.
	pub fn root_partner(&self) -> Option<&Identity> {
		self.root_partner.as_ref()
	}

	pub fn public_partner(&self) -> Option<&Identity> {
		self.public_partner.as_ref()
	}

	pub fn is_moderator(&self) -> bool {
		self.is_moderator
	}

	pub fn menu_id(&self) -> Option<i64> {
		self.menu_id
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized
	}

	/// Bumped once per committed mutation.
	pub fn revision(&self) -> u64 {
		self.revision
	}

	/// Identities touched since the last call.
	pub fn take_changes(&mut self) -> BTreeSet<Identity> {
		std::mem::take(&mut self.changed)
	}

	/// Name shown for a thread: the other partner for chats, a label for mailboxes.
	pub fn thread_display_name(&self, thread: &Thread) -> String {
		if let Some(mailbox) = thread.mailbox() {
			return match mailbox {
				Mailbox::Inbox => "Inbox",
				Mailbox::Starred => "Starred",
				Mailbox::Moderation => "Moderation",
			}
			.to_string();
		}
		if thread.is_chat()
			&& let Some(partner) = thread.direct_partner.as_ref().and_then(|p| self.partners.get(p))
			&& let Some(name) = &partner.name
		{
			return name.clone();
		}
		thread.name.clone().unwrap_or_default()
	}

	/// Channels with unread messages plus the inbox counter.
	pub fn global_unread_counter(&self) -> u32 {
		let unread_channels = self
			.threads
			.values()
			.filter(|t| t.is_channel() && t.message_unread_counter > 0)
			.count();
		let inbox = self
			.threads
			.get(&Mailbox::Inbox.identity())
			.map(|t| t.counter)
			.unwrap_or_default();
		u32::try_from(unread_channels).unwrap_or(u32::MAX).saturating_add(inbox)
	}

	pub fn pinned_channels(&self) -> Vec<&Thread> {
		self.indexed(IndexList::PinnedChannels)
	}

	pub fn pinned_chats(&self) -> Vec<&Thread> {
		self.indexed(IndexList::PinnedChats)
	}

	pub fn mailboxes(&self) -> Vec<&Thread> {
		self.indexed(IndexList::Mailboxes)
	}

	fn indexed(&self, list: IndexList) -> Vec<&Thread> {
		self.indexes.list(list).filter_map(|id| self.threads.get(id)).collect()
	}

	// ---- bookkeeping -------------------------------------------------

	pub(crate) fn touch(&mut self, identity: &Identity) {
		self.changed.insert(identity.clone());
	}

	pub(crate) fn require(&self, kind: EntityKind, identity: &Identity) -> Result<(), StoreError> {
		let present = match kind {
			EntityKind::Partner => self.partners.contains_key(identity),
			EntityKind::Thread => self.threads.contains_key(identity),
			EntityKind::ThreadCache => self.thread_caches.contains_key(identity),
			EntityKind::Message => self.messages.contains_key(identity),
			EntityKind::Attachment => self.attachments.contains_key(identity),
		};
		if present { Ok(()) } else { Err(missing(kind, identity)) }
	}

	fn duplicate(kind: EntityKind, identity: Identity) -> Applied {
		warn!(kind = %kind, identity = %identity, "entity already exists; create ignored");
		Applied::Duplicate(identity)
	}

	// ---- partners ----------------------------------------------------

	pub(crate) fn create_partner(&mut self, data: PartnerData) -> Applied {
		let identity = Identity::partner(data.id);
		if self.partners.contains_key(&identity) {
			return Self::duplicate(EntityKind::Partner, identity);
		}
		self.partners.insert(identity.clone(), Partner::new(data.id));
		self.merge_partner_fields(&identity, data.fields);
		Applied::Created(identity)
	}

	pub(crate) fn insert_partner(&mut self, data: PartnerData) -> Applied {
		let identity = Identity::partner(data.id);
		if !self.partners.contains_key(&identity) {
			return self.create_partner(data);
		}
		self.merge_partner_fields(&identity, data.fields);
		Applied::Updated(identity)
	}

	pub(crate) fn update_partner(&mut self, identity: &Identity, changes: PartnerFields) -> Result<Applied, StoreError> {
		self.require(EntityKind::Partner, identity)?;
		self.merge_partner_fields(identity, changes);
		Ok(Applied::Updated(identity.clone()))
	}

	fn upsert_partner(&mut self, data: PartnerData) -> Identity {
		let identity = Identity::partner(data.id);
		self.insert_partner(data);
		identity
	}

	fn merge_partner_fields(&mut self, identity: &Identity, fields: PartnerFields) {
		let Some(partner) = self.partners.get_mut(identity) else {
			return;
		};
		let renamed = fields.name.is_some() && fields.name != partner.name;
		if let Some(name) = fields.name {
			partner.name = Some(name);
		}
		if let Some(email) = fields.email {
			partner.email = Some(email);
		}
		if let Some(im_status) = fields.im_status {
			partner.im_status = Some(im_status);
		}
		if let Some(user_id) = fields.user_id {
			partner.user_id = Some(user_id);
		}
		self.touch(identity);

		if renamed {
			let chats: Vec<Identity> = self
				.threads
				.values()
				.filter(|t| t.direct_partner.as_ref() == Some(identity))
				.map(|t| t.identity.clone())
				.collect();
			for chat in chats {
				self.refresh_thread_index(&chat);
			}
		}
	}

	// ---- threads -----------------------------------------------------

	pub(crate) fn create_thread(&mut self, data: ThreadData) -> Applied {
		let identity = Identity::thread(&data.model, &data.id);
		if self.threads.contains_key(&identity) {
			return Self::duplicate(EntityKind::Thread, identity);
		}
		self.threads.insert(identity.clone(), Thread::new(data.model, data.id));
		self.merge_thread_fields(&identity, data.fields);
		debug!(thread = %identity, "thread created");
		Applied::Created(identity)
	}

	pub(crate) fn insert_thread(&mut self, data: ThreadData) -> Applied {
		let identity = Identity::thread(&data.model, &data.id);
		if !self.threads.contains_key(&identity) {
			return self.create_thread(data);
		}
		self.merge_thread_fields(&identity, data.fields);
		Applied::Updated(identity)
	}

	pub(crate) fn update_thread(&mut self, identity: &Identity, changes: ThreadFields) -> Result<Applied, StoreError> {
		self.require(EntityKind::Thread, identity)?;
		self.merge_thread_fields(identity, changes);
		Ok(Applied::Updated(identity.clone()))
	}

	pub(crate) fn ensure_thread(&mut self, thread: &ThreadRef) -> Identity {
		let identity = thread.identity();
		if !self.threads.contains_key(&identity) {
			self.create_thread(ThreadData::new(thread.model.clone(), thread.id.clone()));
		}
		identity
	}

	fn merge_thread_fields(&mut self, identity: &Identity, fields: ThreadFields) {
		let direct_partner = fields.direct_partner.map(|partners| {
			let partners: Vec<Identity> = partners.into_iter().map(|p| self.upsert_partner(p)).collect();
			partners.into_iter().next()
		});
		let members = fields
			.members
			.map(|partners| partners.into_iter().map(|p| self.upsert_partner(p)).collect::<Vec<_>>());

		let Some(thread) = self.threads.get_mut(identity) else {
			return;
		};
		if let Some(name) = fields.name {
			thread.name = Some(name);
		}
		if let Some(channel_type) = fields.channel_type {
			thread.channel_type = Some(channel_type);
		}
		if let Some(public) = fields.public {
			thread.public = Some(public);
		}
		if let Some(uuid) = fields.uuid {
			thread.uuid = Some(uuid);
		}
		if let Some(is_pinned) = fields.is_pinned {
			thread.is_pinned = is_pinned;
		}
		if let Some(is_minimized) = fields.is_minimized {
			thread.is_minimized = is_minimized;
		}
		if let Some(fold_state) = fields.fold_state {
			thread.fold_state = fold_state;
		}
		if let Some(n) = fields.message_unread_counter {
			thread.message_unread_counter = n;
		}
		if let Some(n) = fields.message_needaction_counter {
			thread.message_needaction_counter = n;
		}
		if let Some(n) = fields.counter {
			thread.counter = n;
		}
		if let Some(id) = fields.seen_message_id {
			thread.seen_message_id = Some(id);
		}
		if let Some(id) = fields.last_message_id {
			thread.last_message_id = Some(id);
		}
		if let Some(ids) = fields.message_ids {
			thread.message_ids = ids;
		}
		if let Some(direct_partner) = direct_partner {
			thread.direct_partner = direct_partner;
		}
		if let Some(members) = members {
			thread.member_identities = members;
		}
		self.touch(identity);
		self.refresh_thread_index(identity);
	}

	pub(crate) fn adjust_thread_counter(
		&mut self,
		identity: &Identity,
		counter: ThreadCounter,
		delta: i64,
	) -> Result<Applied, StoreError> {
		let thread = self
			.threads
			.get_mut(identity)
			.ok_or_else(|| missing(EntityKind::Thread, identity))?;
		let slot = match counter {
			ThreadCounter::Unread => &mut thread.message_unread_counter,
			ThreadCounter::Needaction => &mut thread.message_needaction_counter,
			ThreadCounter::Mailbox => &mut thread.counter,
		};
		let next = u32::try_from((i64::from(*slot) + delta).max(0)).unwrap_or(u32::MAX);
		if next == *slot {
			return Ok(Applied::Unchanged);
		}
		*slot = next;
		self.touch(identity);
		Ok(Applied::Updated(identity.clone()))
	}

	pub(crate) fn refresh_thread_index(&mut self, identity: &Identity) {
		let Some(thread) = self.threads.get(identity) else {
			return;
		};
		let name = self.thread_display_name(thread).to_lowercase();
		let placement = if thread.is_mailbox() {
			let priority = thread.mailbox().map(Mailbox::priority).unwrap_or(u8::MAX);
			Some((IndexList::Mailboxes, IndexKey::new(priority, name, thread.id.clone())))
		} else if thread.is_channel() && thread.is_pinned {
			let list = if thread.is_chat() {
				IndexList::PinnedChats
			} else {
				IndexList::PinnedChannels
			};
			Some((list, IndexKey::new(0, name, thread.id.clone())))
		} else {
			None
		};
		self.indexes.place(identity, placement);
	}

	// ---- thread caches -----------------------------------------------

	pub(crate) fn create_thread_cache(&mut self, thread: &Identity, filter: Filter) -> Result<Applied, StoreError> {
		let cache = ThreadCache::new(thread.clone(), filter);
		let identity = cache.identity.clone();
		let owner = self
			.threads
			.get_mut(thread)
			.ok_or_else(|| missing(EntityKind::Thread, thread))?;
		if self.thread_caches.contains_key(&identity) {
			return Ok(Self::duplicate(EntityKind::ThreadCache, identity));
		}
		owner.cache_identities.push(identity.clone());
		self.thread_caches.insert(identity.clone(), cache);
		self.touch(thread);
		self.touch(&identity);
		Ok(Applied::Created(identity))
	}

	pub(crate) fn insert_thread_cache(&mut self, thread: &Identity, filter: Filter) -> Result<Applied, StoreError> {
		if self.thread_caches.contains_key(&Identity::thread_cache(thread, &filter)) {
			return Ok(Applied::Unchanged);
		}
		self.create_thread_cache(thread, filter)
	}

	pub(crate) fn ensure_thread_cache(&mut self, thread: &Identity, filter: &Filter) -> Result<Identity, StoreError> {
		let identity = Identity::thread_cache(thread, filter);
		if !self.thread_caches.contains_key(&identity) {
			self.create_thread_cache(thread, filter.clone())?;
		}
		Ok(identity)
	}

	pub(crate) fn update_thread_cache(&mut self, identity: &Identity, changes: CachePatch) -> Result<Applied, StoreError> {
		let cache = self
			.thread_caches
			.get_mut(identity)
			.ok_or_else(|| missing(EntityKind::ThreadCache, identity))?;
		if let Some(loading) = changes.loading {
			cache.loading = loading;
			if loading {
				cache.loaded = false;
			}
		}
		if let Some(loaded) = changes.loaded {
			cache.loaded = loaded;
			if loaded {
				cache.loading = false;
			}
		}
		if let Some(loading_more) = changes.loading_more {
			cache.loading_more = loading_more;
		}
		if let Some(all_history_loaded) = changes.all_history_loaded {
			cache.all_history_loaded = all_history_loaded;
		}
		self.touch(identity);
		Ok(Applied::Updated(identity.clone()))
	}

	pub(crate) fn link_message_to_cache(&mut self, message: &Identity, cache: &Identity) -> Result<Applied, StoreError> {
		let id = self
			.messages
			.get(message)
			.ok_or_else(|| missing(EntityKind::Message, message))?
			.id;
		let messages = &self.messages;
		let entry = self
			.thread_caches
			.get_mut(cache)
			.ok_or_else(|| missing(EntityKind::ThreadCache, cache))?;
		if entry.message_identities.contains(message) {
			return Ok(Applied::Unchanged);
		}
		let position = entry
			.message_identities
			.partition_point(|other| messages.get(other).is_some_and(|m| m.id < id));
		entry.message_identities.insert(position, message.clone());
		self.touch(cache);
		Ok(Applied::Updated(cache.clone()))
	}

	pub(crate) fn unlink_message_from_cache(
		&mut self,
		message: &Identity,
		cache: &Identity,
	) -> Result<Applied, StoreError> {
		let entry = self
			.thread_caches
			.get_mut(cache)
			.ok_or_else(|| missing(EntityKind::ThreadCache, cache))?;
		let Some(position) = entry.message_identities.iter().position(|m| m == message) else {
			return Ok(Applied::Unchanged);
		};
		entry.message_identities.remove(position);
		self.touch(cache);
		Ok(Applied::Updated(cache.clone()))
	}

	// ---- messages ----------------------------------------------------

	pub(crate) fn create_message(&mut self, data: MessageData) -> Result<Applied, StoreError> {
		let identity = Identity::message(data.id);
		if self.messages.contains_key(&identity) {
			return Ok(Self::duplicate(EntityKind::Message, identity));
		}
		self.messages.insert(identity.clone(), Message::new(data.id));
		self.merge_message_fields(&identity, data.fields)?;
		Ok(Applied::Created(identity))
	}

	pub(crate) fn insert_message(&mut self, data: MessageData) -> Result<Applied, StoreError> {
		let identity = Identity::message(data.id);
		if !self.messages.contains_key(&identity) {
			return self.create_message(data);
		}
		self.merge_message_fields(&identity, data.fields)?;
		Ok(Applied::Updated(identity))
	}

	pub(crate) fn update_message(&mut self, identity: &Identity, changes: MessageFields) -> Result<Applied, StoreError> {
		self.require(EntityKind::Message, identity)?;
		self.merge_message_fields(identity, changes)?;
		Ok(Applied::Updated(identity.clone()))
	}

	fn merge_message_fields(&mut self, identity: &Identity, fields: MessageFields) -> Result<(), StoreError> {
		let author = fields
			.author_id
			.as_ref()
			.map(|relation| self.upsert_partner(PartnerData::from(relation)));
		let attachments = fields
			.attachment_ids
			.map(|list| list.into_iter().map(|a| self.upsert_attachment(a)).collect::<Vec<_>>());

		let message = self
			.messages
			.get_mut(identity)
			.ok_or_else(|| missing(EntityKind::Message, identity))?;
		let previous_author = message.author.clone();
		if let Some(author) = author {
			message.author = Some(author);
		}
		if let Some(body) = fields.body {
			message.body = body;
		}
		if let Some(date) = fields.date {
			message.date = Some(date);
		}
		if let Some(message_type) = fields.message_type {
			message.message_type = message_type;
		}
		if let Some(subtype) = fields.subtype_id {
			message.subtype = subtype.name;
		}
		if let Some(channel_ids) = fields.channel_ids {
			message.channel_ids = channel_ids.into_iter().collect();
		}
		if let Some(model) = fields.model {
			message.model = Some(model);
		}
		if let Some(res_id) = fields.res_id {
			message.res_id = Some(res_id);
		}
		if let Some(record_name) = fields.record_name {
			message.record_name = Some(record_name);
		}
		if let Some(ids) = fields.needaction_partner_ids {
			message.needaction_partner_ids = ids.into_iter().collect();
		}
		if let Some(ids) = fields.starred_partner_ids {
			message.starred_partner_ids = ids.into_iter().collect();
		}
		if let Some(status) = fields.moderation_status {
			message.moderation_status = Some(status);
		}
		if let Some(attachments) = attachments {
			message.attachment_identities = attachments;
		}
		if let Some(subject) = fields.subject {
			message.subject = Some(subject);
		}
		if let Some(email_from) = fields.email_from {
			message.email_from = Some(email_from);
		}
		if let Some(status) = fields.customer_email_status {
			message.customer_email_status = Some(status);
		}
		if let Some(is_transient) = fields.is_transient {
			message.is_transient = is_transient;
		}
		message.origin_thread = message.origin_ref().map(|origin| origin.identity());
		let current_author = message.author.clone();

		if previous_author != current_author {
			if let Some(partner) = previous_author.as_ref().and_then(|a| self.partners.get_mut(a)) {
				partner.message_identities.remove(identity);
			}
			if let Some(partner) = current_author.as_ref().and_then(|a| self.partners.get_mut(a)) {
				partner.message_identities.insert(identity.clone());
			}
		}
		self.touch(identity);
		self.relink_message(identity)
	}

	/// Threads a message belongs to, derived from its source fields.
	pub(crate) fn membership_of(&self, message: &Message) -> Vec<ThreadRef> {
		let me = self.session.partner_id;
		let mut threads: Vec<ThreadRef> = message.channel_ids.iter().map(|id| ThreadRef::channel(*id)).collect();
		if message.needaction_partner_ids.contains(&me) {
			threads.push(ThreadRef::mailbox(Mailbox::Inbox));
		}
		if message.starred_partner_ids.contains(&me) {
			threads.push(ThreadRef::mailbox(Mailbox::Starred));
		}
		if self.is_moderator && message.moderation_status.as_deref() == Some("pending_moderation") {
			threads.push(ThreadRef::mailbox(Mailbox::Moderation));
		}
		if let Some(origin) = message.origin_ref() {
			threads.push(origin);
		}
		threads
	}

	/// Diff the derived membership against the previous one: unlink from every
	/// cache of threads left, link into the default cache of threads joined.
	fn relink_message(&mut self, identity: &Identity) -> Result<(), StoreError> {
		let message = self
			.messages
			.get(identity)
			.ok_or_else(|| missing(EntityKind::Message, identity))?;
		let targets = self.membership_of(message);
		let previous = message.thread_identities.clone();
		let next: BTreeSet<Identity> = targets.iter().map(ThreadRef::identity).collect();
		if previous == next {
			return Ok(());
		}

		for left in previous.difference(&next) {
			let caches = self
				.threads
				.get(left)
				.map(|t| t.cache_identities.clone())
				.unwrap_or_default();
			for cache in &caches {
				self.unlink_message_from_cache(identity, cache)?;
			}
		}
		for target in targets.iter().filter(|t| !previous.contains(&t.identity())) {
			let thread = self.ensure_thread(target);
			let cache = self.ensure_thread_cache(&thread, &Filter::empty())?;
			self.link_message_to_cache(identity, &cache)?;
		}

		if let Some(message) = self.messages.get_mut(identity) {
			message.thread_identities = next;
		}
		Ok(())
	}

	pub(crate) fn delete_message(&mut self, identity: &Identity) -> Result<Applied, StoreError> {
		let message = self
			.messages
			.remove(identity)
			.ok_or_else(|| missing(EntityKind::Message, identity))?;
		let caches: Vec<Identity> = self
			.thread_caches
			.values()
			.filter(|c| c.contains(identity))
			.map(|c| c.identity.clone())
			.collect();
		for cache in &caches {
			if let Some(entry) = self.thread_caches.get_mut(cache) {
				entry.message_identities.retain(|m| m != identity);
			}
			self.touch(cache);
		}
		if let Some(partner) = message.author.as_ref().and_then(|a| self.partners.get_mut(a)) {
			partner.message_identities.remove(identity);
		}
		self.touch(identity);
		Ok(Applied::Removed(identity.clone()))
	}

	// ---- attachments -------------------------------------------------

	pub(crate) fn create_attachment(&mut self, data: AttachmentData) -> Applied {
		let identity = Identity::attachment(data.id);
		if self.attachments.contains_key(&identity) {
			return Self::duplicate(EntityKind::Attachment, identity);
		}
		self.attachments.insert(identity.clone(), Attachment::new(data.id));
		self.merge_attachment_fields(&identity, data.fields);
		Applied::Created(identity)
	}

	pub(crate) fn insert_attachment(&mut self, data: AttachmentData) -> Applied {
		let identity = Identity::attachment(data.id);
		if !self.attachments.contains_key(&identity) {
			return self.create_attachment(data);
		}
		self.merge_attachment_fields(&identity, data.fields);
		Applied::Updated(identity)
	}

	pub(crate) fn update_attachment(
		&mut self,
		identity: &Identity,
		changes: AttachmentFields,
	) -> Result<Applied, StoreError> {
		self.require(EntityKind::Attachment, identity)?;
		self.merge_attachment_fields(identity, changes);
		Ok(Applied::Updated(identity.clone()))
	}

	fn upsert_attachment(&mut self, data: AttachmentData) -> Identity {
		let identity = Identity::attachment(data.id);
		self.insert_attachment(data);
		identity
	}

	/// Temporary attachment with the next negative id, in uploading state.
	pub(crate) fn create_temporary_attachment(&mut self, filename: String, mimetype: Option<String>) -> Applied {
		let id = self.next_temporary_attachment_id;
		self.next_temporary_attachment_id -= 1;
		self.create_attachment(AttachmentData {
			id,
			fields: AttachmentFields {
				filename: Some(filename.clone()),
				name: Some(filename),
				mimetype,
				uploading: Some(true),
				..AttachmentFields::default()
			},
		})
	}

	fn merge_attachment_fields(&mut self, identity: &Identity, fields: AttachmentFields) {
		let Some(attachment) = self.attachments.get_mut(identity) else {
			return;
		};
		if let Some(filename) = fields.filename {
			attachment.filename = Some(filename);
		}
		if let Some(name) = fields.name {
			attachment.name = Some(name);
		}
		if let Some(mimetype) = fields.mimetype {
			attachment.mimetype = Some(mimetype);
		}
		if let Some(kind) = fields.kind {
			attachment.kind = kind;
		}
		if let Some(url) = fields.url {
			attachment.url = Some(url);
		}
		if let Some(uploading) = fields.uploading {
			attachment.upload_state = match (uploading, attachment.is_temporary()) {
				(true, _) => UploadState::Uploading,
				(false, true) => UploadState::Temporary,
				(false, false) => UploadState::Uploaded,
			};
		}
		attachment.file_type = attachment::classify(attachment.kind, attachment.mimetype.as_deref(), attachment.url.as_deref());
		attachment.is_viewable = attachment.file_type.is_some();
		attachment.extension = attachment
			.filename
			.as_deref()
			.or(attachment.name.as_deref())
			.and_then(attachment::extension);
		attachment.media_type = attachment.mimetype.as_deref().and_then(attachment::media_type);
		self.touch(identity);
	}

	pub(crate) fn delete_attachment(&mut self, identity: &Identity) -> Result<Applied, StoreError> {
		self.attachments
			.remove(identity)
			.ok_or_else(|| missing(EntityKind::Attachment, identity))?;
		let referencing: Vec<Identity> = self
			.messages
			.values()
			.filter(|m| m.attachment_identities.contains(identity))
			.map(|m| m.identity.clone())
			.collect();
		for message in &referencing {
			if let Some(entry) = self.messages.get_mut(message) {
				entry.attachment_identities.retain(|a| a != identity);
			}
			self.touch(message);
		}
		self.touch(identity);
		Ok(Applied::Removed(identity.clone()))
	}

	// ---- mail failures -----------------------------------------------

	pub(crate) fn set_mail_failure(&mut self, data: MailFailureData) -> Applied {
		let failed = data.has_failure();
		if failed {
			self.mail_failures.insert(
				data.message_id,
				MailFailure {
					message_id: data.message_id,
					record_name: data.record_name,
					model: data.model,
					res_id: data.res_id,
				},
			);
		} else {
			self.mail_failures.remove(&data.message_id);
		}
		let identity = Identity::message(data.message_id);
		if let Some(message) = self.messages.get_mut(&identity) {
			let status = if failed { "exception" } else { "sent" };
			message.customer_email_status = Some(status.to_string());
			self.touch(&identity);
		}
		Applied::Changed
	}

	// ---- session initialisation --------------------------------------

	pub(crate) fn init_messaging(&mut self, data: InitMessagingData) -> Applied {
		let suggestions: Vec<PartnerData> = data.mention_suggestions().cloned().collect();

		self.insert_partner(self.session_partner());
		if let Some(root) = data.partner_root {
			self.root_partner = Some(self.upsert_partner(root));
		}
		if let Some(public) = data.public_partner {
			self.public_partner = Some(self.upsert_partner(public));
		}

		self.is_moderator = data.is_moderator;
		self.insert_thread(ThreadData::mailbox(Mailbox::Inbox, data.needaction_inbox_counter));
		self.insert_thread(ThreadData::mailbox(Mailbox::Starred, data.starred_counter));
		if data.is_moderator {
			self.insert_thread(ThreadData::mailbox(Mailbox::Moderation, data.moderation_counter));
		}

		for channel in data.channel_slots.into_values().flatten() {
			self.insert_thread(ThreadData::channel(channel));
		}
		for failure in data.mail_failures {
			self.set_mail_failure(failure);
		}
		let suggestions: Vec<Identity> = suggestions.into_iter().map(|p| self.upsert_partner(p)).collect();
		self.mention_suggestions = suggestions;
		self.canned_responses = data.shortcodes;
		self.commands = data.commands;
		self.menu_id = data.menu_id;
		self.initialized = true;
		debug!(
			threads = self.threads.len(),
			partners = self.partners.len(),
			"messaging initialised"
		);
		Applied::Changed
	}
}

