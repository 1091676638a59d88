#![forbid(unsafe_code)]

//! Real-time notification router: turns bus notifications into store
//! mutations.
//!
//! A batch is routed entry by entry, in order. Unknown model kinds and
//! malformed payloads are logged and skipped; store precondition failures
//! abort the batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use parley_domain::{
	ChannelInfo, Identity, Mailbox, MailFailureData, Many2One, MessageData, MessageFields, MessageId, ThreadData,
	ThreadFields, model,
};
use parley_store::{ChatWindowItem, Mutation, OpenMode, Store, ThreadCounter};

use crate::events::UiEvent;
use crate::{ClientCoreError, Messaging, decode};

/// `[database, model, target]` head of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, String, Value)", into = "(String, String, Value)")]
pub struct NotificationChannel {
	pub database: String,
	pub model: String,
	/// Channel id for `mail.channel`, partner id for `res.partner`.
	pub target: Value,
}

impl NotificationChannel {
	pub fn new(database: impl Into<String>, model: impl Into<String>, target: impl Into<Value>) -> Self {
		Self {
			database: database.into(),
			model: model.into(),
			target: target.into(),
		}
	}
}

impl From<(String, String, Value)> for NotificationChannel {
	fn from((database, model, target): (String, String, Value)) -> Self {
		Self { database, model, target }
	}
}

impl From<NotificationChannel> for (String, String, Value) {
	fn from(channel: NotificationChannel) -> Self {
		(channel.database, channel.model, channel.target)
	}
}

/// One `[channel, payload]` entry of a bus batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(NotificationChannel, Value)", into = "(NotificationChannel, Value)")]
pub struct Notification {
	pub channel: NotificationChannel,
	pub payload: Value,
}

impl Notification {
	pub fn new(channel: NotificationChannel, payload: Value) -> Self {
		Self { channel, payload }
	}

	fn field(&self, key: &str) -> Option<&str> {
		self.payload.get(key).and_then(Value::as_str)
	}

	fn unsubscribed_channel(&self) -> Option<i64> {
		(self.channel.model == model::PARTNER && self.field("info") == Some("unsubscribe"))
			.then(|| self.payload.get("id").and_then(Value::as_i64))
			.flatten()
	}
}

impl From<(NotificationChannel, Value)> for Notification {
	fn from((channel, payload): (NotificationChannel, Value)) -> Self {
		Self { channel, payload }
	}
}

impl From<Notification> for (NotificationChannel, Value) {
	fn from(notification: Notification) -> Self {
		(notification.channel, notification.payload)
	}
}

/// Drop every channel entry that targets a channel unsubscribed from in the
/// same batch.
pub fn filter_unsubscribed(batch: Vec<Notification>) -> Vec<Notification> {
	let unsubscribed: BTreeSet<i64> = batch.iter().filter_map(Notification::unsubscribed_channel).collect();
	if unsubscribed.is_empty() {
		return batch;
	}
	batch
		.into_iter()
		.filter(|n| {
			let dropped = n.channel.model == model::CHANNEL
				&& n.channel.target.as_i64().is_some_and(|id| unsubscribed.contains(&id));
			if dropped {
				debug!(channel = %n.channel.target, "notification dropped: channel unsubscribed in batch");
			}
			!dropped
		})
		.collect()
}

/// Where a notification goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
	Needaction,
	ChannelSeen { channel: i64 },
	ChannelMessage { channel: i64 },
	MailFailure,
	MarkAsRead,
	ToggleStar,
	TransientMessage,
	Unsubscribe,
	UserConnection,
	PartnerChannel,
	/// Known notification of a disabled feature.
	Ignored(&'static str),
	Unknown,
}

impl Route {
	pub fn of(notification: &Notification) -> Self {
		let kind = notification.field("type");
		let info = notification.field("info");
		match notification.channel.model.as_str() {
			model::NEEDACTION => Route::Needaction,
			model::CHANNEL => {
				let Some(channel) = notification.channel.target.as_i64() else {
					return Route::Unknown;
				};
				match info.or(kind) {
					Some("channel_fetched") => Route::Ignored("channel_fetched"),
					Some("typing_status") => Route::Ignored("typing_status"),
					Some("channel_seen") => Route::ChannelSeen { channel },
					_ => Route::ChannelMessage { channel },
				}
			}
			model::PARTNER => match (kind, info) {
				(Some("activity_updated"), _) => Route::Ignored("activity_updated"),
				(Some("author"), _) => Route::Ignored("author"),
				(Some("deletion"), _) => Route::Ignored("deletion"),
				(Some("moderator"), _) => Route::Ignored("moderator"),
				(Some("mail_failure"), _) => Route::MailFailure,
				(Some("mark_as_read"), _) => Route::MarkAsRead,
				(Some("toggle_star"), _) => Route::ToggleStar,
				(_, Some("transient_message")) => Route::TransientMessage,
				(_, Some("unsubscribe")) => Route::Unsubscribe,
				(Some("user_connection"), _) => Route::UserConnection,
				_ => Route::PartnerChannel,
			},
			_ => Route::Unknown,
		}
	}
}

#[derive(Debug, Deserialize)]
struct ChannelSeen {
	partner_id: i64,
	last_message_id: i64,
}

#[derive(Debug, Deserialize)]
struct MailFailures {
	#[serde(default)]
	elements: Vec<MailFailureData>,
}

#[derive(Debug, Deserialize)]
struct MarkAsRead {
	message_ids: Vec<i64>,
	#[serde(default)]
	channel_ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct ToggleStar {
	message_ids: Vec<i64>,
	starred: bool,
}

#[derive(Debug, Deserialize)]
struct Unsubscribe {
	id: i64,
}

#[derive(Debug, Deserialize)]
struct UserConnection {
	#[serde(default)]
	title: Option<String>,
	message: String,
}

#[derive(Debug, Deserialize)]
struct PartnerChannel {
	#[serde(default)]
	info: Option<String>,
	#[serde(flatten)]
	channel: ChannelInfo,
}

fn adjust(thread: Identity, counter: ThreadCounter, delta: i64) -> Mutation {
	Mutation::AdjustThreadCounter { thread, counter, delta }
}

fn delta(len: usize) -> i64 {
	i64::try_from(len).unwrap_or(i64::MAX)
}

impl Messaging {
	/// Route one bus batch. Returns how many entries were handled.
	pub async fn handle_notifications(&self, batch: Vec<Notification>) -> Result<usize, ClientCoreError> {
		let mut handled = 0;
		for notification in filter_unsubscribed(batch) {
			let route = Route::of(&notification);
			match route {
				Route::Ignored(kind) => {
					debug!(model = %notification.channel.model, kind, "notification ignored");
					continue;
				}
				Route::Unknown => {
					warn!(model = %notification.channel.model, "unknown notification skipped");
					continue;
				}
				_ => {}
			}
			match self.route(route, notification.payload).await {
				Ok(()) => handled += 1,
				Err(err @ (ClientCoreError::Remote(_) | ClientCoreError::Decode { .. })) => {
					warn!(route = ?route, error = %err, "notification skipped");
				}
				Err(err) => return Err(err),
			}
		}
		Ok(handled)
	}

	async fn route(&self, route: Route, payload: Value) -> Result<(), ClientCoreError> {
		match route {
			Route::Needaction => self.on_needaction(decode("needaction message", payload)?),
			Route::ChannelSeen { channel } => self.on_channel_seen(channel, decode("channel seen", payload)?),
			Route::ChannelMessage { channel } => self.on_channel_message(channel, decode("channel message", payload)?).await,
			Route::MailFailure => self.on_mail_failure(decode("mail failure", payload)?),
			Route::MarkAsRead => self.on_mark_as_read(decode("mark as read", payload)?),
			Route::ToggleStar => self.on_toggle_star(decode("toggle star", payload)?),
			Route::TransientMessage => self.on_transient_message(decode("transient message", payload)?),
			Route::Unsubscribe => self.on_unsubscribe(decode("unsubscribe", payload)?),
			Route::UserConnection => {
				let connection: UserConnection = decode("user connection", payload)?;
				self.emit(UiEvent::Notify {
					title: connection.title,
					message: connection.message,
					sticky: false,
				});
				Ok(())
			}
			Route::PartnerChannel => self.on_partner_channel(decode("channel info", payload)?),
			Route::Ignored(_) | Route::Unknown => Ok(()),
		}
	}

	fn on_needaction(&self, message: MessageData) -> Result<(), ClientCoreError> {
		let channels = message.fields.channel_ids.clone().unwrap_or_default();
		self.store().update(|store| {
			let me = store.current_partner_id();
			let counted = store
				.message(&Identity::message(message.id))
				.is_some_and(|m| m.needaction_partner_ids.contains(&me));
			store.apply(Mutation::InsertMessage(message))?;
			if counted {
				return Ok(());
			}
			store.apply(adjust(Mailbox::Inbox.identity(), ThreadCounter::Mailbox, 1))?;
			for id in channels {
				let channel = Identity::channel(id);
				if store.thread(&channel).is_some() {
					store.apply(adjust(channel, ThreadCounter::Needaction, 1))?;
				}
			}
			Ok(())
		})
	}

	fn on_channel_seen(&self, channel: i64, seen: ChannelSeen) -> Result<(), ClientCoreError> {
		self.store().update(|store| {
			let thread = Identity::channel(channel);
			if seen.partner_id != store.current_partner_id() || store.thread(&thread).is_none() {
				return Ok(());
			}
			store.apply(Mutation::UpdateThread {
				thread,
				changes: ThreadFields {
					seen_message_id: Some(seen.last_message_id),
					message_unread_counter: Some(0),
					..ThreadFields::default()
				},
			})?;
			Ok(())
		})
	}

	async fn on_channel_message(&self, channel: i64, mut message: MessageData) -> Result<(), ClientCoreError> {
		let thread = Identity::channel(channel);
		if self.store().read(|store| store.thread(&thread).is_none()) {
			self.fetch_joined_channel(channel).await?;
		}
		message.fields.channel_ids.get_or_insert_with(|| vec![channel]);
		self.store().update(|store| {
			let identity = Identity::message(message.id);
			let is_new = store.message(&identity).is_none();
			let from_me = message
				.fields
				.author_id
				.as_ref()
				.is_some_and(|author| author.id == store.current_partner_id());
			store.apply(Mutation::InsertMessage(message))?;
			if is_new && !from_me {
				store.apply(adjust(thread, ThreadCounter::Unread, 1))?;
			}
			Ok(())
		})
	}

	fn on_mail_failure(&self, failures: MailFailures) -> Result<(), ClientCoreError> {
		self.store().update(|store| {
			for failure in failures.elements {
				store.apply(Mutation::SetMailFailure(failure))?;
			}
			Ok(())
		})
	}

	fn on_mark_as_read(&self, read: MarkAsRead) -> Result<(), ClientCoreError> {
		self.store().update(|store| {
			let me = store.current_partner_id();
			for id in &read.message_ids {
				let message = Identity::message(MessageId::from(*id));
				let Some(entry) = store.message(&message) else {
					continue;
				};
				let remaining: Vec<i64> = entry.needaction_partner_ids.iter().copied().filter(|p| *p != me).collect();
				store.apply(Mutation::UpdateMessage {
					message,
					changes: MessageFields {
						needaction_partner_ids: Some(remaining),
						..MessageFields::default()
					},
				})?;
			}
			store.apply(adjust(
				Mailbox::Inbox.identity(),
				ThreadCounter::Mailbox,
				-delta(read.message_ids.len()),
			))?;

			let channels: Vec<Identity> = match &read.channel_ids {
				Some(ids) => ids.iter().map(|id| Identity::channel(*id)).collect(),
				None => store.threads().filter(|t| t.is_channel()).map(|t| t.identity.clone()).collect(),
			};
			for channel in channels {
				if store.thread(&channel).is_none() {
					continue;
				}
				store.apply(Mutation::UpdateThread {
					thread: channel,
					changes: ThreadFields {
						message_needaction_counter: Some(0),
						..ThreadFields::default()
					},
				})?;
			}
			Ok(())
		})
	}

	fn on_toggle_star(&self, star: ToggleStar) -> Result<(), ClientCoreError> {
		self.store().update(|store| {
			let me = store.current_partner_id();
			for id in &star.message_ids {
				let message = Identity::message(MessageId::from(*id));
				let Some(entry) = store.message(&message) else {
					continue;
				};
				let mut starred = entry.starred_partner_ids.clone();
				if star.starred {
					starred.insert(me);
				} else {
					starred.remove(&me);
				}
				store.apply(Mutation::UpdateMessage {
					message,
					changes: MessageFields {
						starred_partner_ids: Some(starred.into_iter().collect()),
						..MessageFields::default()
					},
				})?;
			}
			let step = if star.starred { 1 } else { -1 };
			store.apply(adjust(
				Mailbox::Starred.identity(),
				ThreadCounter::Mailbox,
				step * delta(star.message_ids.len()),
			))?;
			Ok(())
		})
	}

	fn on_transient_message(&self, mut fields: MessageFields) -> Result<(), ClientCoreError> {
		self.store().update(|store| {
			let id = store.max_message_id().unwrap_or(MessageId(0.0)).next_transient();
			if fields.author_id.is_none() {
				fields.author_id = root_author(store);
			}
			fields.is_transient = Some(true);
			debug!(message = %id, "transient message");
			store.apply(Mutation::InsertMessage(MessageData { id, fields }))?;
			Ok(())
		})
	}

	fn on_unsubscribe(&self, unsubscribe: Unsubscribe) -> Result<(), ClientCoreError> {
		let thread = Identity::channel(unsubscribe.id);
		let name = self.store().update(|store| {
			let Some(entry) = store.thread(&thread) else {
				return Ok::<_, ClientCoreError>(None);
			};
			let name = store.thread_display_name(entry);
			store.apply(Mutation::UpdateThread {
				thread: thread.clone(),
				changes: ThreadFields {
					is_pinned: Some(false),
					..ThreadFields::default()
				},
			})?;
			Ok(Some(name))
		})?;
		if let Some(name) = name {
			info!(thread = %thread, "unsubscribed");
			self.emit(UiEvent::notify(format!("You unsubscribed from {name}.")));
		}
		Ok(())
	}

	fn on_partner_channel(&self, notice: PartnerChannel) -> Result<(), ClientCoreError> {
		let thread = Identity::channel(notice.channel.id);
		let minimized = notice.channel.fields.is_minimized == Some(true);
		let fresh = self.store().update(|store| {
			let fresh = store.thread(&thread).is_none();
			store.apply(Mutation::InsertThread(ThreadData::channel(notice.channel)))?;
			if fresh && minimized {
				store.apply(Mutation::OpenChatWindow {
					item: ChatWindowItem::Thread(thread.clone()),
					mode: OpenMode::Last,
				})?;
			}
			Ok::<_, ClientCoreError>(fresh)
		})?;
		if fresh && !minimized && notice.info.as_deref() != Some("creation") {
			let name = self.store().read(|store| {
				store
					.thread(&thread)
					.map(|t| store.thread_display_name(t))
					.unwrap_or_default()
			});
			self.emit(UiEvent::notify(format!("You have been invited to: {name}")));
		}
		Ok(())
	}
}

/// Author used for transient messages: the system bot partner.
fn root_author(store: &Store) -> Option<Many2One> {
	let root = store.root_partner()?;
	let partner = store.partner(root)?;
	Some(Many2One {
		id: partner.id,
		name: partner.name.clone(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn entry(model: &str, target: Value, payload: Value) -> Notification {
		Notification::new(NotificationChannel::new("db", model, target), payload)
	}

	#[test]
	fn notifications_parse_from_bus_tuples() {
		let batch: Vec<Notification> = serde_json::from_value(json!([
			[["db", "mail.channel", 7], {"id": 12, "body": "hi"}],
			[["db", "res.partner", 3], {"info": "unsubscribe", "id": 7}],
		]))
		.unwrap();
		assert_eq!(batch.len(), 2);
		assert_eq!(batch[0].channel.model, "mail.channel");
		assert_eq!(batch[0].channel.target, json!(7));
		assert_eq!(batch[1].unsubscribed_channel(), Some(7));
	}

	#[test]
	fn unsubscribe_drops_other_entries_for_that_channel() {
		let batch = vec![
			entry("mail.channel", json!(7), json!({"id": 12, "body": "late"})),
			entry("res.partner", json!(3), json!({"info": "unsubscribe", "id": 7})),
			entry("mail.channel", json!(8), json!({"id": 13, "body": "kept"})),
		];
		let kept = filter_unsubscribed(batch);
		assert_eq!(kept.len(), 2);
		assert_eq!(Route::of(&kept[0]), Route::Unsubscribe);
		assert_eq!(Route::of(&kept[1]), Route::ChannelMessage { channel: 8 });
	}

	#[test]
	fn every_unsubscribe_in_a_batch_is_honoured() {
		let batch = vec![
			entry("res.partner", json!(3), json!({"info": "unsubscribe", "id": 7})),
			entry("res.partner", json!(3), json!({"info": "unsubscribe", "id": 8})),
			entry("mail.channel", json!(7), json!({"id": 12})),
			entry("mail.channel", json!(8), json!({"id": 13})),
		];
		assert_eq!(filter_unsubscribed(batch).len(), 2);
	}

	#[test]
	fn partner_routes_follow_type_before_info() {
		let route = |payload: Value| Route::of(&entry("res.partner", json!(3), payload));
		assert_eq!(route(json!({"type": "deletion"})), Route::Ignored("deletion"));
		assert_eq!(route(json!({"type": "mark_as_read", "info": "unsubscribe"})), Route::MarkAsRead);
		assert_eq!(route(json!({"info": "transient_message", "body": "x"})), Route::TransientMessage);
		assert_eq!(route(json!({"type": "user_connection"})), Route::UserConnection);
		assert_eq!(route(json!({"id": 4, "name": "general"})), Route::PartnerChannel);
	}

	#[test]
	fn channel_routes() {
		let route = |payload: Value| Route::of(&entry("mail.channel", json!(5), payload));
		assert_eq!(route(json!({"info": "typing_status"})), Route::Ignored("typing_status"));
		assert_eq!(route(json!({"info": "channel_fetched"})), Route::Ignored("channel_fetched"));
		assert_eq!(route(json!({"info": "channel_seen"})), Route::ChannelSeen { channel: 5 });
		assert_eq!(route(json!({"id": 1})), Route::ChannelMessage { channel: 5 });
		assert_eq!(Route::of(&entry("bus.presence", json!(1), json!({}))), Route::Unknown);
		assert_eq!(Route::of(&entry("ir.needaction", json!(3), json!({"id": 1}))), Route::Needaction);
	}
}
