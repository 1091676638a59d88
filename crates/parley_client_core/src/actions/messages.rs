#![forbid(unsafe_code)]

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::debug;

use parley_domain::{
	AttachmentData, AttachmentFields, EntityKind, Filter, Identity, Many2One, MessageData, MessageFields, MessageId, MessageType,
	PartnerData, RecordId, ThreadFields, model,
};
use parley_store::{Mutation, Store, StoreError};

use super::Messaging;
use crate::ClientCoreError;
use crate::format::prepare_body;
use crate::remote::RemoteRequest;

/// What the composer sends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostMessage {
	/// Plain text as typed; escaped and linkified before sending.
	pub body: String,
	pub attachments: Vec<Identity>,
	/// Extra recipients, business-record threads only.
	pub partner_ids: Vec<i64>,
	/// Business-record threads only; e.g. `mail.mt_note`.
	pub subtype: Option<String>,
	/// Message answered from a mailbox. Decides the thread actually posted to.
	pub reply_to: Option<Identity>,
	/// Passed through as keyword arguments, unchanged.
	pub extra: Map<String, Value>,
}

impl PostMessage {
	pub fn new(body: impl Into<String>) -> Self {
		Self {
			body: body.into(),
			..Self::default()
		}
	}
}

/// Where a post really goes once mailboxes are resolved.
#[derive(Debug, Clone)]
struct PostTarget {
	thread: Identity,
	model: String,
	res_id: i64,
	is_channel: bool,
	command: Option<String>,
}

fn resolve_target(store: &Store, thread: &Identity, post: &PostMessage) -> Result<PostTarget, ClientCoreError> {
	let entry = store.thread(thread).ok_or_else(|| super::missing_thread(thread))?;
	let entry = if entry.is_mailbox() {
		let origin = post
			.reply_to
			.as_ref()
			.and_then(|message| store.message(message))
			.and_then(|message| message.origin_thread.as_ref())
			.ok_or_else(|| ClientCoreError::InvalidTarget {
				thread: thread.clone(),
				reason: "mailbox posts need a message with an origin thread",
			})?;
		store.thread(origin).ok_or_else(|| super::missing_thread(origin))?
	} else {
		entry
	};
	let RecordId::Int(res_id) = entry.id else {
		return Err(ClientCoreError::InvalidTarget {
			thread: entry.identity.clone(),
			reason: "thread has no record id",
		});
	};

	let command = entry
		.is_channel()
		.then(|| post.body.trim_start().strip_prefix('/'))
		.flatten()
		.and_then(|rest| rest.split_whitespace().next())
		.filter(|name| store.commands().iter().any(|c| c.name == *name))
		.map(str::to_string);

	Ok(PostTarget {
		thread: entry.identity.clone(),
		model: entry.model.clone(),
		res_id,
		is_channel: entry.is_channel(),
		command,
	})
}

impl Messaging {
	/// Post to `thread`. From a mailbox, the post goes to the origin thread
	/// of `post.reply_to`. Returns the id of the new message when the
	/// backend reports one.
	pub async fn post_message(&self, thread: &Identity, post: PostMessage) -> Result<Option<MessageId>, ClientCoreError> {
		let (target, attachment_ids) = self.store.read(|store| {
			let target = resolve_target(store, thread, &post)?;
			let attachment_ids: Vec<i64> = post
				.attachments
				.iter()
				.filter_map(|a| store.attachment(a))
				.filter(|a| !a.is_temporary())
				.map(|a| a.id)
				.collect();
			Ok::<_, ClientCoreError>((target, attachment_ids))
		})?;

		if let Some(command) = &target.command {
			debug!(thread = %target.thread, command = %command, "executing channel command");
			self.fetch(
				RemoteRequest::call(model::CHANNEL, "execute_command", vec![json!([target.res_id])])
					.kwarg("command", command.as_str())
					.kwarg("body", post.body.trim()),
			)
			.await?;
			return Ok(None);
		}

		let body = prepare_body(&post.body);
		let mut request = RemoteRequest::call(&target.model, "message_post", vec![json!(target.res_id)])
			.kwarg("body", body.as_str())
			.kwarg("message_type", "comment")
			.kwarg("attachment_ids", json!(attachment_ids));
		if target.is_channel {
			request = request.kwarg("subtype", "mail.mt_comment");
		} else {
			request = request.kwarg("partner_ids", json!(post.partner_ids));
			if let Some(subtype) = &post.subtype {
				request = request.kwarg("subtype", subtype.as_str());
			}
		}
		for (key, value) in &post.extra {
			request = request.kwarg(key, value.clone());
		}

		let answer = self.fetch(request).await?;
		let Some(id) = answer.as_i64() else {
			return Ok(None);
		};
		let id = MessageId::from(id);
		if !target.is_channel {
			self.record_document_post(&target, id, body, attachment_ids)?;
		}
		Ok(Some(id))
	}

	/// Channel posts come back as notifications; business-record threads
	/// get none, so the confirmed post is recorded directly.
	fn record_document_post(
		&self,
		target: &PostTarget,
		id: MessageId,
		body: String,
		attachment_ids: Vec<i64>,
	) -> Result<(), ClientCoreError> {
		self.store.update(|store| {
			let author = store
				.partner(&store.current_partner())
				.map(|p| Many2One {
					id: p.id,
					name: p.name.clone(),
				})
				.unwrap_or(Many2One {
					id: store.current_partner_id(),
					name: None,
				});
			store.apply(Mutation::InsertMessage(MessageData {
				id,
				fields: MessageFields {
					author_id: Some(author),
					body: Some(body),
					date: Some(Utc::now()),
					message_type: Some(MessageType::Comment),
					model: Some(target.model.clone()),
					res_id: Some(target.res_id),
					attachment_ids: Some(
						attachment_ids
							.into_iter()
							.map(|id| AttachmentData {
								id,
								fields: AttachmentFields::default(),
							})
							.collect(),
					),
					..MessageFields::default()
				},
			}))?;
			if let (Some(int_id), Some(thread)) = (id.as_int(), store.thread(&target.thread)) {
				let mut message_ids = thread.message_ids.clone();
				if !message_ids.contains(&int_id) {
					message_ids.insert(0, int_id);
					store.apply(Mutation::UpdateThread {
						thread: target.thread.clone(),
						changes: ThreadFields {
							message_ids: Some(message_ids),
							..ThreadFields::default()
						},
					})?;
				}
			}
			Ok(())
		})
	}

	fn message_record_id(&self, message: &Identity) -> Result<i64, ClientCoreError> {
		self.store.read(|store| {
			let entry = store.message(message).ok_or_else(|| {
				ClientCoreError::Store(StoreError::Missing {
					kind: EntityKind::Message,
					identity: message.clone(),
				})
			})?;
			entry.id.as_int().ok_or_else(|| ClientCoreError::InvalidTarget {
				thread: message.clone(),
				reason: "transient messages only exist locally",
			})
		})
	}

	/// Star or unstar a message. Local state follows the `toggle_star`
	/// notification.
	pub async fn toggle_star_message(&self, message: &Identity) -> Result<(), ClientCoreError> {
		let id = self.message_record_id(message)?;
		self.fetch(RemoteRequest::call(model::MESSAGE, "toggle_message_starred", vec![json!([id])]))
			.await?;
		Ok(())
	}

	/// Unstar every starred message of the user.
	pub async fn unstar_all(&self) -> Result<(), ClientCoreError> {
		self.fetch(RemoteRequest::call(model::MESSAGE, "unstar_all", Vec::new())).await?;
		Ok(())
	}

	/// Mark every needaction message matching `filter` as read.
	pub async fn mark_all_as_read(&self, filter: &Filter) -> Result<(), ClientCoreError> {
		self.fetch(RemoteRequest::call(model::MESSAGE, "mark_all_as_read", Vec::new()).kwarg("domain", filter.to_value()))
			.await?;
		Ok(())
	}

	/// Mark one inbox message as done. Local state follows the
	/// `mark_as_read` notification.
	pub async fn mark_message_as_read(&self, message: &Identity) -> Result<(), ClientCoreError> {
		let id = self.message_record_id(message)?;
		self.fetch(RemoteRequest::call(model::MESSAGE, "set_message_done", vec![json!([id])]))
			.await?;
		Ok(())
	}

	/// Partners to suggest for a mention. Known partners are searched first;
	/// the backend is only asked when none of them match.
	pub async fn search_partners(&self, keyword: &str) -> Result<Vec<Identity>, ClientCoreError> {
		let limit = self.messages.mention_limit;
		let local: Vec<Identity> = self.store.read(|store| {
			store
				.search_partners(keyword, limit)
				.into_iter()
				.map(|p| p.identity.clone())
				.collect()
		});
		if !local.is_empty() {
			return Ok(local);
		}

		let found: Vec<PartnerData> = self
			.fetch_as(
				"partner list",
				RemoteRequest::call(model::PARTNER, "im_search", vec![json!(keyword), json!(limit)]),
			)
			.await?;
		let identities = found.iter().map(|p| Identity::partner(p.id)).collect();
		self.store.update(|store| {
			for partner in found {
				store.apply(Mutation::InsertPartner(partner))?;
			}
			Ok::<_, ClientCoreError>(())
		})?;
		Ok(identities)
	}
}
