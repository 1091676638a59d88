#![forbid(unsafe_code)]

use serde_json::json;
use tracing::{debug, info};

use parley_domain::{ChannelInfo, Filter, FoldState, Identity, MessageData, ThreadData, ThreadFields, model};
use parley_store::{ChatWindowItem, LoadPlan, Mutation, OpenMode, Store};

use super::Messaging;
use crate::ClientCoreError;
use crate::events::UiEvent;
use crate::remote::RemoteRequest;

/// Channel id and uuid of a channel thread, `None` for other threads.
fn channel_keys(store: &Store, thread: &Identity) -> Option<(i64, Option<String>)> {
	let entry = store.thread(thread).filter(|t| t.is_channel())?;
	Some((entry.id.as_int()?, entry.uuid.clone()))
}

impl Messaging {
	/// Join channel `channel_id` and show it. Nothing is fetched when the
	/// channel is already known.
	pub async fn join_channel(&self, channel_id: i64) -> Result<Identity, ClientCoreError> {
		let thread = Identity::channel(channel_id);
		if self.store.read(|store| store.thread(&thread).is_some()) {
			debug!(thread = %thread, "join skipped: channel already known");
			return Ok(thread);
		}
		let thread = self.fetch_joined_channel(channel_id).await?;
		self.open_thread(&thread, OpenMode::Last)?;
		Ok(thread)
	}

	/// Join and insert without bringing the channel on screen.
	pub(crate) async fn fetch_joined_channel(&self, channel_id: i64) -> Result<Identity, ClientCoreError> {
		let info: ChannelInfo = self
			.fetch_as(
				"channel info",
				RemoteRequest::call(model::CHANNEL, "channel_join_and_get_info", vec![json!([channel_id])]),
			)
			.await?;
		self.insert_channel(info)
	}

	pub(crate) fn insert_channel(&self, info: ChannelInfo) -> Result<Identity, ClientCoreError> {
		let thread = Identity::channel(info.id);
		self.apply(Mutation::InsertThread(ThreadData::channel(info)))?;
		Ok(thread)
	}

	/// Select `thread` in discuss when it is open, otherwise show it in a chat
	/// window. Mailboxes only live in discuss, which is opened for them.
	pub fn open_thread(&self, thread: &Identity, mode: OpenMode) -> Result<(), ClientCoreError> {
		let is_mailbox = self.with_thread(thread, |_, entry| entry.is_mailbox())?;
		self.store.update(|store| {
			let mutation = if store.discuss().is_open {
				Mutation::SelectDiscussThread {
					thread: thread.clone(),
					filter: Filter::empty(),
				}
			} else if is_mailbox {
				Mutation::OpenDiscuss {
					thread: Some(thread.clone()),
				}
			} else {
				Mutation::OpenChatWindow {
					item: ChatWindowItem::Thread(thread.clone()),
					mode,
				}
			};
			store.apply(mutation)
		})?;
		self.emit(UiEvent::ThreadOpened { thread: thread.clone() });
		Ok(())
	}

	/// Create a channel named `name` and show it.
	pub async fn create_channel(&self, name: &str, public: bool) -> Result<Identity, ClientCoreError> {
		let privacy = if public { "public" } else { "private" };
		let info: ChannelInfo = self
			.fetch_as(
				"channel info",
				RemoteRequest::call(model::CHANNEL, "channel_create", vec![json!(name), json!(privacy)]),
			)
			.await?;
		let thread = self.insert_channel(info)?;
		info!(thread = %thread, "channel created");
		self.open_thread(&thread, OpenMode::Last)?;
		Ok(thread)
	}

	/// Show the one-to-one chat with `partner_id`, fetching it when unknown.
	pub async fn get_chat(&self, partner_id: i64) -> Result<Identity, ClientCoreError> {
		let partner = Identity::partner(partner_id);
		let known = self.store.read(|store| {
			store
				.threads()
				.find(|t| t.is_chat() && t.direct_partner.as_ref() == Some(&partner))
				.map(|t| t.identity.clone())
		});
		let thread = match known {
			Some(thread) => thread,
			None => {
				let info: ChannelInfo = self
					.fetch_as(
						"chat info",
						RemoteRequest::call(model::CHANNEL, "channel_get", Vec::new())
							.kwarg("partners_to", json!([partner_id])),
					)
					.await?;
				self.insert_channel(info)?
			}
		};
		self.open_thread(&thread, OpenMode::Last)?;
		Ok(thread)
	}

	/// Tell the backend the user saw the latest message of a channel. Local
	/// counters follow the `channel_seen` notification. Returns whether a
	/// call was made.
	pub async fn mark_thread_as_seen(&self, thread: &Identity) -> Result<bool, ClientCoreError> {
		let target = self.with_thread(thread, |store, entry| {
			let channel_id = entry.id.as_int().filter(|_| entry.is_channel())?;
			let cached = entry
				.cache_identities
				.iter()
				.filter_map(|cache| store.thread_cache(cache))
				.filter_map(|cache| cache.message_identities.last())
				.filter_map(|message| store.message(message))
				.filter_map(|message| message.id.as_int())
				.max();
			let last = cached.into_iter().chain(entry.last_message_id).max()?;
			let seen = entry.seen_message_id.unwrap_or_default();
			(entry.message_unread_counter > 0 || last > seen).then_some((channel_id, last))
		})?;
		let Some((channel_id, last_message_id)) = target else {
			return Ok(false);
		};
		self.fetch(
			RemoteRequest::call(model::CHANNEL, "channel_seen", vec![json!([channel_id])])
				.kwarg("last_message_id", last_message_id),
		)
		.await?;
		Ok(true)
	}

	/// Close a chat window and persist the closed state of its channel.
	pub async fn close_chat_window(&self, item: &ChatWindowItem) -> Result<(), ClientCoreError> {
		let keys = self.store.update(|store| {
			store.apply(Mutation::CloseChatWindow(item.clone()))?;
			Ok::<_, ClientCoreError>(item.thread().and_then(|thread| channel_keys(store, thread)))
		})?;
		if let Some((_, Some(uuid))) = keys {
			self.notify_fold(&uuid, FoldState::Closed).await?;
		}
		Ok(())
	}

	/// Fold an open chat window, or unfold a folded one.
	pub async fn toggle_fold(&self, thread: &Identity) -> Result<FoldState, ClientCoreError> {
		let (next, keys) = self.store.update(|store| {
			let current = store
				.thread(thread)
				.map(|t| t.fold_state)
				.ok_or_else(|| super::missing_thread(thread))?;
			let next = if current == FoldState::Folded {
				FoldState::Open
			} else {
				FoldState::Folded
			};
			store.apply(Mutation::UpdateThread {
				thread: thread.clone(),
				changes: ThreadFields {
					fold_state: Some(next),
					..ThreadFields::default()
				},
			})?;
			Ok::<_, ClientCoreError>((next, channel_keys(store, thread)))
		})?;
		if let Some((_, Some(uuid))) = keys {
			self.notify_fold(&uuid, next).await?;
		}
		Ok(next)
	}

	async fn notify_fold(&self, uuid: &str, state: FoldState) -> Result<(), ClientCoreError> {
		self.fetch(
			RemoteRequest::call(model::CHANNEL, "channel_fold", Vec::new())
				.kwarg("uuid", uuid)
				.kwarg("state", state.as_str()),
		)
		.await?;
		Ok(())
	}

	/// Leave a channel. The local unpin arrives with the `unsubscribe`
	/// notification.
	pub async fn unsubscribe(&self, thread: &Identity) -> Result<(), ClientCoreError> {
		let (channel_id, _) = self.require_channel(thread)?;
		self.fetch(RemoteRequest::call(
			model::CHANNEL,
			"action_unfollow",
			vec![json!([channel_id])],
		))
		.await?;
		Ok(())
	}

	/// Hide a chat from the sidebar. The local unpin arrives by notification.
	pub async fn unpin(&self, thread: &Identity) -> Result<(), ClientCoreError> {
		let (channel_id, uuid) = self.require_channel(thread)?;
		let request = match uuid {
			Some(uuid) => RemoteRequest::call(model::CHANNEL, "channel_pin", Vec::new()).kwarg("uuid", uuid),
			None => RemoteRequest::call(model::CHANNEL, "channel_pin", vec![json!([channel_id])]),
		};
		self.fetch(request.kwarg("pinned", false)).await?;
		Ok(())
	}

	/// Set the user's own name for a channel.
	pub async fn rename(&self, thread: &Identity, name: &str) -> Result<(), ClientCoreError> {
		let (channel_id, _) = self.require_channel(thread)?;
		self.fetch(
			RemoteRequest::call(model::CHANNEL, "channel_set_custom_name", vec![json!(channel_id)])
				.kwarg("name", name),
		)
		.await?;
		self.apply(Mutation::UpdateThread {
			thread: thread.clone(),
			changes: ThreadFields {
				name: Some(name.to_string()),
				..ThreadFields::default()
			},
		})?;
		Ok(())
	}

	fn require_channel(&self, thread: &Identity) -> Result<(i64, Option<String>), ClientCoreError> {
		self.with_thread(thread, |store, _| channel_keys(store, thread))?
			.ok_or_else(|| ClientCoreError::InvalidTarget {
				thread: thread.clone(),
				reason: "not a channel",
			})
	}

	/// Newest page of `(thread, filter)`, refreshing a loaded cache. `None`
	/// while a load of that cache is in flight; otherwise the number of
	/// messages received.
	pub async fn load_thread_cache(&self, thread: &Identity, filter: &Filter) -> Result<Option<usize>, ClientCoreError> {
		let page_size = self.messages.page_size;
		let plan = self.store.update(|store| store.begin_load(thread, filter, page_size))?;
		match plan {
			Some(plan) => self.run_load(plan).await.map(Some),
			None => Ok(None),
		}
	}

	/// Next older page of `(thread, filter)`. `None` when nothing was started.
	pub async fn load_more(&self, thread: &Identity, filter: &Filter) -> Result<Option<usize>, ClientCoreError> {
		let page_size = self.messages.page_size;
		let plan = self.store.update(|store| store.begin_load_more(thread, filter, page_size))?;
		match plan {
			Some(plan) => self.run_load(plan).await.map(Some),
			None => Ok(None),
		}
	}

	async fn run_load(&self, plan: LoadPlan) -> Result<usize, ClientCoreError> {
		match self.fetch_page(&plan).await {
			Ok(messages) => Ok(self.store.update(|store| store.complete_load(&plan, messages))?),
			Err(err) => {
				self.store.update(|store| store.abort_load(&plan))?;
				Err(err)
			}
		}
	}

	async fn fetch_page(&self, plan: &LoadPlan) -> Result<Vec<MessageData>, ClientCoreError> {
		let request = match plan {
			LoadPlan::Fetch { filter, limit, .. } => {
				RemoteRequest::call(model::MESSAGE, "message_fetch", vec![filter.to_value()]).kwarg("limit", *limit)
			}
			LoadPlan::FetchIds { ids, .. } if ids.is_empty() => return Ok(Vec::new()),
			LoadPlan::FetchIds { ids, .. } => RemoteRequest::call(model::MESSAGE, "message_format", vec![json!(ids)]),
		};
		self.fetch_as("message list", request).await
	}
}
