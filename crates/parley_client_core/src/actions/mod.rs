#![forbid(unsafe_code)]

//! Async units of work: derive a request from the store, make at most one
//! remote call, feed the answer back through [`Mutation`]s.
//!
//! The store lock is only taken in short synchronous sections, never across
//! an `.await`.

use std::sync::Arc;

use chrono::TimeDelta;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use parley_domain::{EntityKind, Identity};
use parley_store::{Applied, Mutation, SquashPolicy, Store, StoreError, StoreHandle, Thread};

use crate::config::{ClientConfig, MessageSettings, PresenceSettings};
use crate::events::{self, UiEvent};
use crate::remote::{Remote, RemoteRequest, Uploader};
use crate::{ClientCoreError, decode};

mod attachments;
mod messages;
mod presence;
mod session;
mod threads;

pub use messages::PostMessage;

/// Entry point of the action layer for one connected session.
#[derive(Clone)]
pub struct Messaging {
	store: StoreHandle,
	remote: Arc<dyn Remote>,
	uploader: Option<Arc<dyn Uploader>>,
	ui_tx: mpsc::UnboundedSender<UiEvent>,
	messages: MessageSettings,
	presence: PresenceSettings,
}

impl Messaging {
	pub fn new(store: StoreHandle, remote: Arc<dyn Remote>, ui_tx: mpsc::UnboundedSender<UiEvent>) -> Self {
		Self {
			store,
			remote,
			uploader: None,
			ui_tx,
			messages: MessageSettings::default(),
			presence: PresenceSettings::default(),
		}
	}

	/// Fresh store for the configured session, plus its settings.
	pub fn from_config(
		config: &ClientConfig,
		remote: Arc<dyn Remote>,
		ui_tx: mpsc::UnboundedSender<UiEvent>,
	) -> Self {
		let store = Store::new(config.session.clone()).with_layout_constants(config.chat_windows);
		Self {
			messages: config.messages.clone(),
			presence: config.presence.clone(),
			..Self::new(StoreHandle::new(store), remote, ui_tx)
		}
	}

	pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
		self.uploader = Some(uploader);
		self
	}

	pub fn with_message_settings(mut self, messages: MessageSettings) -> Self {
		self.messages = messages;
		self
	}

	pub fn store(&self) -> &StoreHandle {
		&self.store
	}

	pub fn message_settings(&self) -> &MessageSettings {
		&self.messages
	}

	/// Squash policy for rendering `thread` with the configured window.
	pub fn squash_policy(&self, thread: &Thread) -> SquashPolicy {
		let window = TimeDelta::from_std(self.messages.squash_window).unwrap_or_else(|_| SquashPolicy::default().window);
		SquashPolicy::for_thread(thread).with_window(window)
	}

	pub(crate) fn emit(&self, event: UiEvent) {
		events::emit(&self.ui_tx, event);
	}

	pub(crate) fn apply(&self, mutation: Mutation) -> Result<Applied, ClientCoreError> {
		Ok(self.store.apply(mutation)?)
	}

	pub(crate) async fn fetch(&self, request: RemoteRequest) -> Result<Value, ClientCoreError> {
		let key = request.key();
		self.remote.call(request).await.map_err(|err| {
			warn!(request = %key, error = %err, "remote call failed");
			ClientCoreError::from(err)
		})
	}

	pub(crate) async fn fetch_as<T: DeserializeOwned>(
		&self,
		what: &'static str,
		request: RemoteRequest,
	) -> Result<T, ClientCoreError> {
		let value = self.fetch(request).await?;
		decode(what, value)
	}

	/// Read one thread, failing when it is not in the store.
	pub(crate) fn with_thread<R>(&self, thread: &Identity, f: impl FnOnce(&Store, &Thread) -> R) -> Result<R, ClientCoreError> {
		self.store.read(|store| {
			let entry = store.thread(thread).ok_or_else(|| missing_thread(thread))?;
			Ok(f(store, entry))
		})
	}
}

pub(crate) fn missing_thread(thread: &Identity) -> ClientCoreError {
	ClientCoreError::Store(StoreError::Missing {
		kind: EntityKind::Thread,
		identity: thread.clone(),
	})
}

impl std::fmt::Debug for Messaging {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Messaging")
			.field("store", &self.store)
			.field("messages", &self.messages)
			.field("presence", &self.presence)
			.finish_non_exhaustive()
	}
}
