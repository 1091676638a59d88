#![forbid(unsafe_code)]

use serde_json::{Value, json};
use tracing::info;

use parley_domain::InitMessagingData;
use parley_store::Mutation;

use super::Messaging;
use crate::ClientCoreError;
use crate::remote::RemoteRequest;

pub const INIT_MESSAGING_ROUTE: &str = "/mail/init_messaging";

impl Messaging {
	/// Fetch the session bootstrap payload and seed the store with it.
	pub async fn init_messaging(&self) -> Result<(), ClientCoreError> {
		let context = self
			.store
			.read(|store| Value::Object(store.session().user_context.clone()));
		let data: InitMessagingData = self
			.fetch_as(
				"messaging init payload",
				RemoteRequest::route(INIT_MESSAGING_ROUTE, json!({ "context": context })),
			)
			.await?;
		let channels: usize = data.channel_slots.values().map(Vec::len).sum();
		self.apply(Mutation::InitMessaging(Box::new(data)))?;
		info!(channels, "messaging initialised");
		Ok(())
	}
}
