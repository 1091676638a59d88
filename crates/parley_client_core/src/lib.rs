#![forbid(unsafe_code)]

//! Action layer and notification router of a messaging client: drives a
//! [`parley_store::Store`] from backend fetches and push notifications.

use serde::de::DeserializeOwned;
use serde_json::Value;

use parley_domain::Identity;
use parley_store::StoreError;

pub mod actions;
pub mod config;
pub mod events;
pub mod format;
pub mod remote;
pub mod router;

pub use actions::{Messaging, PostMessage};
pub use config::{ClientConfig, default_config_path, load_client_config, load_client_config_from_path};
pub use events::{UiEvent, ui_channel};
pub use remote::{Remote, RemoteError, RemoteFuture, RemoteRequest, UploadFile, Uploader};
pub use router::{Notification, NotificationChannel};

/// Errors for client core operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientCoreError {
	/// Mutations applied out of order.
	#[error(transparent)]
	Store(#[from] StoreError),

	/// Remote fetch failed.
	#[error(transparent)]
	Remote(#[from] RemoteError),

	/// A remote answer did not have the expected shape.
	#[error("malformed {what}: {source}")]
	Decode {
		what: &'static str,
		#[source]
		source: serde_json::Error,
	},

	/// The action does not apply to this thread.
	#[error("cannot act on {thread}: {reason}")]
	InvalidTarget { thread: Identity, reason: &'static str },

	/// Invalid configuration.
	#[error("config error: {0}")]
	Config(String),

	/// Other error.
	#[error("error: {0}")]
	Other(String),
}

impl From<anyhow::Error> for ClientCoreError {
	fn from(e: anyhow::Error) -> Self {
		ClientCoreError::Other(format!("{e:#}"))
	}
}

pub(crate) fn decode<T: DeserializeOwned>(what: &'static str, value: Value) -> Result<T, ClientCoreError> {
	serde_json::from_value(value).map_err(|source| ClientCoreError::Decode { what, source })
}

/// Install the fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
	tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
