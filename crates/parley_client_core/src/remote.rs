#![forbid(unsafe_code)]

//! Boundary to the backend. The core only builds requests and reads the
//! JSON that comes back; transport, sessions and retries live behind
//! [`Remote`].

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::{Map, Value};

use parley_domain::AttachmentData;

pub mod scripted;

pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
	/// The request never got an answer.
	#[error("transport error: {0}")]
	Transport(String),

	/// The backend answered with an error.
	#[error("server error: {message}")]
	Server { message: String },

	/// The backend answered something the caller cannot read.
	#[error("malformed response: {0}")]
	Malformed(String),
}

/// One backend call: a model method or a bare route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteRequest {
	Call {
		model: String,
		method: String,
		args: Vec<Value>,
		kwargs: Map<String, Value>,
	},
	Route {
		route: String,
		params: Value,
	},
}

impl RemoteRequest {
	pub fn call(model: &str, method: &str, args: Vec<Value>) -> Self {
		RemoteRequest::Call {
			model: model.to_string(),
			method: method.to_string(),
			args,
			kwargs: Map::new(),
		}
	}

	pub fn route(route: &str, params: Value) -> Self {
		RemoteRequest::Route {
			route: route.to_string(),
			params,
		}
	}

	/// Add a keyword argument. No-op on routes.
	pub fn kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
		if let RemoteRequest::Call { kwargs, .. } = &mut self {
			kwargs.insert(key.to_string(), value.into());
		}
		self
	}

	/// `model/method` for calls, the route path otherwise.
	pub fn key(&self) -> String {
		match self {
			RemoteRequest::Call { model, method, .. } => format!("{model}/{method}"),
			RemoteRequest::Route { route, .. } => route.clone(),
		}
	}

	pub fn args(&self) -> &[Value] {
		match self {
			RemoteRequest::Call { args, .. } => args,
			RemoteRequest::Route { .. } => &[],
		}
	}

	pub fn kwargs(&self) -> Option<&Map<String, Value>> {
		match self {
			RemoteRequest::Call { kwargs, .. } => Some(kwargs),
			RemoteRequest::Route { .. } => None,
		}
	}

	pub fn params(&self) -> Option<&Value> {
		match self {
			RemoteRequest::Call { .. } => None,
			RemoteRequest::Route { params, .. } => Some(params),
		}
	}
}

pub trait Remote: Send + Sync {
	fn call<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a, Value>;
}

/// File handed to the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
	pub filename: String,
	pub mimetype: Option<String>,
	pub content: Vec<u8>,
}

pub trait Uploader: Send + Sync {
	/// Upload and return the server-side attachment record.
	fn upload<'a>(&'a self, file: UploadFile) -> RemoteFuture<'a, AttachmentData>;
}
