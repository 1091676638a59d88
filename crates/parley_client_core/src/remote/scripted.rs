#![forbid(unsafe_code)]

//! In-process [`Remote`] that answers from queued responses. Used by the
//! replay binary and by tests.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use parley_domain::AttachmentData;

use super::{Remote, RemoteError, RemoteFuture, RemoteRequest, UploadFile, Uploader};

/// Key under which upload answers are queued.
pub const UPLOAD_KEY: &str = "upload";

#[derive(Debug, Default)]
pub struct ScriptedRemote {
	responses: Mutex<HashMap<String, VecDeque<Result<Value, RemoteError>>>>,
	requests: Mutex<Vec<RemoteRequest>>,
	uploads: Mutex<Vec<UploadFile>>,
}

impl ScriptedRemote {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue an answer for `key` (`model/method` or a route).
	pub fn respond(&self, key: &str, value: Value) -> &Self {
		self.push(key, Ok(value))
	}

	pub fn fail(&self, key: &str, error: RemoteError) -> &Self {
		self.push(key, Err(error))
	}

	fn push(&self, key: &str, answer: Result<Value, RemoteError>) -> &Self {
		self.responses.lock().entry(key.to_string()).or_default().push_back(answer);
		self
	}

	/// Every request seen so far, in order.
	pub fn requests(&self) -> Vec<RemoteRequest> {
		self.requests.lock().clone()
	}

	pub fn requests_for(&self, key: &str) -> Vec<RemoteRequest> {
		self.requests.lock().iter().filter(|r| r.key() == key).cloned().collect()
	}

	pub fn uploads(&self) -> Vec<UploadFile> {
		self.uploads.lock().clone()
	}

	/// Answers still queued, across all keys.
	pub fn pending(&self) -> usize {
		self.responses.lock().values().map(VecDeque::len).sum()
	}

	fn answer(&self, key: &str) -> Result<Value, RemoteError> {
		self.responses
			.lock()
			.get_mut(key)
			.and_then(VecDeque::pop_front)
			.unwrap_or_else(|| Err(RemoteError::Transport(format!("no scripted response for {key}"))))
	}
}

impl Remote for ScriptedRemote {
	fn call<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a, Value> {
		Box::pin(async move {
			let key = request.key();
			debug!(key = %key, "scripted call");
			self.requests.lock().push(request);
			self.answer(&key)
		})
	}
}

impl Uploader for ScriptedRemote {
	fn upload<'a>(&'a self, file: UploadFile) -> RemoteFuture<'a, AttachmentData> {
		Box::pin(async move {
			debug!(filename = %file.filename, "scripted upload");
			self.uploads.lock().push(file);
			let value = self.answer(UPLOAD_KEY)?;
			serde_json::from_value(value).map_err(|e| RemoteError::Malformed(e.to_string()))
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn answers_in_queue_order_and_records_requests() {
		let remote = ScriptedRemote::new();
		remote.respond("res.partner/im_search", json!([1])).respond("res.partner/im_search", json!([2]));

		let first = remote
			.call(RemoteRequest::call("res.partner", "im_search", vec![json!("a")]))
			.await
			.unwrap();
		let second = remote
			.call(RemoteRequest::call("res.partner", "im_search", vec![json!("b")]))
			.await
			.unwrap();
		assert_eq!((first, second), (json!([1]), json!([2])));
		assert_eq!(remote.requests_for("res.partner/im_search").len(), 2);
		assert_eq!(remote.pending(), 0);
	}

	#[tokio::test]
	async fn missing_answer_is_a_transport_error() {
		let remote = ScriptedRemote::new();
		let err = remote.call(RemoteRequest::route("/nowhere", json!({}))).await.unwrap_err();
		assert!(matches!(err, RemoteError::Transport(_)));
		assert_eq!(remote.requests().len(), 1);
	}

	#[tokio::test]
	async fn uploads_decode_attachment_records() {
		let remote = ScriptedRemote::new();
		remote.respond(UPLOAD_KEY, json!({"id": 40, "filename": "a.png", "mimetype": "image/png"}));
		let data = remote
			.upload(UploadFile {
				filename: "a.png".into(),
				mimetype: Some("image/png".into()),
				content: vec![1, 2, 3],
			})
			.await
			.unwrap();
		assert_eq!(data.id, 40);
		assert_eq!(remote.uploads().len(), 1);
	}
}
