#![forbid(unsafe_code)]

//! Effects the core asks the UI to perform. The UI owns the receiver.

use tokio::sync::mpsc;

use parley_domain::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
	/// Toast-style notice.
	Notify {
		title: Option<String>,
		message: String,
		sticky: bool,
	},
	/// An action failed in a way the user should see.
	Error { message: String },
	/// A thread was brought on screen, in discuss or in a chat window.
	ThreadOpened { thread: Identity },
}

impl UiEvent {
	pub fn notify(message: impl Into<String>) -> Self {
		UiEvent::Notify {
			title: None,
			message: message.into(),
			sticky: false,
		}
	}
}

pub fn ui_channel() -> (mpsc::UnboundedSender<UiEvent>, mpsc::UnboundedReceiver<UiEvent>) {
	mpsc::unbounded_channel()
}

/// Send, ignoring a closed UI.
pub(crate) fn emit(ui_tx: &mpsc::UnboundedSender<UiEvent>, event: UiEvent) {
	let _ = ui_tx.send(event);
}
