#![forbid(unsafe_code)]

//! Drive a session offline: scripted backend answers and notification
//! batches come from a JSON fixture; the resulting store is summarized on
//! stdout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use parley_client_core::remote::scripted::ScriptedRemote;
use parley_client_core::{
	Messaging, Notification, UiEvent, default_config_path, init_tracing, load_client_config, load_client_config_from_path,
	ui_channel,
};
use parley_store::{Mutation, Store};

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: parley_replay <fixture.json> [--config path]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.parley/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

struct Args {
	fixture: PathBuf,
	config: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut fixture = None;
	let mut config = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				config = Some(PathBuf::from(v));
			}
			other if other.starts_with('-') => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
			other => fixture = Some(PathBuf::from(other)),
		}
	}

	let Some(fixture) = fixture else {
		usage_and_exit();
	};
	Args { fixture, config }
}

#[derive(Debug, Deserialize)]
struct Viewport {
	width: u32,
	#[serde(default)]
	is_mobile: bool,
}

#[derive(Debug, Deserialize)]
struct Fixture {
	/// Request key (`model/method` or route) to answers, consumed in order.
	#[serde(default)]
	responses: BTreeMap<String, Vec<Value>>,
	#[serde(default)]
	viewport: Option<Viewport>,
	#[serde(default)]
	batches: Vec<Vec<Notification>>,
}

fn summarize(store: &Store) -> Value {
	let names = |threads: Vec<&parley_store::Thread>| -> Vec<String> {
		threads.into_iter().map(|t| store.thread_display_name(t)).collect()
	};
	let mailboxes: BTreeMap<String, u32> = store
		.mailboxes()
		.into_iter()
		.map(|t| (store.thread_display_name(t), t.counter))
		.collect();
	let unread: BTreeMap<String, u32> = store
		.threads()
		.filter(|t| t.is_channel() && t.message_unread_counter > 0)
		.map(|t| (store.thread_display_name(t), t.message_unread_counter))
		.collect();
	json!({
		"pinned_channels": names(store.pinned_channels()),
		"pinned_chats": names(store.pinned_chats()),
		"mailboxes": mailboxes,
		"unread": unread,
		"global_unread_counter": store.global_unread_counter(),
		"messages": store.messages().count(),
		"mail_failures": store.mail_failures().count(),
		"chat_windows": store.chat_window_layout(),
	})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = parse_args();
	let config = match &args.config {
		Some(path) => load_client_config_from_path(path)?,
		None => load_client_config()?,
	};
	init_tracing(&config.logging.filter);
	if args.config.is_none() {
		let path = default_config_path()?;
		info!(path = %path.display(), "using default config location");
	}

	let raw = std::fs::read_to_string(&args.fixture)
		.with_context(|| format!("read fixture from {}", args.fixture.display()))?;
	let fixture: Fixture =
		serde_json::from_str(&raw).with_context(|| format!("parse fixture {}", args.fixture.display()))?;

	let remote = Arc::new(ScriptedRemote::new());
	for (key, answers) in fixture.responses {
		for answer in answers {
			remote.respond(&key, answer);
		}
	}

	let (ui_tx, mut ui_rx) = ui_channel();
	let messaging = Messaging::from_config(&config, remote.clone(), ui_tx).with_uploader(remote.clone());
	if let Some(viewport) = fixture.viewport {
		messaging.store().apply(Mutation::SetViewport {
			width: viewport.width,
			is_mobile: viewport.is_mobile,
		})?;
	}

	messaging.init_messaging().await?;
	for (index, batch) in fixture.batches.into_iter().enumerate() {
		let handled = messaging.handle_notifications(batch).await?;
		info!(batch = index, handled, "batch applied");
	}

	while let Ok(event) = ui_rx.try_recv() {
		match event {
			UiEvent::Notify { title, message, .. } => match title {
				Some(title) => eprintln!("[notice] {title}: {message}"),
				None => eprintln!("[notice] {message}"),
			},
			UiEvent::Error { message } => eprintln!("[error] {message}"),
			UiEvent::ThreadOpened { thread } => eprintln!("[opened] {thread}"),
		}
	}

	let summary = messaging.store().read(summarize);
	println!("{}", serde_json::to_string_pretty(&summary)?);
	if remote.pending() > 0 {
		info!(pending = remote.pending(), "fixture answers left unused");
	}
	Ok(())
}
