#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use parley_client_core::remote::scripted::ScriptedRemote;
use parley_client_core::{Messaging, Notification, NotificationChannel, RemoteError, UiEvent, ui_channel};
use parley_domain::{Filter, Identity, Mailbox, MessageId, SessionInfo};
use parley_store::{ChatWindowItem, Store, StoreHandle};

async fn session() -> (Messaging, Arc<ScriptedRemote>, mpsc::UnboundedReceiver<UiEvent>) {
	let remote = Arc::new(ScriptedRemote::new());
	remote.respond(
		"/mail/init_messaging",
		json!({
			"needaction_inbox_counter": 0,
			"starred_counter": 0,
			"partner_root": { "id": 2, "name": "OdooBot" },
			"channel_slots": {
				"channel_channel": [
					{ "id": 1, "name": "general", "channel_type": "channel", "uuid": "g-1", "is_pinned": true },
					{ "id": 7, "name": "random", "channel_type": "channel", "uuid": "r-7", "is_pinned": true }
				]
			}
		}),
	);
	let (ui_tx, ui_rx) = ui_channel();
	let store = StoreHandle::new(Store::new(SessionInfo::default()));
	let messaging = Messaging::new(store, remote.clone(), ui_tx);
	messaging.init_messaging().await.expect("init messaging");
	(messaging, remote, ui_rx)
}

fn on(model: &str, target: impl Into<Value>, payload: Value) -> Notification {
	Notification::new(NotificationChannel::new("db", model, target), payload)
}

fn channel_message(channel: i64, id: i64, author: i64) -> Notification {
	on(
		"mail.channel",
		channel,
		json!({
			"id": id,
			"body": format!("<p>message {id}</p>"),
			"author_id": [author, format!("Partner {author}")],
			"message_type": "comment",
			"model": "mail.channel",
			"res_id": channel,
		}),
	)
}

fn drain(ui_rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
	let mut events = Vec::new();
	while let Ok(event) = ui_rx.try_recv() {
		events.push(event);
	}
	events
}

fn unread(messaging: &Messaging, channel: i64) -> u32 {
	messaging
		.store()
		.read(|store| store.thread(&Identity::channel(channel)).map(|t| t.message_unread_counter))
		.unwrap_or_default()
}

fn mailbox_counter(messaging: &Messaging, mailbox: Mailbox) -> u32 {
	messaging
		.store()
		.read(|store| store.thread(&mailbox.identity()).map(|t| t.counter))
		.unwrap_or_default()
}

#[tokio::test]
async fn unsubscribe_wins_over_updates_for_the_same_channel() {
	let (messaging, _remote, mut ui_rx) = session().await;
	let batch = vec![
		channel_message(7, 50, 9),
		on("res.partner", 3, json!({ "info": "unsubscribe", "id": 7 })),
	];

	assert_eq!(messaging.handle_notifications(batch).await.unwrap(), 1);

	messaging.store().read(|store| {
		assert!(store.message(&Identity::message(MessageId::from(50))).is_none());
		assert!(!store.thread(&Identity::channel(7)).unwrap().is_pinned);
		assert_eq!(store.pinned_channels().len(), 1);
	});
	assert_eq!(drain(&mut ui_rx), vec![UiEvent::notify("You unsubscribed from random.")]);
}

#[tokio::test]
async fn channel_messages_count_as_unread_once_and_not_from_me() {
	let (messaging, _remote, _ui_rx) = session().await;

	messaging.handle_notifications(vec![channel_message(1, 20, 9)]).await.unwrap();
	assert_eq!(unread(&messaging, 1), 1);

	messaging.handle_notifications(vec![channel_message(1, 20, 9)]).await.unwrap();
	assert_eq!(unread(&messaging, 1), 1);

	messaging.handle_notifications(vec![channel_message(1, 21, 3)]).await.unwrap();
	assert_eq!(unread(&messaging, 1), 1);

	let cache = Identity::thread_cache(&Identity::channel(1), &Filter::empty());
	messaging.store().read(|store| {
		let message = store.message(&Identity::message(MessageId::from(20))).unwrap();
		assert!(message.channel_ids.contains(&1));
		assert_eq!(store.thread_cache(&cache).unwrap().message_identities.len(), 2);
	});
}

#[tokio::test]
async fn messages_on_unknown_channels_join_without_opening() {
	let (messaging, remote, mut ui_rx) = session().await;
	remote.respond(
		"mail.channel/channel_join_and_get_info",
		json!({ "id": 12, "name": "design", "channel_type": "channel", "uuid": "d-12", "is_pinned": true }),
	);

	messaging.handle_notifications(vec![channel_message(12, 30, 9)]).await.unwrap();

	assert_eq!(remote.requests_for("mail.channel/channel_join_and_get_info")[0].args(), &[json!([12])]);
	assert_eq!(unread(&messaging, 12), 1);
	messaging.store().read(|store| assert!(store.chat_windows().items().is_empty()));
	assert!(drain(&mut ui_rx).is_empty());
}

#[tokio::test]
async fn failed_join_skips_the_entry_and_keeps_going() {
	let (messaging, remote, _ui_rx) = session().await;
	remote.fail(
		"mail.channel/channel_join_and_get_info",
		RemoteError::Server { message: "access denied".into() },
	);

	let handled = messaging
		.handle_notifications(vec![channel_message(12, 30, 9), channel_message(1, 31, 9)])
		.await
		.unwrap();
	assert_eq!(handled, 1);
	messaging.store().read(|store| {
		assert!(store.message(&Identity::message(MessageId::from(30))).is_none());
		assert!(store.message(&Identity::message(MessageId::from(31))).is_some());
	});
}

#[tokio::test]
async fn channel_seen_only_applies_to_the_current_user() {
	let (messaging, _remote, _ui_rx) = session().await;
	messaging
		.handle_notifications(vec![channel_message(1, 20, 9), channel_message(1, 21, 9)])
		.await
		.unwrap();
	assert_eq!(unread(&messaging, 1), 2);

	let seen = |partner: i64| on("mail.channel", 1, json!({ "info": "channel_seen", "partner_id": partner, "last_message_id": 21 }));
	messaging.handle_notifications(vec![seen(9)]).await.unwrap();
	assert_eq!(unread(&messaging, 1), 2);

	messaging.handle_notifications(vec![seen(3)]).await.unwrap();
	assert_eq!(unread(&messaging, 1), 0);
	messaging.store().read(|store| {
		assert_eq!(store.thread(&Identity::channel(1)).unwrap().seen_message_id, Some(21));
	});
}

#[tokio::test]
async fn needaction_fills_the_inbox_and_mark_as_read_empties_it() {
	let (messaging, _remote, _ui_rx) = session().await;
	let needaction = on(
		"ir.needaction",
		3,
		json!({
			"id": 40,
			"body": "<p>@Administrator ping</p>",
			"author_id": [9, "Marc Demo"],
			"model": "mail.channel",
			"res_id": 1,
			"channel_ids": [1],
			"needaction_partner_ids": [3],
		}),
	);
	messaging.handle_notifications(vec![needaction]).await.unwrap();

	let inbox_cache = Identity::thread_cache(&Mailbox::Inbox.identity(), &Filter::empty());
	let message = Identity::message(MessageId::from(40));
	assert_eq!(mailbox_counter(&messaging, Mailbox::Inbox), 1);
	messaging.store().read(|store| {
		assert_eq!(store.thread(&Identity::channel(1)).unwrap().message_needaction_counter, 1);
		assert!(store.thread_cache(&inbox_cache).unwrap().contains(&message));
	});

	let read = on("res.partner", 3, json!({ "type": "mark_as_read", "message_ids": [40], "channel_ids": [1] }));
	messaging.handle_notifications(vec![read]).await.unwrap();

	assert_eq!(mailbox_counter(&messaging, Mailbox::Inbox), 0);
	messaging.store().read(|store| {
		assert_eq!(store.thread(&Identity::channel(1)).unwrap().message_needaction_counter, 0);
		assert!(!store.thread_cache(&inbox_cache).unwrap().contains(&message));
		assert!(store.message(&message).unwrap().needaction_partner_ids.is_empty());
	});
}

#[tokio::test]
async fn replayed_needaction_counts_once() {
	let (messaging, _remote, _ui_rx) = session().await;
	let needaction = on(
		"ir.needaction",
		3,
		json!({
			"id": 41,
			"body": "<p>@Administrator again</p>",
			"author_id": [9, "Marc Demo"],
			"model": "mail.channel",
			"res_id": 1,
			"channel_ids": [1],
			"needaction_partner_ids": [3],
		}),
	);
	let handled = messaging.handle_notifications(vec![needaction.clone(), needaction]).await.unwrap();

	assert_eq!(handled, 2);
	assert_eq!(mailbox_counter(&messaging, Mailbox::Inbox), 1);
	messaging.store().read(|store| {
		assert_eq!(store.thread(&Identity::channel(1)).unwrap().message_needaction_counter, 1);
	});
}

#[tokio::test]
async fn toggle_star_moves_the_starred_counter_per_message() {
	let (messaging, _remote, _ui_rx) = session().await;
	messaging.handle_notifications(vec![channel_message(1, 20, 9)]).await.unwrap();

	let star = |starred: bool, ids: Value| on("res.partner", 3, json!({ "type": "toggle_star", "message_ids": ids, "starred": starred }));
	messaging.handle_notifications(vec![star(true, json!([20, 999]))]).await.unwrap();
	assert_eq!(mailbox_counter(&messaging, Mailbox::Starred), 2);
	messaging.store().read(|store| {
		let message = store.message(&Identity::message(MessageId::from(20))).unwrap();
		assert!(message.starred_partner_ids.contains(&3));
	});

	messaging.handle_notifications(vec![star(false, json!([20]))]).await.unwrap();
	assert_eq!(mailbox_counter(&messaging, Mailbox::Starred), 1);

	messaging.handle_notifications(vec![star(false, json!([20, 21, 22]))]).await.unwrap();
	assert_eq!(mailbox_counter(&messaging, Mailbox::Starred), 0);
}

#[tokio::test]
async fn transient_messages_get_a_fractional_id_and_the_bot_as_author() {
	let (messaging, _remote, _ui_rx) = session().await;
	messaging.handle_notifications(vec![channel_message(1, 20, 9)]).await.unwrap();

	let transient = on(
		"res.partner",
		3,
		json!({ "info": "transient_message", "body": "<p>You are alone in this channel.</p>", "channel_ids": [1] }),
	);
	messaging.handle_notifications(vec![transient]).await.unwrap();

	let id = MessageId::from(20).next_transient();
	messaging.store().read(|store| {
		let message = store.message(&Identity::message(id)).unwrap();
		assert!(message.is_transient);
		assert!(message.id.as_int().is_none());
		assert_eq!(message.author, Some(Identity::partner(2)));
		assert!(message.channel_ids.contains(&1));
	});
}

#[tokio::test]
async fn invitations_notify_unless_self_created_or_minimized() {
	let (messaging, _remote, mut ui_rx) = session().await;
	let channel = |id: i64, extra: Value| {
		let mut payload = json!({ "id": id, "name": format!("room {id}"), "channel_type": "channel", "is_pinned": true });
		if let (Some(payload), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
			payload.extend(extra.clone());
		}
		on("res.partner", 3, payload)
	};

	let batch = vec![
		channel(20, json!({})),
		channel(21, json!({ "info": "creation" })),
		channel(22, json!({ "is_minimized": true, "state": "open" })),
		channel(1, json!({ "name": "general (renamed)" })),
	];
	assert_eq!(messaging.handle_notifications(batch).await.unwrap(), 4);

	assert_eq!(drain(&mut ui_rx), vec![UiEvent::notify("You have been invited to: room 20")]);
	messaging.store().read(|store| {
		for id in [20, 21, 22] {
			assert!(store.thread(&Identity::channel(id)).is_some());
		}
		assert_eq!(
			store.chat_windows().items(),
			&[ChatWindowItem::Thread(Identity::channel(22))]
		);
		assert_eq!(
			store.thread(&Identity::channel(1)).unwrap().name.as_deref(),
			Some("general (renamed)")
		);
	});
}

#[tokio::test]
async fn partner_notices_reach_the_ui_and_ignored_kinds_stay_silent() {
	let (messaging, _remote, mut ui_rx) = session().await;
	let batch = vec![
		on("res.partner", 3, json!({ "type": "user_connection", "partner_id": 9, "title": "Marc Demo", "message": "is online" })),
		on("res.partner", 3, json!({ "type": "deletion", "message_ids": [1] })),
		on("mail.channel", 1, json!({ "info": "typing_status", "partner_id": 9, "is_typing": true })),
		on("bus.presence", 9, json!({ "im_status": "online" })),
	];

	assert_eq!(messaging.handle_notifications(batch).await.unwrap(), 1);
	assert_eq!(
		drain(&mut ui_rx),
		vec![UiEvent::Notify {
			title: Some("Marc Demo".into()),
			message: "is online".into(),
			sticky: false,
		}]
	);
}

#[tokio::test]
async fn mail_failures_are_recorded() {
	let (messaging, _remote, _ui_rx) = session().await;
	let failure = on(
		"res.partner",
		3,
		json!({
			"type": "mail_failure",
			"elements": [
				{ "message_id": 70, "record_name": "Quote 12", "model": "sale.order", "res_id": 12, "notifications": { "9": ["exception", "Marc Demo"] } },
				{ "message_id": 71, "notifications": { "9": ["sent", "Marc Demo"] } }
			]
		}),
	);
	messaging.handle_notifications(vec![failure]).await.unwrap();
	messaging.store().read(|store| {
		let failures: Vec<_> = store.mail_failures().collect();
		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].message_id, MessageId::from(70));
	});
}

#[tokio::test]
async fn malformed_payloads_are_skipped() {
	let (messaging, _remote, _ui_rx) = session().await;
	let batch = vec![
		on("res.partner", 3, json!({ "type": "toggle_star", "starred": "yes" })),
		channel_message(1, 20, 9),
	];
	assert_eq!(messaging.handle_notifications(batch).await.unwrap(), 1);
	assert_eq!(mailbox_counter(&messaging, Mailbox::Starred), 0);
}
