#![forbid(unsafe_code)]

use parley_domain::{
	ChannelInfo, Filter, Identity, Mailbox, MessageData, MessageFields, MessageId, RecordId, SessionInfo, ThreadData,
	ThreadFields,
};
use serde_json::json;

use crate::{LoadKind, LoadPlan, Mutation, PAGE_SIZE, Store};

fn store_with_channel(id: i64) -> Store {
	let mut store = Store::new(SessionInfo::default());
	store
		.apply(Mutation::InsertThread(ThreadData::channel(ChannelInfo {
			id,
			fields: ThreadFields {
				name: Some("general".into()),
				..ThreadFields::default()
			},
		})))
		.unwrap();
	store
}

/// Newest first, the order the backend returns them in.
fn messages(ids: impl IntoIterator<Item = i64>, channel: i64) -> Vec<MessageData> {
	let mut ids: Vec<i64> = ids.into_iter().collect();
	ids.reverse();
	ids.into_iter()
		.map(|id| MessageData {
			id: MessageId::from(id),
			fields: MessageFields {
				channel_ids: Some(vec![channel]),
				..MessageFields::default()
			},
		})
		.collect()
}

#[test]
fn initial_load_builds_channel_filter_and_sets_flags() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();

	let LoadPlan::Fetch { filter, limit, kind, .. } = &plan else {
		panic!("channel loads search messages");
	};
	assert_eq!(*kind, LoadKind::Initial);
	assert_eq!(*limit, 30);
	assert_eq!(filter.to_value(), json!([["channel_ids", "in", [1]]]));

	let cache = store.thread_cache(plan.cache()).unwrap();
	assert!(cache.loading && !cache.loaded);
}

#[test]
fn second_begin_while_loading_is_skipped() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	assert!(store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().is_none());
	store.complete_load(&plan, messages(1..=3, 1)).unwrap();
}

#[test]
fn loaded_cache_is_refreshed_with_the_newest_page() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	store.complete_load(&plan, messages(1..=3, 1)).unwrap();

	let refresh = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	let LoadPlan::Fetch { filter, kind, .. } = &refresh else {
		panic!("channel loads search messages");
	};
	assert_eq!(*kind, LoadKind::Refresh);
	assert_eq!(filter.to_value(), json!([["channel_ids", "in", [1]]]));
	let cache = store.thread_cache(refresh.cache()).unwrap();
	assert!(cache.loading && !cache.loaded);
	assert!(store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().is_none());

	assert_eq!(store.complete_load(&refresh, messages(1..=5, 1)).unwrap(), 5);
	let cache = store.thread_cache(refresh.cache()).unwrap();
	assert!(cache.loaded && !cache.loading);
	assert_eq!(cache.message_identities.len(), 5);
}

#[test]
fn failed_refresh_keeps_the_cache_loaded() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	store.complete_load(&plan, messages(1..=3, 1)).unwrap();

	let refresh = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	store.abort_load(&refresh).unwrap();
	let cache = store.thread_cache(refresh.cache()).unwrap();
	assert!(cache.loaded && !cache.loading);
	assert_eq!(cache.message_identities.len(), 3);
}

#[test]
fn full_page_then_short_page_marks_history_loaded() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	assert_eq!(store.complete_load(&plan, messages(105..=134, 1)).unwrap(), 30);

	let cache_id = plan.cache().clone();
	let cache = store.thread_cache(&cache_id).unwrap();
	assert!(cache.loaded && !cache.loading && !cache.all_history_loaded);
	assert_eq!(store.oldest_message_id(&cache_id), Some(MessageId::from(105)));

	let more = store.begin_load_more(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	let LoadPlan::Fetch { filter, kind, .. } = &more else {
		panic!("channel loads search messages");
	};
	assert_eq!(*kind, LoadKind::More);
	assert_eq!(
		filter.to_value(),
		json!([["channel_ids", "in", [1]], ["id", "<", 105]])
	);
	assert!(store.thread_cache(&cache_id).unwrap().loading_more);
	assert!(store.begin_load_more(&thread, &Filter::empty(), PAGE_SIZE).unwrap().is_none());

	store.complete_load(&more, messages(95..=104, 1)).unwrap();
	let cache = store.thread_cache(&cache_id).unwrap();
	assert!(cache.all_history_loaded);
	assert!(!cache.loading_more);
	assert_eq!(cache.message_identities.len(), 40);
	assert_eq!(store.oldest_message_id(&cache_id), Some(MessageId::from(95)));

	assert!(store.begin_load_more(&thread, &Filter::empty(), PAGE_SIZE).unwrap().is_none());
}

#[test]
fn filtered_cache_extends_request_filter() {
	let mut store = store_with_channel(1);
	let filter = Filter::empty().with_term("author_id", "=", 4);
	let plan = store.begin_load(&Identity::channel(1), &filter, PAGE_SIZE).unwrap().unwrap();
	let LoadPlan::Fetch { filter: request, .. } = &plan else {
		panic!("channel loads search messages");
	};
	assert_eq!(
		request.to_value(),
		json!([["author_id", "=", 4], ["channel_ids", "in", [1]]])
	);
	assert_eq!(plan.cache(), &Identity::thread_cache(&Identity::channel(1), &filter));
}

#[test]
fn mailbox_filters() {
	let mut store = Store::new(SessionInfo::default());
	let inbox = store
		.begin_load(&Mailbox::Inbox.identity(), &Filter::empty(), PAGE_SIZE)
		.unwrap()
		.unwrap();
	let LoadPlan::Fetch { filter, .. } = &inbox else {
		panic!("mailbox loads search messages");
	};
	assert_eq!(filter.to_value(), json!([["needaction", "=", true]]));

	let starred = store
		.begin_load(&Mailbox::Starred.identity(), &Filter::empty(), PAGE_SIZE)
		.unwrap()
		.unwrap();
	let LoadPlan::Fetch { filter, .. } = &starred else {
		panic!("mailbox loads search messages");
	};
	assert_eq!(filter.to_value(), json!([["starred", "=", true]]));
}

#[test]
fn abort_restores_flags_for_retry() {
	let mut store = store_with_channel(1);
	let thread = Identity::channel(1);
	let plan = store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().unwrap();
	store.abort_load(&plan).unwrap();

	let cache = store.thread_cache(plan.cache()).unwrap();
	assert!(!cache.loading && !cache.loaded);
	assert!(store.begin_load(&thread, &Filter::empty(), PAGE_SIZE).unwrap().is_some());
}

#[test]
fn document_thread_slices_known_ids() {
	let mut store = Store::new(SessionInfo::default());
	store
		.apply(Mutation::InsertThread(ThreadData {
			model: "crm.lead".into(),
			id: RecordId::Int(12),
			fields: ThreadFields {
				message_ids: Some(vec![1, 2, 3, 4, 5]),
				..ThreadFields::default()
			},
		}))
		.unwrap();
	store
		.apply(Mutation::InsertMessage(MessageData {
			id: MessageId::from(5),
			fields: MessageFields::default(),
		}))
		.unwrap();
	let thread = Identity::new("crm.lead", 12);

	let plan = store.begin_load(&thread, &Filter::empty(), 3).unwrap().unwrap();
	let LoadPlan::FetchIds { ids, .. } = &plan else {
		panic!("document threads format known ids");
	};
	assert_eq!(ids, &vec![4, 3]);

	let fetched = [4, 3]
		.into_iter()
		.map(|id| MessageData {
			id: MessageId::from(id),
			fields: MessageFields {
				model: Some("crm.lead".into()),
				res_id: Some(12),
				..MessageFields::default()
			},
		})
		.collect();
	store.complete_load(&plan, fetched).unwrap();
	let cache_id = plan.cache().clone();
	let cache = store.thread_cache(&cache_id).unwrap();
	assert!(cache.loaded);
	assert!(!cache.all_history_loaded);
	assert_eq!(cache.message_identities.len(), 3);

	let more = store.begin_load_more(&thread, &Filter::empty(), 3).unwrap().unwrap();
	let LoadPlan::FetchIds { ids, .. } = &more else {
		panic!("document threads format known ids");
	};
	assert_eq!(ids, &vec![2, 1]);
	store.complete_load(&more, messages([1, 2], 0)).unwrap();
	assert!(store.thread_cache(&cache_id).unwrap().all_history_loaded);
}

#[test]
fn document_ids_missing_on_the_server_are_forgotten() {
	let mut store = Store::new(SessionInfo::default());
	store
		.apply(Mutation::InsertThread(ThreadData {
			model: "crm.lead".into(),
			id: RecordId::Int(12),
			fields: ThreadFields {
				message_ids: Some(vec![1, 2, 3]),
				..ThreadFields::default()
			},
		}))
		.unwrap();
	let thread = Identity::new("crm.lead", 12);
	let record = |id: i64| MessageData {
		id: MessageId::from(id),
		fields: MessageFields {
			model: Some("crm.lead".into()),
			res_id: Some(12),
			..MessageFields::default()
		},
	};

	let plan = store.begin_load(&thread, &Filter::empty(), 2).unwrap().unwrap();
	let LoadPlan::FetchIds { ids, .. } = &plan else {
		panic!("document threads format known ids");
	};
	assert_eq!(ids, &vec![3, 2]);
	store.complete_load(&plan, vec![record(3), record(2)]).unwrap();
	assert!(!store.thread_cache(plan.cache()).unwrap().all_history_loaded);

	let more = store.begin_load_more(&thread, &Filter::empty(), 2).unwrap().unwrap();
	let LoadPlan::FetchIds { ids, .. } = &more else {
		panic!("document threads format known ids");
	};
	assert_eq!(ids, &vec![1]);
	assert_eq!(store.complete_load(&more, Vec::new()).unwrap(), 0);

	assert!(store.thread_cache(plan.cache()).unwrap().all_history_loaded);
	assert_eq!(store.thread(&thread).unwrap().message_ids, vec![2, 3]);
	assert!(store.begin_load_more(&thread, &Filter::empty(), 2).unwrap().is_none());
}
