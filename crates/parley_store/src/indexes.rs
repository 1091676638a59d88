#![forbid(unsafe_code)]

//! Sorted thread lists kept up to date on every thread write.

use parley_domain::{Identity, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexList {
	PinnedChannels,
	PinnedChats,
	Mailboxes,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct IndexKey {
	priority: u8,
	name: String,
	id: RecordId,
}

impl IndexKey {
	pub(crate) fn new(priority: u8, name: String, id: RecordId) -> Self {
		Self { priority, name, id }
	}
}

#[derive(Debug, Default)]
pub(crate) struct ThreadIndexes {
	pinned_channels: Vec<(IndexKey, Identity)>,
	pinned_chats: Vec<(IndexKey, Identity)>,
	mailboxes: Vec<(IndexKey, Identity)>,
}

impl ThreadIndexes {
	fn entries(&self, list: IndexList) -> &Vec<(IndexKey, Identity)> {
		match list {
			IndexList::PinnedChannels => &self.pinned_channels,
			IndexList::PinnedChats => &self.pinned_chats,
			IndexList::Mailboxes => &self.mailboxes,
		}
	}

	fn entries_mut(&mut self, list: IndexList) -> &mut Vec<(IndexKey, Identity)> {
		match list {
			IndexList::PinnedChannels => &mut self.pinned_channels,
			IndexList::PinnedChats => &mut self.pinned_chats,
			IndexList::Mailboxes => &mut self.mailboxes,
		}
	}

	pub(crate) fn list(&self, list: IndexList) -> impl Iterator<Item = &Identity> {
		self.entries(list).iter().map(|(_, identity)| identity)
	}

	/// Remove `identity` from every list, then insert it at its sorted position
	/// in `placement`'s list, if any.
	pub(crate) fn place(&mut self, identity: &Identity, placement: Option<(IndexList, IndexKey)>) {
		for list in [IndexList::PinnedChannels, IndexList::PinnedChats, IndexList::Mailboxes] {
			self.entries_mut(list).retain(|(_, existing)| existing != identity);
		}
		if let Some((list, key)) = placement {
			let entries = self.entries_mut(list);
			let position = entries.partition_point(|(existing, _)| existing < &key);
			entries.insert(position, (key, identity.clone()));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(name: &str, id: i64) -> IndexKey {
		IndexKey::new(0, name.to_string(), RecordId::Int(id))
	}

	#[test]
	fn place_keeps_sorted_and_moves_between_lists() {
		let mut idx = ThreadIndexes::default();
		idx.place(&Identity::channel(2), Some((IndexList::PinnedChannels, key("general", 2))));
		idx.place(&Identity::channel(1), Some((IndexList::PinnedChannels, key("alpha", 1))));
		idx.place(&Identity::channel(3), Some((IndexList::PinnedChannels, key("general", 3))));

		let order: Vec<_> = idx.list(IndexList::PinnedChannels).cloned().collect();
		assert_eq!(order, vec![Identity::channel(1), Identity::channel(2), Identity::channel(3)]);

		idx.place(&Identity::channel(1), Some((IndexList::PinnedChats, key("alpha", 1))));
		assert_eq!(idx.list(IndexList::PinnedChannels).count(), 2);
		assert_eq!(idx.list(IndexList::PinnedChats).count(), 1);

		idx.place(&Identity::channel(1), None);
		assert_eq!(idx.list(IndexList::PinnedChats).count(), 0);
	}
}
