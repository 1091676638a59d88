#![forbid(unsafe_code)]

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub mod records;
pub mod wire;

pub use records::{
	AttachmentData, AttachmentFields, AttachmentKind, CannedResponse, ChannelCommand, ChannelInfo, ChannelType,
	FoldState, InitMessagingData, MailFailureData, Many2One, MessageData, MessageFields, MessageType, PartnerData,
	PartnerFields, PartnerGroup, SessionInfo, ThreadData, ThreadFields,
};

/// Backend record kinds the client knows by name.
pub mod model {
	pub const PARTNER: &str = "res.partner";
	pub const CHANNEL: &str = "mail.channel";
	pub const MAILBOX: &str = "mail.box";
	pub const MESSAGE: &str = "mail.message";
	pub const ATTACHMENT: &str = "ir.attachment";
	pub const NEEDACTION: &str = "ir.needaction";
}

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown mailbox: {0}")]
	UnknownMailbox(String),
}

/// The five entity kinds held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
	Partner,
	Thread,
	ThreadCache,
	Message,
	Attachment,
}

impl EntityKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			EntityKind::Partner => "partner",
			EntityKind::Thread => "thread",
			EntityKind::ThreadCache => "thread_cache",
			EntityKind::Message => "message",
			EntityKind::Attachment => "attachment",
		}
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Record id as sent by the backend: a number, or a string alias such as `inbox`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
	Int(i64),
	Alias(String),
}

impl RecordId {
	pub fn as_int(&self) -> Option<i64> {
		match self {
			RecordId::Int(id) => Some(*id),
			RecordId::Alias(_) => None,
		}
	}
}

impl From<i64> for RecordId {
	fn from(id: i64) -> Self {
		RecordId::Int(id)
	}
}

impl From<&str> for RecordId {
	fn from(alias: &str) -> Self {
		RecordId::Alias(alias.to_string())
	}
}

impl fmt::Display for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RecordId::Int(id) => write!(f, "{id}"),
			RecordId::Alias(alias) => f.write_str(alias),
		}
	}
}

/// Message id. Server messages carry integers; locally synthesized transient
/// messages use a fractional id just above the latest known one.
#[derive(Debug, Clone, Copy)]
pub struct MessageId(pub f64);

impl MessageId {
	pub fn as_int(self) -> Option<i64> {
		(self.0.fract() == 0.0).then_some(self.0 as i64)
	}

	pub fn is_transient(self) -> bool {
		self.0.fract() != 0.0
	}

	/// Id one hundredth above `self`, rounded to two decimals.
	pub fn next_transient(self) -> Self {
		Self(((self.0 * 100.0).round() + 1.0) / 100.0)
	}
}

impl From<i64> for MessageId {
	fn from(id: i64) -> Self {
		Self(id as f64)
	}
}

impl PartialEq for MessageId {
	fn eq(&self, other: &Self) -> bool {
		self.0.total_cmp(&other.0) == Ordering::Equal
	}
}

impl Eq for MessageId {}

impl PartialOrd for MessageId {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for MessageId {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.total_cmp(&other.0)
	}
}

impl Hash for MessageId {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.to_bits().hash(state);
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for MessageId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.as_int() {
			Some(id) => serializer.serialize_i64(id),
			None => serializer.serialize_f64(self.0),
		}
	}
}

impl<'de> Deserialize<'de> for MessageId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		f64::deserialize(deserializer).map(MessageId)
	}
}

/// Virtual cross-thread mailboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mailbox {
	Inbox,
	Starred,
	Moderation,
}

impl Mailbox {
	pub const ALL: [Mailbox; 3] = [Mailbox::Inbox, Mailbox::Starred, Mailbox::Moderation];

	pub const fn alias(self) -> &'static str {
		match self {
			Mailbox::Inbox => "inbox",
			Mailbox::Starred => "starred",
			Mailbox::Moderation => "moderation",
		}
	}

	/// Display order in the mailbox list (lower first).
	pub const fn priority(self) -> u8 {
		match self {
			Mailbox::Inbox => 0,
			Mailbox::Starred => 1,
			Mailbox::Moderation => 2,
		}
	}

	pub fn identity(self) -> Identity {
		Identity::new(model::MAILBOX, self.alias())
	}
}

impl FromStr for Mailbox {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s {
			"inbox" => Ok(Mailbox::Inbox),
			"starred" => Ok(Mailbox::Starred),
			"moderation" => Ok(Mailbox::Moderation),
			other => Err(ParseIdError::UnknownMailbox(other.to_string())),
		}
	}
}

/// Globally unique entity key, `"<kind>_<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
	pub fn new(kind: &str, id: impl fmt::Display) -> Self {
		Self(format!("{kind}_{id}"))
	}

	pub fn partner(id: i64) -> Self {
		Self::new(model::PARTNER, id)
	}

	pub fn channel(id: i64) -> Self {
		Self::new(model::CHANNEL, id)
	}

	pub fn thread(model: &str, id: &RecordId) -> Self {
		Self::new(model, id)
	}

	pub fn message(id: MessageId) -> Self {
		Self::new(model::MESSAGE, id)
	}

	pub fn attachment(id: i64) -> Self {
		Self::new(model::ATTACHMENT, id)
	}

	/// Cache key: `"<threadIdentity>_<serializedFilter>"`.
	pub fn thread_cache(thread: &Identity, filter: &Filter) -> Self {
		Self(format!("{thread}_{filter}"))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Reference to a thread by backend model and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
	pub model: String,
	pub id: RecordId,
}

impl ThreadRef {
	pub fn new(model: impl Into<String>, id: impl Into<RecordId>) -> Self {
		Self {
			model: model.into(),
			id: id.into(),
		}
	}

	pub fn channel(id: i64) -> Self {
		Self::new(model::CHANNEL, id)
	}

	pub fn mailbox(mailbox: Mailbox) -> Self {
		Self::new(model::MAILBOX, mailbox.alias())
	}

	pub fn identity(&self) -> Identity {
		Identity::thread(&self.model, &self.id)
	}

	pub fn is_channel(&self) -> bool {
		self.model == model::CHANNEL
	}

	pub fn is_mailbox(&self) -> bool {
		self.model == model::MAILBOX
	}
}

impl fmt::Display for ThreadRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}_{}", self.model, self.id)
	}
}

/// Search filter ("domain"): a list of `[field, operator, value]` terms.
/// Its compact JSON serialization is part of the cache identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Vec<serde_json::Value>);

impl Filter {
	pub fn empty() -> Self {
		Self(Vec::new())
	}

	pub fn from_terms(terms: Vec<serde_json::Value>) -> Self {
		Self(terms)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn terms(&self) -> &[serde_json::Value] {
		&self.0
	}

	/// Copy of this filter with `[field, operator, value]` appended.
	pub fn with_term(&self, field: &str, operator: &str, value: impl Into<serde_json::Value>) -> Self {
		let mut terms = self.0.clone();
		terms.push(serde_json::json!([field, operator, value.into()]));
		Self(terms)
	}

	/// Copy of this filter with all terms of `other` appended.
	pub fn extended(&self, other: &Filter) -> Self {
		let mut terms = self.0.clone();
		terms.extend(other.0.iter().cloned());
		Self(terms)
	}

	pub fn to_value(&self) -> serde_json::Value {
		serde_json::Value::Array(self.0.clone())
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let serialized = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
		f.write_str(&serialized)
	}
}
