#![forbid(unsafe_code)]

//! Typed input schemas for records coming from the backend.
//!
//! Every `*Fields` struct doubles as a diff: `None` means "leave unchanged".

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Mailbox, MessageId, RecordId, model, wire};

/// Relation sent as `[id, display_name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Many2One {
	pub id: i64,
	pub name: Option<String>,
}

impl Many2One {
	pub fn new(id: i64, name: impl Into<String>) -> Self {
		Self {
			id,
			name: Some(name.into()),
		}
	}
}

impl<'de> Deserialize<'de> for Many2One {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = Value::deserialize(deserializer)?;
		match value {
			Value::Number(n) => n
				.as_i64()
				.map(|id| Many2One { id, name: None })
				.ok_or_else(|| D::Error::custom("relation id must be an integer")),
			Value::Array(items) => {
				let id = items
					.first()
					.and_then(Value::as_i64)
					.ok_or_else(|| D::Error::custom("relation pair must start with an integer id"))?;
				let name = items.get(1).and_then(Value::as_str).map(str::to_string);
				Ok(Many2One { id, name })
			}
			other => Err(D::Error::custom(format!("unexpected relation value: {other}"))),
		}
	}
}

impl Serialize for Many2One {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		(self.id, self.name.as_deref().unwrap_or_default()).serialize(serializer)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
	Channel,
	Chat,
	Livechat,
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldState {
	Open,
	Folded,
	#[default]
	Closed,
}

impl FoldState {
	pub const fn as_str(self) -> &'static str {
		match self {
			FoldState::Open => "open",
			FoldState::Folded => "folded",
			FoldState::Closed => "closed",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
	#[default]
	Comment,
	Notification,
	Email,
	UserNotification,
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
	Binary,
	Url,
}

/// The connected user, as known before any fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
	pub partner_id: i64,
	pub partner_display_name: String,
	#[serde(default)]
	pub user_id: Option<i64>,
	#[serde(default)]
	pub user_context: serde_json::Map<String, Value>,
}

impl Default for SessionInfo {
	fn default() -> Self {
		Self {
			partner_id: 3,
			partner_display_name: "Administrator".to_string(),
			user_id: Some(2),
			user_context: serde_json::Map::new(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PartnerFields {
	#[serde(default, alias = "display_name", deserialize_with = "wire::falsy")]
	pub name: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub email: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub im_status: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerData {
	pub id: i64,
	#[serde(flatten)]
	pub fields: PartnerFields,
}

impl PartnerData {
	pub fn new(id: i64, name: impl Into<String>) -> Self {
		Self {
			id,
			fields: PartnerFields {
				name: Some(name.into()),
				..PartnerFields::default()
			},
		}
	}
}

impl From<&Many2One> for PartnerData {
	fn from(relation: &Many2One) -> Self {
		Self {
			id: relation.id,
			fields: PartnerFields {
				name: relation.name.clone(),
				..PartnerFields::default()
			},
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThreadFields {
	#[serde(default, deserialize_with = "wire::falsy")]
	pub name: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub channel_type: Option<ChannelType>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub public: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub uuid: Option<String>,
	#[serde(default)]
	pub is_pinned: Option<bool>,
	#[serde(default)]
	pub is_minimized: Option<bool>,
	#[serde(default, rename = "state", deserialize_with = "wire::falsy")]
	pub fold_state: Option<FoldState>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub message_unread_counter: Option<u32>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub message_needaction_counter: Option<u32>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub counter: Option<u32>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub seen_message_id: Option<i64>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub last_message_id: Option<i64>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub direct_partner: Option<Vec<PartnerData>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub members: Option<Vec<PartnerData>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub message_ids: Option<Vec<i64>>,
}

/// Channel record as returned by channel fetches and notifications.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelInfo {
	pub id: i64,
	#[serde(flatten)]
	pub fields: ThreadFields,
}

/// Thread insertion payload; the model is decided by the caller, never by the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadData {
	pub model: String,
	pub id: RecordId,
	pub fields: ThreadFields,
}

impl ThreadData {
	pub fn new(model: impl Into<String>, id: impl Into<RecordId>) -> Self {
		Self {
			model: model.into(),
			id: id.into(),
			fields: ThreadFields::default(),
		}
	}

	pub fn channel(info: ChannelInfo) -> Self {
		Self {
			model: model::CHANNEL.to_string(),
			id: RecordId::Int(info.id),
			fields: info.fields,
		}
	}

	pub fn mailbox(mailbox: Mailbox, counter: u32) -> Self {
		Self {
			model: model::MAILBOX.to_string(),
			id: RecordId::Alias(mailbox.alias().to_string()),
			fields: ThreadFields {
				counter: Some(counter),
				..ThreadFields::default()
			},
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AttachmentFields {
	#[serde(default, deserialize_with = "wire::falsy")]
	pub filename: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub name: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub mimetype: Option<String>,
	#[serde(default, rename = "type", deserialize_with = "wire::falsy")]
	pub kind: Option<AttachmentKind>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub url: Option<String>,
	#[serde(skip)]
	pub uploading: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttachmentData {
	pub id: i64,
	#[serde(flatten)]
	pub fields: AttachmentFields,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageFields {
	#[serde(default, deserialize_with = "wire::falsy")]
	pub author_id: Option<Many2One>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub body: Option<String>,
	#[serde(default, deserialize_with = "wire::server_datetime")]
	pub date: Option<DateTime<Utc>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub message_type: Option<MessageType>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub subtype_id: Option<Many2One>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub channel_ids: Option<Vec<i64>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub model: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub res_id: Option<i64>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub record_name: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub needaction_partner_ids: Option<Vec<i64>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub starred_partner_ids: Option<Vec<i64>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub moderation_status: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub attachment_ids: Option<Vec<AttachmentData>>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub subject: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub email_from: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub customer_email_status: Option<String>,
	#[serde(skip)]
	pub is_transient: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageData {
	pub id: MessageId,
	#[serde(flatten)]
	pub fields: MessageFields,
}

impl MessageData {
	pub fn new(id: impl Into<MessageId>) -> Self {
		Self {
			id: id.into(),
			fields: MessageFields::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelCommand {
	pub name: String,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub help: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub channel_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CannedResponse {
	pub id: i64,
	pub source: String,
	pub substitution: String,
}

/// One entry of a `mail_failure` notification or of the initial failure list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MailFailureData {
	pub message_id: MessageId,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub record_name: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub model: Option<String>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub res_id: Option<i64>,
	/// `partner_id -> [status, partner_name]`.
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub notifications: BTreeMap<String, Value>,
}

impl MailFailureData {
	/// True when at least one recipient notification is in a failed state.
	pub fn has_failure(&self) -> bool {
		self.notifications.values().any(|entry| {
			let status = match entry {
				Value::Array(items) => items.first().and_then(Value::as_str),
				Value::String(s) => Some(s.as_str()),
				_ => None,
			};
			matches!(status, Some("exception") | Some("bounce"))
		})
	}
}

/// Mention suggestions come either as a flat list or grouped in lists.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PartnerGroup {
	Many(Vec<PartnerData>),
	One(PartnerData),
}

/// Payload of the messaging initialisation route.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InitMessagingData {
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub channel_slots: BTreeMap<String, Vec<ChannelInfo>>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub commands: Vec<ChannelCommand>,
	#[serde(default)]
	pub is_moderator: bool,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub mail_failures: Vec<MailFailureData>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub mention_partner_suggestions: Vec<PartnerGroup>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub menu_id: Option<i64>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub moderation_counter: u32,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub needaction_inbox_counter: u32,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub partner_root: Option<PartnerData>,
	#[serde(default, deserialize_with = "wire::falsy")]
	pub public_partner: Option<PartnerData>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub shortcodes: Vec<CannedResponse>,
	#[serde(default, deserialize_with = "wire::falsy_default")]
	pub starred_counter: u32,
}

impl InitMessagingData {
	pub fn mention_suggestions(&self) -> impl Iterator<Item = &PartnerData> {
		self.mention_partner_suggestions.iter().flat_map(|group| match group {
			PartnerGroup::Many(partners) => partners.iter().collect::<Vec<_>>(),
			PartnerGroup::One(partner) => vec![partner],
		})
	}
}
