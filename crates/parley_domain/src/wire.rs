#![forbid(unsafe_code)]

//! Coercion helpers for values as the backend sends them.
//!
//! The backend uses `false` for "no value" on every field type and sends
//! relations as `[id, display_name]` pairs.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

const SERVER_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deserialize `false`/`null` as `None`, anything else as `Some(T)`.
pub fn falsy<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let value = Value::deserialize(deserializer)?;
	match value {
		Value::Null | Value::Bool(false) => Ok(None),
		other => T::deserialize(other).map(Some).map_err(D::Error::custom),
	}
}

/// Same as [`falsy`] but yields `T::default()` for missing values.
pub fn falsy_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned + Default,
{
	falsy(deserializer).map(Option::unwrap_or_default)
}

/// Server datetime (`YYYY-MM-DD HH:MM:SS`, UTC) or RFC 3339.
pub fn server_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(raw) = falsy::<D, String>(deserializer)? else {
		return Ok(None);
	};
	parse_server_datetime(&raw)
		.map(Some)
		.ok_or_else(|| D::Error::custom(format!("invalid server datetime: {raw}")))
}

pub fn parse_server_datetime(raw: &str) -> Option<DateTime<Utc>> {
	let raw = raw.trim();
	if let Ok(naive) = NaiveDateTime::parse_from_str(raw, SERVER_DATETIME_FORMAT) {
		return Some(naive.and_utc());
	}
	if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
		return Some(naive.and_utc());
	}
	DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
	use chrono::{Datelike, Timelike};
	use serde::Deserialize;

	use super::*;

	#[derive(Debug, Deserialize)]
	struct Probe {
		#[serde(default, deserialize_with = "falsy")]
		name: Option<String>,
		#[serde(default, deserialize_with = "falsy_default")]
		ids: Vec<i64>,
		#[serde(default, deserialize_with = "server_datetime")]
		date: Option<DateTime<Utc>>,
	}

	#[test]
	fn false_means_absent() {
		let p: Probe = serde_json::from_str(r#"{"name": false, "ids": false, "date": false}"#).unwrap();
		assert!(p.name.is_none());
		assert!(p.ids.is_empty());
		assert!(p.date.is_none());
	}

	#[test]
	fn missing_fields_default() {
		let p: Probe = serde_json::from_str("{}").unwrap();
		assert!(p.name.is_none());
		assert!(p.ids.is_empty());
	}

	#[test]
	fn server_datetime_parses_backend_format() {
		let p: Probe = serde_json::from_str(r#"{"date": "2020-03-04 10:11:12"}"#).unwrap();
		let dt = p.date.unwrap();
		assert_eq!((dt.year(), dt.month(), dt.day()), (2020, 3, 4));
		assert_eq!((dt.hour(), dt.minute(), dt.second()), (10, 11, 12));
	}

	#[test]
	fn server_datetime_rejects_garbage() {
		let err = serde_json::from_str::<Probe>(r#"{"date": "yesterday"}"#).unwrap_err();
		assert!(err.to_string().contains("invalid server datetime"));
	}
}
