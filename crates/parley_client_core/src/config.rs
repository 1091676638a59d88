#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use parley_domain::SessionInfo;

use crate::ClientCoreError;
use parley_store::{LayoutConstants, PAGE_SIZE, squash::DEFAULT_SQUASH_WINDOW_SECS};

pub const DEFAULT_LOG_FILTER: &str = "info,parley_client_core=debug";

/// Default config path: `~/.parley/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".parley").join("config.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg);
	cfg.validate()?;

	Ok(cfg)
}

/// Client config (v1).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
	pub session: SessionInfo,
	pub messages: MessageSettings,
	pub chat_windows: LayoutConstants,
	pub presence: PresenceSettings,
	pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSettings {
	/// Messages per fetch; a shorter answer means history is exhausted.
	pub page_size: usize,
	/// Longest gap between two messages that still squash.
	pub squash_window: Duration,
	/// Mention suggestions returned per search.
	pub mention_limit: usize,
}

impl Default for MessageSettings {
	fn default() -> Self {
		Self {
			page_size: PAGE_SIZE,
			squash_window: Duration::from_secs(DEFAULT_SQUASH_WINDOW_SECS.unsigned_abs()),
			mention_limit: 10,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSettings {
	pub im_status_interval: Duration,
}

impl Default for PresenceSettings {
	fn default() -> Self {
		Self {
			im_status_interval: Duration::from_secs(50),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
	/// Default `EnvFilter` directive when `RUST_LOG` is unset.
	pub filter: String,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			filter: DEFAULT_LOG_FILTER.to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	session: FileSessionSettings,

	#[serde(default)]
	messages: FileMessageSettings,

	#[serde(default)]
	chat_windows: Option<LayoutConstants>,

	#[serde(default)]
	presence: FilePresenceSettings,

	#[serde(default)]
	logging: FileLoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileSessionSettings {
	partner_id: Option<i64>,
	partner_name: Option<String>,
	user_id: Option<i64>,
	#[serde(default)]
	context: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileMessageSettings {
	page_size: Option<usize>,
	squash_window_secs: Option<u64>,
	mention_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePresenceSettings {
	im_status_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileLoggingSettings {
	filter: Option<String>,
}

impl ClientConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let defaults = SessionInfo::default();
		let user_context: Map<String, Value> = serde_json::to_value(&file.session.context)
			.context("convert [session.context] to JSON")?
			.as_object()
			.cloned()
			.unwrap_or_default();
		let session = SessionInfo {
			partner_id: file.session.partner_id.unwrap_or(defaults.partner_id),
			partner_display_name: file
				.session
				.partner_name
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(defaults.partner_display_name),
			user_id: file.session.user_id.or(defaults.user_id),
			user_context,
		};

		let page_size = file.messages.page_size.unwrap_or(PAGE_SIZE);
		let chat_windows = file.chat_windows.unwrap_or_default();
		let im_status_interval_secs = file.presence.im_status_interval_secs.unwrap_or(50);

		Ok(Self {
			session,
			messages: MessageSettings {
				page_size,
				squash_window: Duration::from_secs(
					file.messages
						.squash_window_secs
						.unwrap_or(DEFAULT_SQUASH_WINDOW_SECS.unsigned_abs()),
				),
				mention_limit: file.messages.mention_limit.unwrap_or(10),
			},
			chat_windows,
			presence: PresenceSettings {
				im_status_interval: Duration::from_secs(im_status_interval_secs),
			},
			logging: LoggingSettings {
				filter: file
					.logging
					.filter
					.filter(|s| !s.trim().is_empty())
					.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
			},
		})
	}
}

impl ClientConfig {
	/// Reject settings the session cannot run with.
	pub fn validate(&self) -> Result<(), ClientCoreError> {
		if self.messages.page_size == 0 {
			return Err(ClientCoreError::Config("messages.page_size must be positive".to_string()));
		}
		if self.chat_windows.window_width == 0 {
			return Err(ClientCoreError::Config("chat_windows.window_width must be positive".to_string()));
		}
		if self.presence.im_status_interval.is_zero() {
			return Err(ClientCoreError::Config(
				"presence.im_status_interval_secs must be positive".to_string(),
			));
		}
		Ok(())
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig) {
	if let Ok(v) = std::env::var("PARLEY_PARTNER_ID")
		&& let Ok(partner_id) = v.trim().parse::<i64>()
	{
		cfg.session.partner_id = partner_id;
		info!(partner_id, "session config: partner_id overridden by env");
	}

	if let Ok(v) = std::env::var("PARLEY_PARTNER_NAME") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.session.partner_display_name = v;
			info!("session config: partner_name overridden by env");
		}
	}

	if let Ok(v) = std::env::var("PARLEY_USER_ID")
		&& let Ok(user_id) = v.trim().parse::<i64>()
	{
		cfg.session.user_id = Some(user_id);
		info!(user_id, "session config: user_id overridden by env");
	}

	if let Ok(v) = std::env::var("PARLEY_IM_STATUS_INTERVAL_SECS")
		&& let Ok(secs) = v.trim().parse::<u64>()
		&& secs > 0
	{
		cfg.presence.im_status_interval = Duration::from_secs(secs);
		info!(secs, "presence config: im_status_interval overridden by env");
	}

	if let Ok(v) = std::env::var("PARLEY_LOG") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.logging.filter = v;
			info!("logging config: filter overridden by env");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn missing_file_yields_defaults() {
		let td = tempdir().expect("tempdir");
		let cfg = load_client_config_from_path(&td.path().join("absent.toml")).expect("defaults");
		assert_eq!(cfg.messages.page_size, 30);
		assert_eq!(cfg.messages.squash_window, Duration::from_secs(60));
		assert_eq!(cfg.chat_windows, LayoutConstants::default());
	}

	#[test]
	fn file_sections_are_read() {
		let raw = r#"
			[session]
			partner_id = 7
			partner_name = "Mitchell"
			context = { lang = "en_US", tz = "Europe/Brussels" }

			[messages]
			page_size = 20
			squash_window_secs = 120

			[chat_windows]
			window_width = 300

			[presence]
			im_status_interval_secs = 5

			[logging]
			filter = "warn"
		"#;
		let cfg = ClientConfig::from_file(toml::from_str(raw).expect("valid toml")).expect("valid config");
		assert_eq!(cfg.session.partner_id, 7);
		assert_eq!(cfg.session.partner_display_name, "Mitchell");
		assert_eq!(cfg.session.user_context.get("lang"), Some(&Value::from("en_US")));
		assert_eq!(cfg.messages.page_size, 20);
		assert_eq!(cfg.messages.squash_window, Duration::from_secs(120));
		assert_eq!(cfg.messages.mention_limit, 10);
		assert_eq!(cfg.chat_windows.window_width, 300);
		assert_eq!(cfg.chat_windows.hidden_menu_width, LayoutConstants::default().hidden_menu_width);
		assert_eq!(cfg.presence.im_status_interval, Duration::from_secs(5));
		assert_eq!(cfg.logging.filter, "warn");
	}

	#[test]
	fn zero_page_size_is_rejected() {
		let raw = "[messages]\npage_size = 0\n";
		let cfg = ClientConfig::from_file(toml::from_str(raw).expect("valid toml")).expect("parsed");
		let err = cfg.validate().unwrap_err();
		assert!(matches!(&err, ClientCoreError::Config(msg) if msg.contains("page_size")));
	}

	#[test]
	fn invalid_file_fails_to_load_with_a_config_error() {
		let td = tempdir().expect("tempdir");
		let path = td.path().join("config.toml");
		std::fs::write(&path, "[chat_windows]\nwindow_width = 0\n").expect("write");
		let err = load_client_config_from_path(&path).unwrap_err();
		assert!(matches!(
			err.downcast_ref::<ClientCoreError>(),
			Some(ClientCoreError::Config(msg)) if msg.contains("window_width")
		));
	}

	#[test]
	fn unreadable_toml_reports_the_path() {
		let td = tempdir().expect("tempdir");
		let path = td.path().join("config.toml");
		std::fs::write(&path, "[messages\n").expect("write");
		let err = load_client_config_from_path(&path).unwrap_err();
		assert!(format!("{err:#}").contains("config.toml"));
	}
}
