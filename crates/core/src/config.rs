//! Session and download configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below. Durations are stored in milliseconds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where the remote library is loaded from when the context has none.
pub const DEFAULT_LIBRARY_URL: &str = "https://github.com/wppconnect-team/wa-js/releases/latest/download/wppconnect-wa.js";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub session: SessionOptions,
	pub download: DownloadOptions,
}

impl Config {
	pub fn from_json(json: &str) -> Result<Self> {
		let config: Config = serde_json::from_str(json)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let json = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
		Self::from_json(&json)
	}

	pub fn validate(&self) -> Result<()> {
		if self.session.session.trim().is_empty() {
			return Err(Error::Config("session name must not be empty".into()));
		}
		if self.session.auth_poll_ms == 0 || self.session.chat_ready_poll_ms == 0 || self.session.watchdog_tick_ms == 0 {
			return Err(Error::Config("poll intervals must be greater than zero".into()));
		}
		if let Some(phone) = &self.session.phone_number {
			if phone.trim().is_empty() {
				return Err(Error::Config("phone_number must not be empty when set".into()));
			}
		}
		Ok(())
	}
}

/// Controller behaviour for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
	/// Identifier attached to every status notification.
	pub session: String,
	/// Idle-close countdown while waiting for login. `0` disables it.
	pub auto_close_ms: u64,
	/// Bound on the post-authentication sync wait. `0` waits without bound.
	pub device_sync_timeout_ms: u64,
	/// Log the pairing QR as terminal art.
	pub log_qr: bool,
	/// Pair by numeric link code for this phone number instead of QR.
	pub phone_number: Option<String>,
	/// Run the login orchestration as part of [`Session::connect`](crate::Session::connect).
	pub wait_for_login: bool,
	pub auth_poll_ms: u64,
	pub chat_ready_poll_ms: u64,
	/// Registration monitor interval. `0` disables the monitor.
	pub registration_poll_ms: u64,
	/// Coarse health probe interval. `0` disables it.
	pub health_tick_ms: u64,
	pub watchdog_tick_ms: u64,
	pub inject_timeout_ms: u64,
	pub library_url: String,
	pub device_name: Option<String>,
	pub powered_by: Option<String>,
}

impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			session: "session".into(),
			auto_close_ms: 60_000,
			device_sync_timeout_ms: 180_000,
			log_qr: true,
			phone_number: None,
			wait_for_login: true,
			auth_poll_ms: 200,
			chat_ready_poll_ms: 1_000,
			registration_poll_ms: 1_000,
			health_tick_ms: 5_000,
			watchdog_tick_ms: 1_000,
			inject_timeout_ms: 60_000,
			library_url: DEFAULT_LIBRARY_URL.into(),
			device_name: None,
			powered_by: None,
		}
	}
}

impl SessionOptions {
	pub fn auto_close(&self) -> Duration {
		Duration::from_millis(self.auto_close_ms)
	}

	pub fn device_sync_timeout(&self) -> Duration {
		Duration::from_millis(self.device_sync_timeout_ms)
	}

	pub fn auth_poll(&self) -> Duration {
		Duration::from_millis(self.auth_poll_ms)
	}

	pub fn chat_ready_poll(&self) -> Duration {
		Duration::from_millis(self.chat_ready_poll_ms)
	}

	pub fn registration_poll(&self) -> Duration {
		Duration::from_millis(self.registration_poll_ms)
	}

	pub fn health_tick(&self) -> Duration {
		Duration::from_millis(self.health_tick_ms)
	}

	pub fn watchdog_tick(&self) -> Duration {
		Duration::from_millis(self.watchdog_tick_ms)
	}

	pub fn inject_timeout(&self) -> Duration {
		Duration::from_millis(self.inject_timeout_ms)
	}

	/// `true` when either watchdog is configured, which arms the idle-close path.
	pub fn close_on_timeout(&self) -> bool {
		self.auto_close_ms > 0 || self.device_sync_timeout_ms > 0
	}
}

/// HTTP behaviour of the media downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
	/// Overrides the browser user agent; the product token is still prepended.
	pub user_agent: Option<String>,
	pub max_retries: u32,
	pub retry_delay_ms: u64,
	pub status_retry_delay_ms: u64,
	pub request_timeout_ms: Option<u64>,
}

impl Default for DownloadOptions {
	fn default() -> Self {
		Self {
			user_agent: None,
			max_retries: 3,
			retry_delay_ms: 5_000,
			status_retry_delay_ms: 2_000,
			request_timeout_ms: None,
		}
	}
}

impl DownloadOptions {
	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	pub fn status_retry_delay(&self) -> Duration {
		Duration::from_millis(self.status_retry_delay_ms)
	}

	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}
}
