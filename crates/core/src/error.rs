use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use wa_runtime::BridgeError;

/// Why a session could not reach a usable state.
///
/// Every terminal failure of the login orchestration carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionFailure {
	/// The pairing code was scanned but the account did not register.
	QrFailed,
	/// Authenticated, but the main interface never finished syncing.
	PhoneNotConnected,
	/// The remote context went away mid-wait.
	ContextClosed,
	/// The login outcome could not be determined.
	Unknown,
	/// An idle or sync watchdog closed the context.
	AutoCloseTriggered,
}

impl SessionFailure {
	pub fn as_str(self) -> &'static str {
		match self {
			SessionFailure::QrFailed => "qrFailed",
			SessionFailure::PhoneNotConnected => "phoneNotConnected",
			SessionFailure::ContextClosed => "contextClosed",
			SessionFailure::Unknown => "unknown",
			SessionFailure::AutoCloseTriggered => "autoCloseTriggered",
		}
	}
}

impl fmt::Display for SessionFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Cause of a single failed HTTP attempt.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("unexpected HTTP status {0}")]
	Status(u16),

	#[error("HTTP request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("sink I/O failed: {0}")]
	Io(#[from] std::io::Error),

	/// Failure reported by a non-HTTP media source.
	#[error("{0}")]
	Other(String),
}

/// Failure to download ciphertext.
#[derive(Debug, Error)]
pub enum DownloadError {
	/// Every bounded attempt failed; carries the last cause.
	#[error("download of {url} failed after {attempts} attempts: {cause}")]
	Exhausted {
		url: String,
		attempts: u32,
		#[source]
		cause: TransportError,
	},

	/// A transport exception stopped an unbounded retry loop.
	#[error("download of {url} aborted: {cause}")]
	Aborted {
		url: String,
		#[source]
		cause: TransportError,
	},

	/// The HTTP client could not be built.
	#[error("failed to set up media downloads: {0}")]
	Setup(#[source] TransportError),

	/// The message carried neither a client URL nor a fallback URL.
	#[error("media message has no download URL")]
	MissingUrl,
}

/// Failure to derive keys or decrypt ciphertext.
#[derive(Debug, Error)]
pub enum DecryptError {
	#[error("media key is not valid base64: {0}")]
	KeyEncoding(#[from] base64::DecodeError),

	#[error("media key must be 32 bytes, got {0}")]
	KeyLength(usize),

	#[error("HKDF expansion failed")]
	KeyDerivation,

	/// The ciphertext stream itself failed mid-way.
	#[error("ciphertext stream failed: {0}")]
	Stream(String),
}

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
	#[error("session '{session}' failed: {kind}")]
	Session { session: String, kind: SessionFailure },

	#[error(transparent)]
	Download(#[from] DownloadError),

	#[error(transparent)]
	Decrypt(#[from] DecryptError),

	#[error(transparent)]
	Bridge(#[from] BridgeError),

	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	pub(crate) fn session(session: &str, kind: SessionFailure) -> Self {
		Error::Session {
			session: session.to_string(),
			kind,
		}
	}

	pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Error::Io { path: path.into(), source }
	}

	/// The session failure discriminator, if this is a session failure.
	pub fn session_failure(&self) -> Option<SessionFailure> {
		match self {
			Error::Session { kind, .. } => Some(*kind),
			_ => None,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
