//! JSON result envelope printed on stdout for every command.

use std::fmt;

use serde::{Deserialize, Serialize};
use wa::{DecryptError, Error};

/// The result envelope returned by all commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: &str, data: T) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data: Some(data),
			error: None,
		}
	}

	pub fn failure(command: &str, error: &anyhow::Error) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: None,
			error: Some(CommandError::from_anyhow(error)),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

impl CommandError {
	fn from_anyhow(error: &anyhow::Error) -> Self {
		let code = error
			.chain()
			.find_map(|cause| cause.downcast_ref::<Error>())
			.map_or(ErrorCode::InternalError, ErrorCode::for_error);

		Self {
			code,
			message: format!("{error:#}"),
		}
	}
}

/// Standardized error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	DownloadFailed,
	InvalidKey,
	DecryptFailed,
	IoError,
	InvalidConfig,
	SessionError,
	InternalError,
}

impl ErrorCode {
	fn for_error(error: &Error) -> Self {
		match error {
			Error::Download(_) => ErrorCode::DownloadFailed,
			Error::Decrypt(DecryptError::KeyEncoding(_) | DecryptError::KeyLength(_)) => ErrorCode::InvalidKey,
			Error::Decrypt(_) => ErrorCode::DecryptFailed,
			Error::Io { .. } => ErrorCode::IoError,
			Error::Config(_) | Error::Json(_) => ErrorCode::InvalidConfig,
			Error::Session { .. } | Error::Bridge(_) => ErrorCode::SessionError,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let code = match self {
			ErrorCode::DownloadFailed => "DOWNLOAD_FAILED",
			ErrorCode::InvalidKey => "INVALID_KEY",
			ErrorCode::DecryptFailed => "DECRYPT_FAILED",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InvalidConfig => "INVALID_CONFIG",
			ErrorCode::SessionError => "SESSION_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(code)
	}
}

/// Prints `result` as pretty JSON on stdout.
pub fn print_result<T: Serialize>(result: &CommandResult<T>) {
	match serde_json::to_string_pretty(result) {
		Ok(json) => println!("{json}"),
		Err(err) => println!(r#"{{"ok":false,"command":"{}","error":{{"code":"INTERNAL_ERROR","message":"{err}"}}}}"#, result.command),
	}
}
