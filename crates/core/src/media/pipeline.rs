//! Fetch-and-decrypt as one call.
//!
//! The buffered path downloads the whole ciphertext with the status-retry
//! policy and decrypts it in memory. The streaming path downloads into a
//! `<output>.encrypted` file with the bounded-retry policy, decrypts it
//! chunk by chunk into `output`, then removes the encrypted file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::pin::pin;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use wa_protocol::{MediaKeyMaterial, MediaMessage, MediaRequest};

use crate::config::DownloadOptions;
use crate::error::{DownloadError, Error, Result};
use crate::media::cipher::MediaCipher;
use crate::media::download::{Downloader, FileSink};

/// Path the ciphertext is staged at while `output` is being produced.
pub fn encrypted_path(output: &Path) -> PathBuf {
	let mut name = OsString::from(output.as_os_str());
	name.push(".encrypted");
	PathBuf::from(name)
}

/// Stateless across calls; clone freely and run concurrently.
#[derive(Clone)]
pub struct MediaPipeline {
	downloader: Downloader,
}

impl MediaPipeline {
	pub fn new(downloader: Downloader) -> Self {
		Self { downloader }
	}

	/// Pipeline over HTTP with the given download behaviour.
	pub fn from_options(options: DownloadOptions) -> Result<Self> {
		Ok(Self::new(Downloader::new(options)?))
	}

	pub fn downloader(&self) -> &Downloader {
		&self.downloader
	}

	/// Builds the request for a media message, preferring its client URL.
	pub fn request_for(message: &MediaMessage) -> Result<MediaRequest> {
		message.to_request().ok_or(Error::Download(DownloadError::MissingUrl))
	}

	/// Downloads the ciphertext into memory and returns the plaintext.
	pub async fn fetch_and_decrypt(&self, request: &MediaRequest) -> Result<Vec<u8>> {
		let ciphertext = self.downloader.fetch_with_status_retry(&request.url).await?;
		let plaintext = MediaCipher::decrypt(&ciphertext, &request.key)?;

		info!(
			target = "wa.media",
			media_type = %request.key.media_type,
			bytes = plaintext.len(),
			"media decrypted"
		);
		Ok(plaintext)
	}

	/// Downloads to a staging file, stream-decrypts into `output`, and returns
	/// the number of plaintext bytes written.
	pub async fn decrypt_to_file(&self, request: &MediaRequest, output: &Path) -> Result<u64> {
		let staging = encrypted_path(output);
		let mut sink = FileSink::new(&staging);
		let max_retries = self.downloader.options().max_retries;
		self.downloader.fetch_to_sink(&request.url, &mut sink, max_retries).await?;

		let written = Self::decrypt_file(&staging, output, &request.key).await?;

		tokio::fs::remove_file(&staging).await.map_err(|err| Error::io(&staging, err))?;
		debug!(target = "wa.media", path = %staging.display(), "staging file removed");
		Ok(written)
	}

	/// Stream-decrypts a local ciphertext file into `output`.
	pub async fn decrypt_file(input: &Path, output: &Path, key: &MediaKeyMaterial) -> Result<u64> {
		let source = tokio::fs::File::open(input).await.map_err(|err| Error::io(input, err))?;
		let mut plaintext = pin!(MediaCipher::decrypt_stream(ReaderStream::new(source), key)?);

		let mut target = tokio::fs::File::create(output).await.map_err(|err| Error::io(output, err))?;
		let mut written = 0u64;
		while let Some(chunk) = plaintext.next().await {
			let chunk = chunk?;
			target.write_all(&chunk).await.map_err(|err| Error::io(output, err))?;
			written += chunk.len() as u64;
		}
		target.flush().await.map_err(|err| Error::io(output, err))?;

		info!(
			target = "wa.media",
			media_type = %key.media_type,
			path = %output.display(),
			bytes = written,
			"media decrypted to file"
		);
		Ok(written)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn staging_path_appends_suffix() {
		assert_eq!(encrypted_path(Path::new("/tmp/photo.jpg")), PathBuf::from("/tmp/photo.jpg.encrypted"));
		assert_eq!(encrypted_path(Path::new("clip")), PathBuf::from("clip.encrypted"));
	}

	#[test]
	fn request_for_message_without_url_fails() {
		let message: MediaMessage = serde_json::from_value(serde_json::json!({
			"type": "image",
			"mediaKey": "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=",
			"size": 10,
			"clientUrl": "  ",
		}))
		.unwrap();

		let err = MediaPipeline::request_for(&message).unwrap_err();
		assert!(matches!(err, Error::Download(DownloadError::MissingUrl)));
	}
}
