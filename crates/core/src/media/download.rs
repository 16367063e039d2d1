//! Ciphertext download with the two retry policies media callers rely on.
//!
//! * [`Downloader::fetch_to_sink`]: bounded attempts with a fixed backoff;
//!   any transport error or non-2xx status counts as a failed attempt.
//! * [`Downloader::fetch_with_status_retry`]: retries non-200 replies forever
//!   with a short delay, but gives up on the first transport error.
//!
//! Both go through a [`MediaSource`], which issues a single GET. The HTTP
//! implementation sends the same headers as the web client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{DNT, HeaderMap, HeaderValue, ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::DownloadOptions;
use crate::error::{DownloadError, TransportError};

/// Browser user agent used when none is configured.
pub const DEFAULT_USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/102.0.5005.63 Safari/537.36";

/// Product token the media CDN expects in the user agent.
pub const PRODUCT_TOKEN: &str = "WhatsApp/2.16.352";

pub const WEB_ORIGIN: &str = "https://web.whatsapp.com/";

/// Prepends the product token unless the agent already names the product.
pub fn media_user_agent(override_agent: Option<&str>) -> String {
	let agent = override_agent.unwrap_or(DEFAULT_USER_AGENT);
	if agent.contains("WhatsApp") {
		agent.to_string()
	} else {
		format!("{PRODUCT_TOKEN} {agent}")
	}
}

/// Body of a response, delivered in chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// One response from a [`MediaSource`].
pub struct MediaResponse {
	pub status: u16,
	pub body: BodyStream,
}

impl MediaResponse {
	pub fn new(status: u16, body: BodyStream) -> Self {
		Self { status, body }
	}

	/// A response whose body is already in memory.
	pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
		let body: Bytes = body.into();
		Self::new(status, stream::once(async move { Ok(body) }).boxed())
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Issues single GET requests for media URLs.
#[async_trait]
pub trait MediaSource: Send + Sync {
	async fn get(&self, url: &str) -> Result<MediaResponse, TransportError>;
}

/// [`MediaSource`] backed by `reqwest`, sending the web client's headers.
#[derive(Debug, Clone)]
pub struct HttpMediaSource {
	client: reqwest::Client,
}

impl HttpMediaSource {
	pub fn new(options: &DownloadOptions) -> Result<Self, TransportError> {
		let mut headers = HeaderMap::new();
		let agent = media_user_agent(options.user_agent.as_deref());
		headers.insert(
			USER_AGENT,
			HeaderValue::from_str(&agent).map_err(|err| TransportError::Other(format!("invalid user agent: {err}")))?,
		);
		headers.insert(DNT, HeaderValue::from_static("1"));
		headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
		headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
		headers.insert(REFERER, HeaderValue::from_static(WEB_ORIGIN));

		let mut builder = reqwest::Client::builder().default_headers(headers);
		if let Some(timeout) = options.request_timeout() {
			builder = builder.timeout(timeout);
		}

		Ok(Self { client: builder.build()? })
	}
}

#[async_trait]
impl MediaSource for HttpMediaSource {
	async fn get(&self, url: &str) -> Result<MediaResponse, TransportError> {
		let response = self.client.get(url.trim()).send().await?;
		let status = response.status().as_u16();
		let body = response.bytes_stream().map_err(TransportError::Http).boxed();
		Ok(MediaResponse::new(status, body))
	}
}

/// Destination for downloaded bytes.
///
/// `begin` is called before every attempt and must discard whatever a
/// previous failed attempt wrote.
#[async_trait]
pub trait DownloadSink: Send {
	async fn begin(&mut self) -> std::io::Result<()>;
	async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()>;
	async fn finish(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl DownloadSink for Vec<u8> {
	async fn begin(&mut self) -> std::io::Result<()> {
		self.clear();
		Ok(())
	}

	async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
		self.extend_from_slice(chunk);
		Ok(())
	}

	async fn finish(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

/// Writes into a file, truncating it at the start of every attempt.
#[derive(Debug)]
pub struct FileSink {
	path: PathBuf,
	file: Option<tokio::fs::File>,
}

impl FileSink {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), file: None }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[async_trait]
impl DownloadSink for FileSink {
	async fn begin(&mut self) -> std::io::Result<()> {
		self.file = Some(tokio::fs::File::create(&self.path).await?);
		Ok(())
	}

	async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
		match self.file.as_mut() {
			Some(file) => file.write_all(chunk).await,
			None => Err(std::io::Error::other("file sink written before begin")),
		}
	}

	async fn finish(&mut self) -> std::io::Result<()> {
		if let Some(mut file) = self.file.take() {
			file.flush().await?;
			file.sync_all().await?;
		}
		Ok(())
	}
}

/// Downloads ciphertext; holds no per-call state.
#[derive(Clone)]
pub struct Downloader {
	source: Arc<dyn MediaSource>,
	options: DownloadOptions,
}

impl Downloader {
	/// Downloader over HTTP.
	pub fn new(options: DownloadOptions) -> Result<Self, DownloadError> {
		let source = HttpMediaSource::new(&options).map_err(DownloadError::Setup)?;
		Ok(Self::with_source(Arc::new(source), options))
	}

	pub fn with_source(source: Arc<dyn MediaSource>, options: DownloadOptions) -> Self {
		Self { source, options }
	}

	pub fn options(&self) -> &DownloadOptions {
		&self.options
	}

	/// Streams `url` into `sink`, making at most `max_retries` attempts.
	///
	/// Returns the number of bytes written by the successful attempt.
	pub async fn fetch_to_sink<K>(&self, url: &str, sink: &mut K, max_retries: u32) -> Result<u64, DownloadError>
	where
		K: DownloadSink + ?Sized,
	{
		let attempts = max_retries.max(1);
		let mut attempt = 0;

		loop {
			attempt += 1;
			match self.attempt_into(url, sink).await {
				Ok(written) => {
					info!(target = "wa.download", url, attempt, bytes = written, "media downloaded");
					return Ok(written);
				}
				Err(cause) if attempt >= attempts => {
					warn!(target = "wa.download", url, attempt, error = %cause, "all download attempts failed");
					return Err(DownloadError::Exhausted {
						url: url.to_string(),
						attempts: attempt,
						cause,
					});
				}
				Err(cause) => {
					let delay = self.options.retry_delay();
					warn!(
						target = "wa.download",
						url,
						attempt,
						error = %cause,
						retry_in_ms = delay.as_millis() as u64,
						"download attempt failed; retrying"
					);
					tokio::time::sleep(delay).await;
				}
			}
		}
	}

	async fn attempt_into<K>(&self, url: &str, sink: &mut K) -> Result<u64, TransportError>
	where
		K: DownloadSink + ?Sized,
	{
		sink.begin().await?;
		let mut response = self.source.get(url).await?;
		if !response.is_success() {
			return Err(TransportError::Status(response.status));
		}

		let mut written = 0u64;
		while let Some(chunk) = response.body.next().await {
			let chunk = chunk?;
			sink.write_chunk(&chunk).await?;
			written += chunk.len() as u64;
		}
		sink.finish().await?;
		Ok(written)
	}

	/// Fetches `url` fully, retrying every non-200 reply without bound.
	///
	/// A transport error at any point aborts immediately.
	pub async fn fetch_with_status_retry(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
		let abort = |cause: TransportError| {
			warn!(target = "wa.download", url, error = %cause, "download aborted");
			DownloadError::Aborted {
				url: url.to_string(),
				cause,
			}
		};

		let mut attempt = 0u32;
		loop {
			attempt += 1;
			let mut response = self.source.get(url).await.map_err(abort)?;
			if response.status == 200 {
				let mut body = Vec::new();
				while let Some(chunk) = response.body.next().await {
					body.extend_from_slice(&chunk.map_err(abort)?);
				}
				debug!(target = "wa.download", url, attempt, bytes = body.len(), "media fetched");
				return Ok(body);
			}

			let delay = self.options.status_retry_delay();
			debug!(target = "wa.download", url, attempt, status = response.status, "media not ready; retrying");
			tokio::time::sleep(delay).await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;

	use std::time::Duration;

	use parking_lot::Mutex;
	use tokio::time::Instant;

	use super::*;

	enum Reply {
		Status(u16),
		Body(&'static [u8]),
		Fail,
		BrokenBody,
	}

	/// Replays scripted replies and records when each request arrived.
	struct ScriptedSource {
		replies: Mutex<VecDeque<Reply>>,
		requests: Mutex<Vec<Instant>>,
	}

	impl ScriptedSource {
		fn new(replies: Vec<Reply>) -> Arc<Self> {
			Arc::new(Self {
				replies: Mutex::new(replies.into()),
				requests: Mutex::new(Vec::new()),
			})
		}

		fn request_times(&self) -> Vec<Instant> {
			self.requests.lock().clone()
		}
	}

	#[async_trait]
	impl MediaSource for ScriptedSource {
		async fn get(&self, _url: &str) -> Result<MediaResponse, TransportError> {
			self.requests.lock().push(Instant::now());
			match self.replies.lock().pop_front() {
				Some(Reply::Status(status)) => Ok(MediaResponse::from_bytes(status, Bytes::new())),
				Some(Reply::Body(body)) => Ok(MediaResponse::from_bytes(200, body)),
				Some(Reply::BrokenBody) => {
					let chunks: Vec<Result<Bytes, TransportError>> = vec![
						Ok(Bytes::from_static(b"partial")),
						Err(TransportError::Other("connection reset".into())),
					];
					Ok(MediaResponse::new(200, stream::iter(chunks).boxed()))
				}
				Some(Reply::Fail) | None => Err(TransportError::Other("connection refused".into())),
			}
		}
	}

	fn assert_gap(earlier: Instant, later: Instant, expected: Duration) {
		let gap = later - earlier;
		assert!(gap >= expected && gap < expected + Duration::from_millis(50), "gap was {gap:?}");
	}

	fn downloader(source: Arc<ScriptedSource>) -> Downloader {
		Downloader::with_source(source, DownloadOptions::default())
	}

	#[test]
	fn user_agent_gets_product_token() {
		assert!(media_user_agent(None).starts_with("WhatsApp/2.16.352 Mozilla/5.0"));
		assert_eq!(media_user_agent(Some("curl/8")), "WhatsApp/2.16.352 curl/8");
		assert_eq!(media_user_agent(Some("WhatsApp/2.23 Custom")), "WhatsApp/2.23 Custom");
	}

	#[tokio::test(start_paused = true)]
	async fn succeeds_on_third_attempt_after_two_backoffs() {
		let source = ScriptedSource::new(vec![Reply::Fail, Reply::Status(503), Reply::Body(b"ciphertext")]);
		let downloader = downloader(Arc::clone(&source));

		let mut sink = Vec::new();
		let written = downloader.fetch_to_sink("https://mmg.example/a", &mut sink, 3).await.unwrap();

		assert_eq!(written, 10);
		assert_eq!(sink, b"ciphertext");

		let times = source.request_times();
		assert_eq!(times.len(), 3);
		assert_gap(times[0], times[1], Duration::from_secs(5));
		assert_gap(times[1], times[2], Duration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn exhausts_after_max_retries() {
		let source = ScriptedSource::new(vec![Reply::Fail, Reply::Fail, Reply::Status(404), Reply::Body(b"late")]);
		let downloader = downloader(Arc::clone(&source));

		let mut sink = Vec::new();
		let err = downloader.fetch_to_sink("https://mmg.example/b", &mut sink, 3).await.unwrap_err();

		match err {
			DownloadError::Exhausted { attempts, cause, .. } => {
				assert_eq!(attempts, 3);
				assert!(matches!(cause, TransportError::Status(404)));
			}
			other => panic!("unexpected error: {other:?}"),
		}
		assert_eq!(source.request_times().len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn failed_attempt_output_is_discarded() {
		let source = ScriptedSource::new(vec![Reply::BrokenBody, Reply::Body(b"whole")]);
		let downloader = downloader(source);

		let mut sink = Vec::new();
		downloader.fetch_to_sink("https://mmg.example/c", &mut sink, 3).await.unwrap();
		assert_eq!(sink, b"whole");
	}

	#[tokio::test(start_paused = true)]
	async fn file_sink_is_truncated_per_attempt() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("media.enc");
		let source = ScriptedSource::new(vec![Reply::BrokenBody, Reply::Body(b"abc")]);
		let downloader = downloader(source);

		let mut sink = FileSink::new(&path);
		let written = downloader.fetch_to_sink("https://mmg.example/d", &mut sink, 2).await.unwrap();

		assert_eq!(written, 3);
		assert_eq!(std::fs::read(&path).unwrap(), b"abc");
	}

	#[tokio::test(start_paused = true)]
	async fn status_retry_loops_on_non_200() {
		let source = ScriptedSource::new(vec![
			Reply::Status(404),
			Reply::Status(500),
			Reply::Status(204),
			Reply::Body(b"ready"),
		]);
		let downloader = downloader(Arc::clone(&source));

		let body = downloader.fetch_with_status_retry("https://mmg.example/e").await.unwrap();
		assert_eq!(body, b"ready");

		let times = source.request_times();
		assert_eq!(times.len(), 4);
		for pair in times.windows(2) {
			assert_gap(pair[0], pair[1], Duration::from_secs(2));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn status_retry_aborts_on_transport_error() {
		let source = ScriptedSource::new(vec![Reply::Status(503), Reply::Fail, Reply::Body(b"never")]);
		let downloader = downloader(Arc::clone(&source));

		let err = downloader.fetch_with_status_retry("https://mmg.example/f").await.unwrap_err();
		assert!(matches!(err, DownloadError::Aborted { .. }));
		assert_eq!(source.request_times().len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn status_retry_aborts_on_broken_body() {
		let source = ScriptedSource::new(vec![Reply::BrokenBody, Reply::Body(b"never")]);
		let downloader = downloader(Arc::clone(&source));

		let err = downloader.fetch_with_status_retry("https://mmg.example/g").await.unwrap_err();
		assert!(matches!(err, DownloadError::Aborted { .. }));
		assert_eq!(source.request_times().len(), 1);
	}
}
