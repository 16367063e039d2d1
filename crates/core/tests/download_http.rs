//! Downloader and pipeline against a local HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aes::Aes256;
use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use parking_lot::Mutex;
use serde_json::json;
use wa::media::download::WEB_ORIGIN;
use wa::{Config, DownloadError, DownloadOptions, Error, MediaCipher, MediaKeyMaterial, MediaMessage, MediaPipeline, MediaRequest, MediaType, Session, SessionHooks};
use wa_runtime::FakeBridge;

const PLAINTEXT: &[u8] = b"a voice note that is not a multiple of sixteen bytes long";

fn key() -> MediaKeyMaterial {
	MediaKeyMaterial::new(STANDARD.encode([7u8; 32]), MediaType::Ptt, PLAINTEXT.len() as u64)
}

fn ciphertext() -> Vec<u8> {
	let key = key();
	let schedule = MediaCipher::derive(&key.media_key, key.media_type).unwrap();
	let pad = (16 - PLAINTEXT.len() % 16) % 16;
	let mut padded = PLAINTEXT.to_vec();
	padded.resize(PLAINTEXT.len() + pad, pad as u8);
	let mut encrypted = cbc::Encryptor::<Aes256>::new_from_slices(schedule.cipher_key(), schedule.iv())
		.unwrap()
		.encrypt_padded_vec_mut::<NoPadding>(&padded);
	// Trailing MAC as sent by the CDN.
	encrypted.extend_from_slice(&[0x5A; 10]);
	encrypted
}

fn fast_retries() -> DownloadOptions {
	DownloadOptions {
		retry_delay_ms: 10,
		status_retry_delay_ms: 10,
		..DownloadOptions::default()
	}
}

struct MediaServer {
	addr: SocketAddr,
	hits: Arc<AtomicUsize>,
	headers: Arc<Mutex<Vec<HeaderMap>>>,
}

impl MediaServer {
	/// Serves the ciphertext at `/media`, answering `failures` times with 503 first.
	async fn start(failures: usize) -> Self {
		let hits = Arc::new(AtomicUsize::new(0));
		let headers = Arc::new(Mutex::new(Vec::new()));
		let body = ciphertext();

		let app = Router::new().route(
			"/media",
			get({
				let hits = Arc::clone(&hits);
				let headers = Arc::clone(&headers);
				move |request_headers: HeaderMap| {
					let hits = Arc::clone(&hits);
					let headers = Arc::clone(&headers);
					let body = body.clone();
					async move {
						headers.lock().push(request_headers);
						if hits.fetch_add(1, Ordering::SeqCst) < failures {
							(StatusCode::SERVICE_UNAVAILABLE, Vec::new())
						} else {
							(StatusCode::OK, body)
						}
					}
				}
			}),
		);

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});

		Self { addr, hits, headers }
	}

	fn url(&self) -> String {
		format!("http://{}/media", self.addr)
	}

	fn request(&self) -> MediaRequest {
		MediaRequest::new(key(), self.url())
	}

	fn hits(&self) -> usize {
		self.hits.load(Ordering::SeqCst)
	}
}

#[tokio::test]
async fn requests_carry_web_client_headers() {
	let server = MediaServer::start(0).await;
	let pipeline = MediaPipeline::from_options(fast_retries()).unwrap();

	pipeline.fetch_and_decrypt(&server.request()).await.unwrap();

	let headers = server.headers.lock();
	let sent = &headers[0];
	let agent = sent[header::USER_AGENT].to_str().unwrap();
	assert!(agent.contains("WhatsApp/"), "user agent was {agent}");
	assert_eq!(sent[header::DNT], "1");
	assert_eq!(sent[header::UPGRADE_INSECURE_REQUESTS], "1");
	assert_eq!(sent[header::ORIGIN], WEB_ORIGIN);
	assert_eq!(sent[header::REFERER], WEB_ORIGIN);
}

#[tokio::test]
async fn user_agent_override_keeps_product_token() {
	let server = MediaServer::start(0).await;
	let options = DownloadOptions {
		user_agent: Some("ExampleBot/1.0".into()),
		..fast_retries()
	};
	let pipeline = MediaPipeline::from_options(options).unwrap();

	pipeline.fetch_and_decrypt(&server.request()).await.unwrap();

	let agent = server.headers.lock()[0][header::USER_AGENT].to_str().unwrap().to_string();
	assert!(agent.starts_with("WhatsApp/"));
	assert!(agent.ends_with("ExampleBot/1.0"));
}

#[tokio::test]
async fn buffered_fetch_waits_out_unavailable_replies() {
	let server = MediaServer::start(2).await;
	let pipeline = MediaPipeline::from_options(fast_retries()).unwrap();

	let plaintext = pipeline.fetch_and_decrypt(&server.request()).await.unwrap();

	assert_eq!(plaintext, PLAINTEXT);
	assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn streaming_fetch_writes_plaintext_and_removes_staging_file() {
	let server = MediaServer::start(1).await;
	let pipeline = MediaPipeline::from_options(fast_retries()).unwrap();
	let dir = tempfile::tempdir().unwrap();
	let output = dir.path().join("note.ogg");

	let written = pipeline.decrypt_to_file(&server.request(), &output).await.unwrap();

	assert_eq!(written, PLAINTEXT.len() as u64);
	assert_eq!(std::fs::read(&output).unwrap(), PLAINTEXT);
	assert!(!wa::media::encrypted_path(&output).exists());
	assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn streaming_fetch_gives_up_after_max_retries() {
	let server = MediaServer::start(usize::MAX).await;
	let pipeline = MediaPipeline::from_options(fast_retries()).unwrap();
	let dir = tempfile::tempdir().unwrap();
	let output = dir.path().join("never.bin");

	let err = pipeline.decrypt_to_file(&server.request(), &output).await.unwrap_err();

	assert!(
		matches!(err, Error::Download(DownloadError::Exhausted { attempts: 3, .. })),
		"unexpected error: {err}"
	);
	assert_eq!(server.hits(), 3);
	assert!(!output.exists());
}

#[tokio::test]
async fn session_decrypts_media_messages() {
	let server = MediaServer::start(0).await;
	let config = Config {
		download: fast_retries(),
		..Config::default()
	};
	let session = Session::new(Arc::new(FakeBridge::new()), config, SessionHooks::new()).unwrap();

	let message: MediaMessage = serde_json::from_value(json!({
		"id": "true_123@c.us_3EB0",
		"type": "ptt",
		"mediaKey": key().media_key,
		"size": PLAINTEXT.len(),
		"deprecatedMms3Url": server.url(),
	}))
	.unwrap();

	assert_eq!(session.decrypt_media(&message).await.unwrap(), PLAINTEXT);

	let dir = tempfile::tempdir().unwrap();
	let output = dir.path().join("note.ogg");
	session.decrypt_media_to_file(&message, &output).await.unwrap();
	assert_eq!(std::fs::read(&output).unwrap(), PLAINTEXT);
}
