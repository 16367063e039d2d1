//! wa-rs: drive a remote messaging-client session and decrypt its media.
//!
//! Two halves that share nothing but configuration:
//!
//! * [`connection`] brings a remote script context (driven through a
//!   [`RemoteContextBridge`](wa_runtime::RemoteContextBridge)) from cold start to
//!   an authenticated, synced state and reports status along the way.
//! * [`media`] derives per-message keys, downloads ciphertext with retry and
//!   decrypts it, buffered or streaming. It is stateless and safe to run
//!   concurrently for any number of messages.
//!
//! [`Session`] composes both with a [`CommandSender`] for one-shot remote calls.
//!
//! # Example
//!
//! ```ignore
//! use wa::{Config, Session, SessionHooks};
//!
//! let hooks = SessionHooks::new().on_status(|update| println!("{}: {}", update.session, update.status));
//! let session = Session::connect(bridge, Config::default(), hooks).await?;
//! let bytes = session.decrypt_media(&message).await?;
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod media;
pub mod session;

pub use command::CommandSender;
pub use config::{Config, DownloadOptions, SessionOptions};
pub use connection::{ConnectionController, PairingAttempt, PairingKind, SessionHooks, SessionState, Trigger, WatchdogPurpose};
pub use error::{DecryptError, DownloadError, Error, Result, SessionFailure, TransportError};
pub use media::{Downloader, MediaCipher, MediaPipeline};
pub use session::Session;
pub use wa_protocol::{MediaKeyMaterial, MediaMessage, MediaRequest, MediaType, StatusEvent, StatusUpdate};
