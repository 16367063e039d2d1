//! A session: one controller, one media pipeline and one command sender over
//! the same remote context.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use wa_protocol::MediaMessage;
use wa_runtime::RemoteContextBridge;

use crate::command::CommandSender;
use crate::config::Config;
use crate::connection::{ConnectionController, SessionHooks, SessionState};
use crate::error::Result;
use crate::media::MediaPipeline;

pub struct Session {
	controller: Arc<ConnectionController>,
	media: MediaPipeline,
	commands: CommandSender,
}

impl Session {
	/// Assembles a session without starting it.
	pub fn new(bridge: Arc<dyn RemoteContextBridge>, config: Config, hooks: SessionHooks) -> Result<Self> {
		config.validate()?;
		let Config { session, download } = config;

		let media = MediaPipeline::from_options(download)?;
		let commands = CommandSender::new(Arc::clone(&bridge));
		let controller = ConnectionController::new(session.session.clone(), bridge, session, hooks);

		Ok(Self {
			controller,
			media,
			commands,
		})
	}

	/// Like [`Session::new`] with a caller-built pipeline (custom media source).
	pub fn with_pipeline(bridge: Arc<dyn RemoteContextBridge>, config: Config, hooks: SessionHooks, media: MediaPipeline) -> Result<Self> {
		config.validate()?;
		let session = config.session;
		let commands = CommandSender::new(Arc::clone(&bridge));
		let controller = ConnectionController::new(session.session.clone(), bridge, session, hooks);

		Ok(Self {
			controller,
			media,
			commands,
		})
	}

	/// Builds and starts a session, then runs the login orchestration when
	/// `wait_for_login` is enabled.
	pub async fn connect(bridge: Arc<dyn RemoteContextBridge>, config: Config, hooks: SessionHooks) -> Result<Self> {
		let session = Self::new(bridge, config, hooks)?;
		session.start().await?;
		Ok(session)
	}

	pub async fn start(&self) -> Result<()> {
		self.controller.start().await?;
		if self.controller.options().wait_for_login {
			self.controller.wait_for_login().await?;
			info!(target = "wa.session", session = %self.name(), "session ready");
		}
		Ok(())
	}

	pub fn name(&self) -> &str {
		self.controller.session()
	}

	pub fn state(&self) -> SessionState {
		self.controller.state()
	}

	pub fn controller(&self) -> &Arc<ConnectionController> {
		&self.controller
	}

	pub fn media(&self) -> &MediaPipeline {
		&self.media
	}

	pub fn commands(&self) -> &CommandSender {
		&self.commands
	}

	/// Downloads and decrypts a media message in memory.
	pub async fn decrypt_media(&self, message: &MediaMessage) -> Result<Vec<u8>> {
		let request = MediaPipeline::request_for(message)?;
		self.media.fetch_and_decrypt(&request).await
	}

	/// Downloads and stream-decrypts a media message into `output`.
	pub async fn decrypt_media_to_file(&self, message: &MediaMessage, output: &Path) -> Result<u64> {
		let request = MediaPipeline::request_for(message)?;
		self.media.decrypt_to_file(&request, output).await
	}

	/// Stops the controller's loops and watchdogs; the remote context stays open.
	pub fn shutdown(&self) {
		self.controller.shutdown();
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.controller.shutdown();
	}
}
