//! One-shot commands forwarded into the remote context.
//!
//! Commands carry no session state: each call evaluates one expression with
//! a JSON argument and hands back whatever the context returned.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use wa_protocol::scripts;
use wa_runtime::{BridgeExt, RemoteContextBridge};

use crate::error::Result;

#[derive(Clone)]
pub struct CommandSender {
	bridge: Arc<dyn RemoteContextBridge>,
}

impl CommandSender {
	pub fn new(bridge: Arc<dyn RemoteContextBridge>) -> Self {
		Self { bridge }
	}

	/// Evaluates `function` with `arg` and returns the raw JSON result.
	pub async fn invoke(&self, function: &str, arg: Value) -> Result<Value> {
		debug!(target = "wa.bridge", "invoking remote command");
		Ok(self.bridge.run_in_context(function, arg).await?)
	}

	pub async fn invoke_as<T>(&self, function: &str, arg: Value) -> Result<T>
	where
		T: DeserializeOwned + Send,
	{
		Ok(self.bridge.evaluate::<T>(function, arg).await?)
	}

	/// Version of the remote messaging client, if the library exposes it.
	pub async fn wa_version(&self) -> Result<Option<String>> {
		self.invoke_as(scripts::CLIENT_VERSION, Value::Null).await
	}

	/// Raw socket state string reported by the remote client.
	pub async fn connection_state(&self) -> Result<String> {
		self.invoke_as(scripts::CONNECTION_STATE, Value::Null).await
	}

	pub async fn is_main_loaded(&self) -> Result<bool> {
		Ok(self.bridge.probe(scripts::IS_MAIN_LOADED).await?)
	}

	/// Unlinks the device from the account.
	pub async fn logout(&self) -> Result<()> {
		self.invoke(scripts::LOGOUT, Value::Null).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use wa_runtime::{BridgeError, FakeBridge};

	use super::*;
	use crate::error::Error;

	fn sender() -> (Arc<FakeBridge>, CommandSender) {
		let bridge = Arc::new(FakeBridge::new());
		let sender = CommandSender::new(bridge.clone());
		(bridge, sender)
	}

	#[tokio::test]
	async fn invoke_forwards_argument_and_result() {
		let (bridge, sender) = sender();
		bridge.respond_with("(args) => args.chatId", |_, arg| Ok(arg["chatId"].clone()));

		let result = sender.invoke("(args) => args.chatId", json!({"chatId": "123@c.us"})).await.unwrap();

		assert_eq!(result, json!("123@c.us"));
		assert_eq!(bridge.last_arg("(args) => args.chatId"), Some(json!({"chatId": "123@c.us"})));
	}

	#[tokio::test]
	async fn typed_getters_decode_results() {
		let (bridge, sender) = sender();
		bridge.respond(scripts::CLIENT_VERSION, json!("2.3000.1"));
		bridge.respond(scripts::CONNECTION_STATE, json!("CONNECTED"));
		bridge.respond(scripts::IS_MAIN_LOADED, json!(true));

		assert_eq!(sender.wa_version().await.unwrap().as_deref(), Some("2.3000.1"));
		assert_eq!(sender.connection_state().await.unwrap(), "CONNECTED");
		assert!(sender.is_main_loaded().await.unwrap());

		sender.logout().await.unwrap();
		assert_eq!(bridge.calls(scripts::LOGOUT), 1);
	}

	#[tokio::test]
	async fn remote_failures_surface_as_bridge_errors() {
		let (bridge, sender) = sender();
		bridge.fail(scripts::CONNECTION_STATE, "WPP is not defined");

		let err = sender.connection_state().await.unwrap_err();
		assert!(matches!(err, Error::Bridge(BridgeError::Evaluation(_))));
	}
}
