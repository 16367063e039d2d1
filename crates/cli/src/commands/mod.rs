mod config;
mod media;

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use wa::Config;

use crate::cli::{Commands, ConfigAction, MediaAction};

pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<Value> {
	let config = load_config(config_path)?;

	match command {
		Commands::Media { action } => match action {
			MediaAction::Fetch {
				url,
				key,
				output,
				streaming,
			} => media::fetch(&config, &url, key, &output, streaming).await,
			MediaAction::Decrypt { input, key, output } => media::decrypt(&input, key, &output).await,
		},
		Commands::Config { action } => match action {
			ConfigAction::Show => config::show(&config, config_path),
		},
	}
}

fn load_config(path: Option<&Path>) -> Result<Config> {
	match path {
		Some(path) => Config::from_file(path).with_context(|| format!("loading config from {}", path.display())),
		None => Ok(Config::default()),
	}
}
