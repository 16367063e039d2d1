use std::path::Path;

use anyhow::Result;
use serde_json::{Value, json};
use wa::Config;

pub fn show(config: &Config, source: Option<&Path>) -> Result<Value> {
	Ok(json!({
		"source": source.map(|path| path.display().to_string()),
		"config": serde_json::to_value(config)?,
	}))
}
