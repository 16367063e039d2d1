use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;
use wa::{Config, MediaKeyMaterial, MediaPipeline, MediaRequest};

use crate::cli::KeyArgs;

fn key_material(key: KeyArgs) -> MediaKeyMaterial {
	MediaKeyMaterial::new(key.key, key.media_type, key.size)
}

pub async fn fetch(config: &Config, url: &str, key: KeyArgs, output: &Path, streaming: bool) -> Result<Value> {
	let media_type = key.media_type;
	let pipeline = MediaPipeline::from_options(config.download.clone())?;
	let request = MediaRequest::new(key_material(key), url);

	let written = if streaming {
		pipeline
			.decrypt_to_file(&request, output)
			.await
			.with_context(|| format!("fetching {url}"))?
	} else {
		let plaintext = pipeline.fetch_and_decrypt(&request).await.with_context(|| format!("fetching {url}"))?;
		tokio::fs::write(output, &plaintext)
			.await
			.with_context(|| format!("writing {}", output.display()))?;
		plaintext.len() as u64
	};

	info!(target = "wa.cli", path = %output.display(), bytes = written, "media saved");
	Ok(json!({
		"output": output.display().to_string(),
		"bytes": written,
		"mediaType": media_type.as_str(),
		"mode": if streaming { "streaming" } else { "buffered" },
	}))
}

pub async fn decrypt(input: &Path, key: KeyArgs, output: &Path) -> Result<Value> {
	let media_type = key.media_type;
	let written = MediaPipeline::decrypt_file(input, output, &key_material(key))
		.await
		.with_context(|| format!("decrypting {}", input.display()))?;

	info!(target = "wa.cli", path = %output.display(), bytes = written, "media decrypted");
	Ok(json!({
		"input": input.display().to_string(),
		"output": output.display().to_string(),
		"bytes": written,
		"mediaType": media_type.as_str(),
	}))
}
