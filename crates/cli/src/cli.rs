use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wa_protocol::MediaType;

#[derive(Parser, Debug)]
#[command(name = "wa")]
#[command(about = "Fetch and decrypt messaging-client media from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// JSON configuration file (defaults apply to anything it leaves out)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Encrypted media operations
	Media {
		#[command(subcommand)]
		action: MediaAction,
	},

	/// Configuration inspection
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand, Debug)]
pub enum MediaAction {
	/// Download ciphertext from a media URL and decrypt it
	Fetch {
		/// Pre-authorized media URL
		#[arg(long)]
		url: String,
		#[command(flatten)]
		key: KeyArgs,
		/// Where to write the plaintext
		#[arg(short, long)]
		output: PathBuf,
		/// Stage the ciphertext on disk and decrypt it chunk by chunk
		#[arg(long)]
		streaming: bool,
	},

	/// Decrypt a ciphertext file that is already on disk
	Decrypt {
		/// Encrypted input file
		#[arg(short, long)]
		input: PathBuf,
		#[command(flatten)]
		key: KeyArgs,
		/// Where to write the plaintext
		#[arg(short, long)]
		output: PathBuf,
	},
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
	/// Print the effective configuration
	Show,
}

/// Key material shared by the media commands.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
	/// Base64 media key from the message
	#[arg(long)]
	pub key: String,
	/// Media type: image, video, audio, ptt, document or sticker
	#[arg(long = "type", value_name = "TYPE")]
	pub media_type: MediaType,
	/// Plaintext size in bytes
	#[arg(long)]
	pub size: u64,
}

impl Commands {
	/// Dotted command name used in the result envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Media {
				action: MediaAction::Fetch { .. },
			} => "media.fetch",
			Commands::Media {
				action: MediaAction::Decrypt { .. },
			} => "media.decrypt",
			Commands::Config {
				action: ConfigAction::Show,
			} => "config.show",
		}
	}
}
