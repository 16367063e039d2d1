mod cli;
mod commands;
mod logging;
mod output;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;
use crate::output::{CommandResult, print_result};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let name = cli.command.name();
	match commands::dispatch(cli.command, cli.config.as_deref()).await {
		Ok(data) => print_result(&CommandResult::success(name, data)),
		Err(err) => {
			let message = format!("{err:#}");
			error!(target = "wa.cli", command = name, error = %message, "command failed");
			print_result(&CommandResult::<()>::failure(name, &err));
			std::process::exit(1);
		}
	}
}
