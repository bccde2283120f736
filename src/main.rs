//! Speech Onset CLI

use std::path::Path;

use clap::Parser;
use env_logger::Env;
use log::debug;

use speech_onset::cli::{commands, Cli, Commands};
use speech_onset::OnsetError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("Speech Onset v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Detect {
            path,
            nothing_before,
            plot,
            json,
        } => commands::detect(&path, nothing_before, plot, json).map_err(|e| {
            let context = failure_context(&e, &path);
            anyhow::Error::new(e).context(context)
        }),
    }
}

/// One-line context for a failed run: code, path, and recovery hints
fn failure_context(err: &OnsetError, path: &Path) -> String {
    let mut context = format!(
        "[{}] onset detection failed for {}",
        err.error_code(),
        path.display()
    );
    for suggestion in err.recovery_suggestions() {
        context.push_str("\n  hint: ");
        context.push_str(suggestion);
    }
    context
}
