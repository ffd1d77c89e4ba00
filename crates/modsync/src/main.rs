mod app;
mod cli;
mod error;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use log::warn;
use modsync_platform::AppPaths;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::cli::Cli;
use crate::error::AppError;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match cli.home.clone() {
        Some(home) => AppPaths::rooted(home),
        None => match AppPaths::new() {
            Ok(paths) => paths,
            Err(error) => return report_error(&AppError::from(error)),
        },
    };
    let settings = Settings::load(&paths);
    logging::init_logging(
        &paths,
        settings.debug_logging,
        cli.verbose,
        settings.max_log_size_bytes,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next checkpoint");
            on_interrupt.cancel();
        }
    });

    let mut app = App::new(paths, settings);
    match app.run(cli.repo, cli.command, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error),
    }
}

fn report_error(error: &AppError) -> ExitCode {
    match error.code() {
        Some(code) => eprintln!("error [{code}]: {error}"),
        None => eprintln!("error: {error}"),
    }
    if let Some(hint) = error.hint() {
        eprintln!("hint: {hint}");
    }
    ExitCode::from(error.exit_code())
}
