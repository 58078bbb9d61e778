//! shell-tether binary entry point.

use std::process::ExitCode;

use shell_tether::api::{serve_with_state, AppState};
use shell_tether::cli::{self, Args};
use shell_tether::config::Config;
use shell_tether::context::ConversationRegistry;
use shell_tether::logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&args)?;
    let _ = logging::init_with_filter(config.log_filter());

    let server = config.to_server_config()?;
    let executor = config.executor();
    info!(
        "shell-tether v{} (shell: {}, validation: {})",
        env!("CARGO_PKG_VERSION"),
        config.shell.program,
        executor.validator().mode()
    );

    let state = AppState::with_parts(ConversationRegistry::new(config.shell_config()), executor)
        .with_quiet_default(config.output.quiet);

    serve_with_state(server, state, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
