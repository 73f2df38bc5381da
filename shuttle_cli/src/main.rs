mod cancel;
mod cli;
mod error_fmt;
mod logging;
mod run;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use eyre::Result;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error report handler: {e}");
    }

    let loaded = run::load(&cli.config);
    let guard = logging::init(
        cli.json,
        &cli.log_level,
        loaded.as_ref().ok().map(|l| &l.cfg.logging),
    );

    let code = match loaded.and_then(|l| execute(&cli, l)) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&e));
            } else {
                eprintln!("{}", error_fmt::humanize(&e));
            }
            error_fmt::exit_code_for_error(&e)
        }
    };

    drop(guard);
    std::process::exit(code);
}

/// Run one subcommand; `Ok` carries the process exit code.
fn execute(cli: &Cli, loaded: run::Loaded) -> Result<i32> {
    match &cli.cmd {
        Commands::Plan { args } => {
            let plan = run::plan(&loaded, args)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("{plan}");
            }
            Ok(0)
        }
        Commands::Run {
            args,
            wait_equilibration,
        } => {
            let plan = run::plan(&loaded, args)?;
            let cancel = cancel::Cancellation::install();
            let motor = run::open_motor(&loaded.cfg, cli.simulate)?;
            let summary = run::run_shuttle(loaded, plan, motor, cancel, *wait_equilibration)?;
            if cli.json {
                println!("{}", serde_json::to_string(&summary.to_json())?);
            } else {
                println!("{summary}");
            }
            Ok(summary.exit_code())
        }
        Commands::SelfCheck => {
            let motor = run::open_motor(&loaded.cfg, cli.simulate)?;
            let health = run::self_check(motor, loaded.cfg.io.light_gate_input)?;
            if cli.json {
                println!("{}", health.to_json());
            } else {
                println!("{health}");
            }
            Ok(0)
        }
    }
}
