use std::{io, process::ExitCode, time::Instant};

use anyhow::Result;
use jirareport_config::ReportConfig;
use jirareport_jira::JiraClient;
use tracing_subscriber::EnvFilter;

mod adapter;
mod cli_args;
mod telemetry;
mod utils;

use cli_args::{parse_cli_action, print_help, CliAction, Invocation};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("jirareport: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let CliAction::Run(invocation) = parse_cli_action()? else {
        print_help();
        return Ok(ExitCode::SUCCESS);
    };
    init_tracing(invocation.verbose);

    let config = ReportConfig::load(invocation.config.as_deref())?;
    let client = JiraClient::from_config(&config)?;
    execute(&config, &client, &invocation)
}

fn execute(config: &ReportConfig, client: &JiraClient, invocation: &Invocation) -> Result<ExitCode> {
    let op = invocation.command.name();
    let started = Instant::now();

    match adapter::run_command(config, client, &invocation.command) {
        Ok(output) => {
            telemetry::emit_success(op, output.key.as_deref(), started.elapsed());
            for line in &output.lines {
                println!("{line}");
            }
            Ok(output.exit_code)
        }
        Err(error) => {
            telemetry::emit_failure(op, None, started.elapsed(), &format!("{error:#}"));
            Err(error)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "jirareport=debug,jirareport_jira=debug,warn"
    } else {
        "jirareport=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
