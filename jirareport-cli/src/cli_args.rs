use std::{env, path::PathBuf};

use anyhow::{anyhow, bail, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum CliAction {
    Run(Invocation),
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Create {
        project: Option<String>,
        issue_type: Option<String>,
        summary: String,
        description: String,
    },
    Attach {
        key: String,
        file: PathBuf,
    },
    Update {
        key: String,
        project: Option<String>,
        status: Option<String>,
        description: Option<String>,
        file: Option<PathBuf>,
    },
    Upsert {
        project: Option<String>,
        status: String,
        summary: String,
        description: String,
        file: Option<PathBuf>,
    },
    Search {
        jql: String,
        all_fields: bool,
        limit: Option<usize>,
        json: bool,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Attach { .. } => "attach",
            Self::Update { .. } => "update",
            Self::Upsert { .. } => "upsert",
            Self::Search { .. } => "search",
        }
    }
}

pub fn parse_cli_action() -> Result<CliAction> {
    parse_args(env::args().skip(1))
}

const DEFAULT_UPSERT_STATUS: &str = "fail";

const HELP: &str = "\
jirareport: report test results to Jira
Usage:
  jirareport [--config <path>] [-v] <command> [options]
Commands:
  create --summary <s> --description <d> [--project <p>] [--type <t>]
  attach --key <key> --file <path>
  update --key <key> [--project <p>] [--status <s>] [--description <d>] [--file <path>]
  upsert --summary <s> --description <d> [--project <p>] [--status <s>] [--file <path>]
         --status defaults to fail
  search --jql <query> [--all-fields] [--limit <n>] [--json]
Statuses: pass, fail, info, or a tracker status name
Exit codes: 0 ok, 1 error, 2 update applied nothing";

pub fn print_help() {
    println!("{HELP}");
}

#[derive(Default)]
struct Options {
    project: Option<String>,
    issue_type: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    key: Option<String>,
    file: Option<PathBuf>,
    status: Option<String>,
    jql: Option<String>,
    limit: Option<usize>,
    all_fields: bool,
    json: bool,
}

fn parse_args<I>(args: I) -> Result<CliAction>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut verbose = false;
    let mut command_name = None;
    let mut options = Options::default();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} requires a value"));
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--project" | "-p" => options.project = Some(value("--project")?),
            "--type" => options.issue_type = Some(value("--type")?),
            "--summary" | "-s" => options.summary = Some(value("--summary")?),
            "--description" | "-d" => options.description = Some(value("--description")?),
            "--key" | "-k" => options.key = Some(value("--key")?),
            "--file" | "-f" => options.file = Some(PathBuf::from(value("--file")?)),
            "--status" => options.status = Some(value("--status")?),
            "--jql" | "-q" => options.jql = Some(value("--jql")?),
            "--limit" => {
                let raw = value("--limit")?;
                let limit = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|limit| *limit > 0)
                    .ok_or_else(|| anyhow!("--limit expects a positive number, got '{raw}'"))?;
                options.limit = Some(limit);
            }
            "--all-fields" => options.all_fields = true,
            "--json" => options.json = true,
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => return Ok(CliAction::Help),
            other if other.starts_with('-') => bail!("Unknown argument: {other}"),
            other => {
                if let Some(previous) = command_name.replace(other.to_string()) {
                    bail!("Unexpected argument '{other}' after command '{previous}'");
                }
            }
        }
    }

    let Some(command_name) = command_name else {
        return Ok(CliAction::Help);
    };
    let command = build_command(&command_name, options)?;

    Ok(CliAction::Run(Invocation {
        config,
        verbose,
        command,
    }))
}

fn build_command(name: &str, options: Options) -> Result<Command> {
    let command = match name {
        "create" => Command::Create {
            project: options.project,
            issue_type: options.issue_type,
            summary: required(options.summary, "--summary", name)?,
            description: required(options.description, "--description", name)?,
        },
        "attach" => Command::Attach {
            key: required(options.key, "--key", name)?,
            file: required(options.file, "--file", name)?,
        },
        "update" => {
            if options.status.is_none() && options.description.is_none() && options.file.is_none()
            {
                bail!("update needs at least one of --status, --description or --file");
            }
            Command::Update {
                key: required(options.key, "--key", name)?,
                project: options.project,
                status: options.status,
                description: options.description,
                file: options.file,
            }
        }
        "upsert" => Command::Upsert {
            project: options.project,
            status: options
                .status
                .unwrap_or_else(|| DEFAULT_UPSERT_STATUS.to_string()),
            summary: required(options.summary, "--summary", name)?,
            description: required(options.description, "--description", name)?,
            file: options.file,
        },
        "search" => Command::Search {
            jql: required(options.jql, "--jql", name)?,
            all_fields: options.all_fields,
            limit: options.limit,
            json: options.json,
        },
        other => bail!("Unknown command: {other}"),
    };
    Ok(command)
}

fn required<T>(value: Option<T>, flag: &str, command: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{command} requires {flag}"))
}
