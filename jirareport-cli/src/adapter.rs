use std::process::ExitCode;

use anyhow::{Context, Result};
use jirareport_config::ReportConfig;
use jirareport_domain::{
    Attachment, DetailLevel, IssueDraft, IssueKey, IssueUpdate, ReportStatus, SearchQuery,
    SearchResult, UpsertOutcome,
};
use jirareport_jira::JiraClient;

use crate::cli_args::Command;

/// Exit status for an update that went through but changed nothing.
const EXIT_UNCHANGED: u8 = 2;

#[derive(Debug)]
pub struct CommandOutput {
    pub key: Option<String>,
    pub lines: Vec<String>,
    pub exit_code: ExitCode,
}

impl CommandOutput {
    fn done(key: Option<String>, lines: Vec<String>) -> Self {
        Self {
            key,
            lines,
            exit_code: ExitCode::SUCCESS,
        }
    }
}

pub fn run_command(
    config: &ReportConfig,
    client: &JiraClient,
    command: &Command,
) -> Result<CommandOutput> {
    match command {
        Command::Create {
            project,
            issue_type,
            summary,
            description,
        } => {
            let project = config.resolve_project(project.as_deref())?;
            let mut draft = IssueDraft::new(project, summary.as_str(), description.as_str());
            if let Some(issue_type) = issue_type {
                draft = draft.with_issue_type(issue_type.as_str());
            }
            let key = client.create_issue(&draft)?;
            Ok(CommandOutput::done(
                Some(key.to_string()),
                vec![format!("created {key}"), issue_link(config, &key)],
            ))
        }
        Command::Attach { key, file } => {
            let key = IssueKey::parse(key)?;
            client.update_issue_attachment(&key, &Attachment::new(file))?;
            Ok(CommandOutput::done(
                Some(key.to_string()),
                vec![format!("attached {} to {key}", file.display())],
            ))
        }
        Command::Update {
            key,
            project,
            status,
            description,
            file,
        } => {
            let mut update = IssueUpdate::new(key.as_str());
            update.project = project.clone().or_else(|| config.default_project.clone());
            update.status = status.as_deref().map(str::parse::<ReportStatus>).transpose()?;
            update.description = description.clone();
            update.attachment = file.as_ref().map(Attachment::new);

            if client.update_issue(&update)? {
                Ok(CommandOutput::done(
                    Some(key.clone()),
                    vec![format!("updated {key}")],
                ))
            } else {
                Ok(CommandOutput {
                    key: Some(key.clone()),
                    lines: vec![format!("no changes applied to {key}")],
                    exit_code: ExitCode::from(EXIT_UNCHANGED),
                })
            }
        }
        Command::Upsert {
            project,
            status,
            summary,
            description,
            file,
        } => {
            let project = config.resolve_project(project.as_deref())?;
            let status = status.parse::<ReportStatus>()?;
            let attachment = file.as_ref().map(Attachment::new);
            let outcome =
                client.upsert_issue(&status, summary, description, project, attachment.as_ref())?;
            let line = match &outcome {
                UpsertOutcome::Created { key } => format!("created {key}"),
                UpsertOutcome::Updated { key, changed: true } => format!("updated {key}"),
                UpsertOutcome::Updated {
                    key,
                    changed: false,
                } => format!("{key} already up to date"),
            };
            Ok(CommandOutput::done(
                Some(outcome.key().to_string()),
                vec![line, issue_link(config, outcome.key())],
            ))
        }
        Command::Search {
            jql,
            all_fields,
            limit,
            json,
        } => {
            let detail = if *all_fields {
                DetailLevel::AllFields
            } else {
                DetailLevel::Standard
            };
            let mut query = SearchQuery::new(jql.as_str(), detail);
            query.limit = *limit;
            let result = client.search_issues(&query)?;

            let lines = if *json {
                vec![serde_json::to_string_pretty(&result)
                    .context("failed to encode search result")?]
            } else {
                search_lines(&result)
            };
            Ok(CommandOutput::done(None, lines))
        }
    }
}

fn search_lines(result: &SearchResult) -> Vec<String> {
    let mut lines = vec![format!(
        "JIRA search completed: {} total issues, {} returned",
        result.total,
        result.issues.len()
    )];
    if result.is_empty() {
        lines.push("no issues matched".to_string());
    }
    lines.extend(result.issues.iter().map(ToString::to_string));
    lines
}

fn issue_link(config: &ReportConfig, key: &IssueKey) -> String {
    config
        .issue_url(key.as_str())
        .unwrap_or_else(|_| key.to_string())
}
