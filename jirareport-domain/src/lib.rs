use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::PathBuf,
    str::FromStr,
};

use serde::Serialize;
use serde_json::Value;

mod error;

pub use error::{ErrorKind, ReportError, Result};

/// Tracker-assigned issue identifier such as `SKP-283`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ReportError::validation("issue key cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueDraft {
    pub project: String,
    pub issue_type: Option<String>,
    pub summary: String,
    pub description: String,
}

impl IssueDraft {
    pub fn new(
        project: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            issue_type: None,
            summary: summary.into(),
            description: description.into(),
        }
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = Some(issue_type.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("project", &self.project)?;
        require_non_empty("summary", &self.summary)?;
        require_non_empty("description", &self.description)?;
        Ok(())
    }
}

/// Outcome recorded by a test run, or a tracker status named directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportStatus {
    Pass,
    Fail,
    Info,
    Native(String),
}

impl ReportStatus {
    pub fn label(&self) -> &str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Info => "INFO",
            Self::Native(name) => name,
        }
    }
}

impl FromStr for ReportStatus {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" => Err(ReportError::validation("status cannot be empty")),
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "info" => Ok(Self::Info),
            _ => Ok(Self::Native(trimmed.to_string())),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A local file to upload and associate with an issue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the whole file. Missing, unreadable and empty files all fail.
    pub fn read(&self) -> Result<AttachmentPayload> {
        let payload = self.load()?;
        if payload.bytes.is_empty() {
            return Err(self.io_error(io::ErrorKind::InvalidData, "file is empty"));
        }
        Ok(payload)
    }

    /// Reads the whole file, accepting an empty one.
    pub fn load(&self) -> Result<AttachmentPayload> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| self.io_error(io::ErrorKind::InvalidInput, "path has no file name"))?;

        let bytes = fs::read(&self.path).map_err(|source| ReportError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(AttachmentPayload { file_name, bytes })
    }

    fn io_error(&self, kind: io::ErrorKind, message: &str) -> ReportError {
        ReportError::Io {
            path: self.path.clone(),
            source: io::Error::new(kind, message.to_string()),
        }
    }
}

/// Changes to apply to an existing issue. At least one change field must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub key: String,
    pub project: Option<String>,
    pub status: Option<ReportStatus>,
    pub description: Option<String>,
    pub attachment: Option<Attachment>,
}

impl IssueUpdate {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("issue key", &self.key)?;
        if let Some(description) = self.description.as_deref() {
            require_non_empty("description", description)?;
        }
        if self.status.is_none() && self.description.is_none() && self.attachment.is_none() {
            return Err(ReportError::validation(
                "update must change at least one of status, description or attachment",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetailLevel {
    #[default]
    Standard,
    AllFields,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub jql: String,
    pub detail: DetailLevel,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(jql: impl Into<String>, detail: DetailLevel) -> Self {
        Self {
            jql: jql.into(),
            detail,
            limit: None,
        }
    }

    pub fn standard(jql: impl Into<String>) -> Self {
        Self::new(jql, DetailLevel::Standard)
    }

    pub fn all_fields(jql: impl Into<String>) -> Self {
        Self::new(jql, DetailLevel::AllFields)
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IssueSummary {
    pub key: String,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    /// Raw tracker fields, only populated for [`DetailLevel::AllFields`].
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

impl fmt::Display for IssueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Issue: {} | Summary: {} | Status: {} | Assignee: {}",
            self.key,
            self.summary.as_deref().unwrap_or("<no summary>"),
            self.status.as_deref().unwrap_or("N/A"),
            self.assignee.as_deref().unwrap_or("Unassigned"),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub total: usize,
    pub issues: Vec<IssueSummary>,
}

impl SearchResult {
    /// Builds a result whose `total` never falls below the number of issues held.
    pub fn new(total: usize, issues: Vec<IssueSummary>) -> Self {
        Self {
            total: total.max(issues.len()),
            issues,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Which branch an upsert took.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created { key: IssueKey },
    Updated { key: IssueKey, changed: bool },
}

impl UpsertOutcome {
    pub fn key(&self) -> &IssueKey {
        match self {
            Self::Created { key } | Self::Updated { key, .. } => key,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReportError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{
        Attachment, ErrorKind, IssueDraft, IssueKey, IssueSummary, IssueUpdate, ReportStatus,
        SearchResult, UpsertOutcome,
    };

    #[test]
    fn rejects_blank_issue_keys() {
        let error = IssueKey::parse("   ").expect_err("blank key");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let key = IssueKey::parse(" SKP-283 ").expect("key");
        assert_eq!(key.as_str(), "SKP-283");
    }

    #[test]
    fn draft_validation_names_the_missing_field() {
        let draft = IssueDraft::new("Test", "UI not working on Chrome", "  ");
        let error = draft.validate().expect_err("empty description");
        assert!(error.to_string().contains("description"));

        assert!(IssueDraft::new("Test", "UI not working", "User cannot log in")
            .validate()
            .is_ok());
    }

    #[test]
    fn parses_report_statuses() {
        assert_eq!("pass".parse::<ReportStatus>().expect("pass"), ReportStatus::Pass);
        assert_eq!("FAIL".parse::<ReportStatus>().expect("fail"), ReportStatus::Fail);
        assert_eq!(
            " In Review ".parse::<ReportStatus>().expect("native"),
            ReportStatus::Native("In Review".to_string())
        );
        assert!("".parse::<ReportStatus>().is_err());
    }

    #[test]
    fn update_requires_a_change() {
        let error = IssueUpdate::new("SKP-288").validate().expect_err("no change");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let update = IssueUpdate::new("SKP-288").with_status(ReportStatus::Fail);
        assert!(update.validate().is_ok());
    }

    #[test]
    fn attachment_read_reports_missing_and_empty_files() {
        let dir = tempdir().expect("temp dir");

        let missing = Attachment::new(dir.path().join("missing.png"));
        assert_eq!(missing.read().expect_err("missing").kind(), ErrorKind::Io);

        let empty_path = dir.path().join("empty.png");
        fs::write(&empty_path, b"").expect("write");
        let error = Attachment::new(&empty_path).read().expect_err("empty");
        assert_eq!(error.kind(), ErrorKind::Io);
        let payload = Attachment::new(&empty_path).load().expect("empty payload");
        assert_eq!(payload.file_name, "empty.png");
        assert!(payload.bytes.is_empty());
        assert_eq!(missing.load().expect_err("missing").kind(), ErrorKind::Io);

        let path = dir.path().join("screenshot.png");
        fs::write(&path, b"png-bytes").expect("write");
        let payload = Attachment::new(&path).read().expect("payload");
        assert_eq!(payload.file_name, "screenshot.png");
        assert_eq!(payload.bytes, b"png-bytes");
    }

    #[test]
    fn summary_line_falls_back_per_field() {
        let issue = IssueSummary {
            key: "SKP-277".to_string(),
            summary: Some("Login broken".to_string()),
            status: None,
            assignee: None,
            ..IssueSummary::default()
        };
        assert_eq!(
            issue.to_string(),
            "Issue: SKP-277 | Summary: Login broken | Status: N/A | Assignee: Unassigned"
        );
    }

    #[test]
    fn search_result_total_covers_held_issues() {
        let issues = vec![IssueSummary {
            key: "SKP-1".to_string(),
            ..IssueSummary::default()
        }];
        let result = SearchResult::new(0, issues);
        assert_eq!(result.total, 1);
        assert!(SearchResult::default().is_empty());
    }

    #[test]
    fn upsert_outcome_exposes_key_and_branch() {
        let key = IssueKey::parse("SKP-9").expect("key");
        let created = UpsertOutcome::Created { key: key.clone() };
        assert!(created.was_created());
        assert_eq!(created.key(), &key);

        let updated = UpsertOutcome::Updated {
            key,
            changed: false,
        };
        assert!(!updated.was_created());
    }
}
