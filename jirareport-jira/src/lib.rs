use std::time::Duration;

use jirareport_config::{ReportConfig, StatusMap};
use jirareport_domain::{
    Attachment, AttachmentPayload, DetailLevel, IssueDraft, IssueKey, IssueSummary, IssueUpdate,
    ReportError, ReportStatus, Result, SearchQuery, SearchResult, UpsertOutcome,
};
use reqwest::blocking::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

mod keys;
mod payload;

pub use keys::{escape_jql_string, escape_text_search, resolve_issue_key};

use payload::{
    failure_message, into_issue_state, into_issue_summary, into_transition, non_empty,
    same_description, text_value, CreatedPayload, IssuePayload, IssueState, SearchPayload, Transition, TransitionsPayload,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ISSUE_TYPE: &str = "Bug";
const DEFAULT_SEARCH_PAGE_SIZE: usize = 100;
const STANDARD_FIELDS: &str = "summary,status,assignee";
const ALL_FIELDS: &str = "*all";
const STATE_FIELDS: &str = "summary,status,description,attachment";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Basic { user: String, password: String },
    Bearer { token: String },
}

/// Blocking Jira REST client. Holds no per-issue state, so one instance can
/// serve any number of calls and threads.
pub struct JiraClient {
    api_version: String,
    base_url: String,
    http: Client,
    auth_mode: AuthMode,
    default_issue_type: String,
    search_page_size: usize,
    status_map: StatusMap,
}

impl JiraClient {
    pub fn new(server: &str, api_version: &str, auth_mode: AuthMode) -> Result<Self> {
        Self::build(server, api_version, auth_mode, false)
    }

    pub fn from_config(config: &ReportConfig) -> Result<Self> {
        let server = config
            .jira_server
            .as_deref()
            .ok_or_else(|| ReportError::validation("jira_server not configured"))?;
        let auth_mode = parse_auth_mode(config)?;

        Ok(
            Self::build(server, config.api_version(), auth_mode, config.insecure)?
                .with_default_issue_type(&config.default_issue_type)
                .with_search_page_size(config.search_page_size)
                .with_status_map(config.status_map.clone()),
        )
    }

    fn build(
        server: &str,
        api_version: &str,
        auth_mode: AuthMode,
        insecure: bool,
    ) -> Result<Self> {
        let server = server.trim().trim_end_matches('/');
        if server.is_empty() {
            return Err(ReportError::validation("jira server URL cannot be empty"));
        }
        let api_version = if api_version.trim() == "3" { "3" } else { "2" };

        let http = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| {
                ReportError::remote("build Jira HTTP client", None, error.to_string())
            })?;

        Ok(Self {
            api_version: api_version.to_string(),
            base_url: format!("{server}/rest/api/{api_version}"),
            http,
            auth_mode,
            default_issue_type: DEFAULT_ISSUE_TYPE.to_string(),
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
            status_map: StatusMap::default(),
        })
    }

    pub fn with_default_issue_type(mut self, issue_type: &str) -> Self {
        if let Some(issue_type) = non_empty(issue_type.to_string()) {
            self.default_issue_type = issue_type;
        }
        self
    }

    pub fn with_search_page_size(mut self, page_size: usize) -> Self {
        self.search_page_size = page_size.max(1);
        self
    }

    pub fn with_status_map(mut self, status_map: StatusMap) -> Self {
        self.status_map = status_map;
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn create_issue(&self, draft: &IssueDraft) -> Result<IssueKey> {
        draft.validate()?;
        let issue_type = draft
            .issue_type
            .clone()
            .and_then(non_empty)
            .unwrap_or_else(|| self.default_issue_type.clone());
        let project = draft.project.trim();

        let body = json!({
            "fields": {
                "project": {"key": project},
                "summary": draft.summary.trim(),
                "description": text_value(&self.api_version, draft.description.trim()),
                "issuetype": {"name": issue_type},
            }
        });

        let operation = format!("create issue in project {project}");
        let endpoint = format!("{}/issue", self.base_url);
        let response = self.execute(&operation, self.http.post(endpoint).json(&body))?;
        let payload: CreatedPayload = decode(&operation, response)?;

        let key = payload
            .key
            .and_then(non_empty)
            .ok_or_else(|| ReportError::remote(&operation, None, "response carried no issue key"))?;
        let key = IssueKey::parse(&key)?;
        info!(key = %key, project, "created jira issue");
        Ok(key)
    }

    /// Uploads the file, replacing any attachment on the issue with the same file name.
    pub fn update_issue_attachment(&self, key: &IssueKey, attachment: &Attachment) -> Result<()> {
        let payload = attachment.read()?;
        let state = self.fetch_issue_state(key)?;
        self.replace_attachment(key, &state, payload)
    }

    /// Applies the requested changes. `Ok(false)` means the issue already matched and
    /// nothing was sent.
    pub fn update_issue(&self, update: &IssueUpdate) -> Result<bool> {
        update.validate()?;
        let key = resolve_issue_key(&update.key, update.project.as_deref())?;
        let attachment = update.attachment.as_ref().map(Attachment::load).transpose()?;

        self.apply_update(
            &key,
            update.status.as_ref(),
            update.description.as_deref(),
            attachment,
        )
    }

    /// Updates the issue in `project` whose summary matches exactly, or creates it.
    pub fn upsert_issue(
        &self,
        status: &ReportStatus,
        summary: &str,
        description: &str,
        project: &str,
        attachment: Option<&Attachment>,
    ) -> Result<UpsertOutcome> {
        let draft = IssueDraft::new(project, summary, description);
        draft.validate()?;
        let attachment = attachment.map(Attachment::load).transpose()?;

        let Some(key) = self.find_by_summary(project, summary)? else {
            debug!(project, summary, "no matching issue, creating a new one");
            let key = self.create_issue(&draft)?;
            if let Some(payload) = attachment {
                self.upload_attachment(&key, payload)?;
            }
            return Ok(UpsertOutcome::Created { key });
        };

        let mut changed = self.apply_update(&key, Some(status), Some(description), attachment)?;
        if self.status_map.target_for(status).is_none() {
            self.add_comment(&key, &format!("Report status: {}", status.label()))?;
            changed = true;
        }
        Ok(UpsertOutcome::Updated { key, changed })
    }

    pub fn search_issues(&self, query: &SearchQuery) -> Result<SearchResult> {
        let jql = query.jql.trim();
        if jql.is_empty() {
            return Err(ReportError::validation("JQL query cannot be empty"));
        }
        if query.limit == Some(0) {
            return Err(ReportError::validation("search limit must be positive"));
        }

        let fields = match query.detail {
            DetailLevel::Standard => STANDARD_FIELDS,
            DetailLevel::AllFields => ALL_FIELDS,
        };
        let limit = query.limit.unwrap_or(usize::MAX);

        let mut issues: Vec<IssueSummary> = Vec::new();
        let mut reported_total = 0usize;
        let mut start_at = 0usize;
        let mut page_token: Option<String> = None;

        loop {
            let max_results = self.search_page_size.min(limit - issues.len());
            let page = self.search_page(jql, fields, start_at, max_results, page_token.as_deref())?;
            let page_len = page.issues.len();
            reported_total = reported_total.max(page.total.unwrap_or(0));

            let room = limit - issues.len();
            issues.extend(
                page.issues
                    .into_iter()
                    .take(room)
                    .map(|issue| into_issue_summary(issue, query.detail)),
            );
            start_at += page_len;

            if page_len == 0 || issues.len() >= limit {
                break;
            }
            if self.api_version == "3" {
                page_token = page.next_page_token.filter(|_| page.is_last != Some(true));
                if page_token.is_none() {
                    break;
                }
            } else if start_at >= reported_total {
                break;
            }
        }

        debug!(jql, total = reported_total, returned = issues.len(), "jira search completed");
        Ok(SearchResult::new(reported_total, issues))
    }

    pub fn get_issue(&self, key: &IssueKey, detail: DetailLevel) -> Result<IssueSummary> {
        let fields = match detail {
            DetailLevel::Standard => STANDARD_FIELDS,
            DetailLevel::AllFields => ALL_FIELDS,
        };
        let payload = self.fetch_issue(key, fields)?;
        Ok(into_issue_summary(payload, detail))
    }

    pub fn add_comment(&self, key: &IssueKey, body: &str) -> Result<()> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Err(ReportError::validation("comment body cannot be empty"));
        }

        let endpoint = format!("{}/issue/{}/comment", self.base_url, key);
        self.execute(
            &format!("add comment to {key}"),
            self.http
                .post(endpoint)
                .json(&json!({"body": text_value(&self.api_version, trimmed)})),
        )
        .map_err(not_found_as(key))?;
        Ok(())
    }

    fn apply_update(
        &self,
        key: &IssueKey,
        status: Option<&ReportStatus>,
        description: Option<&str>,
        attachment: Option<AttachmentPayload>,
    ) -> Result<bool> {
        let state = self.fetch_issue_state(key)?;

        // Every read happens before the first write so a failed lookup leaves the
        // issue untouched.
        let description = description
            .map(str::trim)
            .filter(|text| !same_description(&self.api_version, text, &state.description));
        let transition = match status {
            Some(status) => self.plan_transition(key, status, state.status.as_deref())?,
            None => None,
        };

        let mut changed = false;
        if let Some(text) = description {
            self.set_description(key, text)?;
            changed = true;
        }
        if let Some(transition) = transition {
            self.transition_issue(key, &transition)?;
            changed = true;
        }
        if let Some(payload) = attachment {
            self.replace_attachment(key, &state, payload)?;
            changed = true;
        }

        if changed {
            info!(key = %key, "updated jira issue");
        } else {
            debug!(key = %key, "jira issue already up to date");
        }
        Ok(changed)
    }

    fn plan_transition(
        &self,
        key: &IssueKey,
        status: &ReportStatus,
        current: Option<&str>,
    ) -> Result<Option<Transition>> {
        let Some(target) = self.status_map.target_for(status) else {
            debug!(key = %key, status = %status, "status maps to no tracker status");
            return Ok(None);
        };
        if current.is_some_and(|current| current.eq_ignore_ascii_case(target)) {
            return Ok(None);
        }

        let transition = self
            .get_transitions(key)?
            .into_iter()
            .find(|transition| transition.reaches(target));
        if transition.is_none() {
            warn!(
                key = %key,
                target,
                current = current.unwrap_or("unknown"),
                "no transition reaches the requested status"
            );
        }
        Ok(transition)
    }

    fn find_by_summary(&self, project: &str, summary: &str) -> Result<Option<IssueKey>> {
        // `~` matches fuzzily, so every page has to be checked for the exact summary.
        let query = SearchQuery::standard(keys::summary_lookup_jql(project, summary));
        let wanted = summary.trim();

        let found = self.search_issues(&query)?.issues.into_iter().find(|issue| {
            issue
                .summary
                .as_deref()
                .is_some_and(|candidate| candidate.trim().eq_ignore_ascii_case(wanted))
        });
        found.map(|issue| IssueKey::parse(&issue.key)).transpose()
    }

    fn fetch_issue(&self, key: &IssueKey, fields: &str) -> Result<IssuePayload> {
        let operation = format!("fetch issue {key}");
        let endpoint = format!("{}/issue/{}", self.base_url, key);
        let response = self
            .execute(&operation, self.http.get(endpoint).query(&[("fields", fields)]))
            .map_err(not_found_as(key))?;
        decode(&operation, response)
    }

    fn fetch_issue_state(&self, key: &IssueKey) -> Result<IssueState> {
        Ok(into_issue_state(self.fetch_issue(key, STATE_FIELDS)?))
    }

    fn set_description(&self, key: &IssueKey, text: &str) -> Result<()> {
        let endpoint = format!("{}/issue/{}", self.base_url, key);
        self.execute(
            &format!("update description of {key}"),
            self.http.put(endpoint).json(&json!({
                "fields": {"description": text_value(&self.api_version, text)}
            })),
        )
        .map_err(not_found_as(key))?;
        Ok(())
    }

    fn get_transitions(&self, key: &IssueKey) -> Result<Vec<Transition>> {
        let operation = format!("list transitions of {key}");
        let endpoint = format!("{}/issue/{}/transitions", self.base_url, key);
        let response = self
            .execute(&operation, self.http.get(endpoint))
            .map_err(not_found_as(key))?;
        let payload: TransitionsPayload = decode(&operation, response)?;
        Ok(payload
            .transitions
            .into_iter()
            .filter_map(into_transition)
            .collect())
    }

    fn transition_issue(&self, key: &IssueKey, transition: &Transition) -> Result<()> {
        let endpoint = format!("{}/issue/{}/transitions", self.base_url, key);
        self.execute(
            &format!("transition {key}"),
            self.http
                .post(endpoint)
                .json(&json!({"transition": {"id": transition.id}})),
        )
        .map_err(not_found_as(key))?;
        debug!(
            key = %key,
            transition = transition.name.as_deref().unwrap_or(&transition.id),
            "transitioned jira issue"
        );
        Ok(())
    }

    fn replace_attachment(
        &self,
        key: &IssueKey,
        state: &IssueState,
        payload: AttachmentPayload,
    ) -> Result<()> {
        let previous: Vec<_> = state
            .attachments
            .iter()
            .filter(|existing| existing.file_name == payload.file_name)
            .collect();

        // The old copies go only once the new one is stored.
        self.upload_attachment(key, payload)?;
        for existing in previous {
            let endpoint = format!("{}/attachment/{}", self.base_url, existing.id);
            self.execute(
                &format!("delete attachment {} from {key}", existing.file_name),
                self.http.delete(endpoint),
            )?;
        }
        Ok(())
    }

    fn upload_attachment(&self, key: &IssueKey, payload: AttachmentPayload) -> Result<()> {
        let file_name = payload.file_name.clone();
        let form = Form::new().part("file", Part::bytes(payload.bytes).file_name(payload.file_name));
        let endpoint = format!("{}/issue/{}/attachments", self.base_url, key);

        self.execute(
            &format!("upload attachment {file_name} to {key}"),
            self.http
                .post(endpoint)
                .header("X-Atlassian-Token", "no-check")
                .multipart(form),
        )
        .map_err(not_found_as(key))?;
        info!(key = %key, file = %file_name, "attached file to jira issue");
        Ok(())
    }

    fn search_page(
        &self,
        jql: &str,
        fields: &str,
        start_at: usize,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<SearchPayload> {
        let endpoint = format!("{}/{}", self.base_url, self.search_endpoint());
        let mut params = vec![
            ("jql", jql.to_string()),
            ("maxResults", max_results.to_string()),
            ("fields", fields.to_string()),
        ];
        if self.api_version == "3" {
            if let Some(token) = page_token {
                params.push(("nextPageToken", token.to_string()));
            }
        } else {
            params.push(("startAt", start_at.to_string()));
        }

        let operation = "search issues";
        let response = self
            .execute(operation, self.http.get(endpoint).query(&params))
            .map_err(|error| match error {
                ReportError::Remote {
                    status: Some(400),
                    message,
                    ..
                } => ReportError::validation(format!("invalid JQL '{jql}': {message}")),
                other => other,
            })?;
        decode(operation, response)
    }

    fn search_endpoint(&self) -> &str {
        if self.api_version == "3" {
            "search/jql"
        } else {
            "search"
        }
    }

    fn execute(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        debug!(operation, "sending jira request");
        let response = self
            .with_auth(request)
            .send()
            .map_err(|error| ReportError::remote(operation, None, error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(ReportError::remote(
            operation,
            Some(status.as_u16()),
            failure_message(response.text()),
        ))
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_mode {
            AuthMode::Basic { user, password } => request.basic_auth(user, Some(password)),
            AuthMode::Bearer { token } => request.bearer_auth(token),
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
    response.json().map_err(|error| {
        ReportError::remote(operation, None, format!("invalid response body: {error}"))
    })
}

fn not_found_as(key: &IssueKey) -> impl FnOnce(ReportError) -> ReportError + '_ {
    move |error| match error {
        ReportError::Remote {
            status: Some(404), ..
        } => ReportError::NotFound(key.to_string()),
        other => other,
    }
}

fn parse_auth_mode(config: &ReportConfig) -> Result<AuthMode> {
    let secret = config
        .jira_password
        .as_deref()
        .ok_or_else(|| ReportError::validation("jira_password not configured"))?;

    match config.auth_method() {
        "basic" => {
            let user = config
                .jira_user
                .as_deref()
                .ok_or_else(|| ReportError::validation("jira_user not configured for basic auth"))?;
            Ok(AuthMode::Basic {
                user: user.to_string(),
                password: secret.to_string(),
            })
        }
        _ => Ok(AuthMode::Bearer {
            token: secret.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use jirareport_config::ReportConfig;
    use jirareport_domain::ErrorKind;

    use super::{AuthMode, JiraClient};

    fn client(api_version: &str) -> JiraClient {
        JiraClient::new(
            "https://jira.example.com/",
            api_version,
            AuthMode::Bearer {
                token: "x".to_string(),
            },
        )
        .expect("client")
    }

    #[test]
    fn chooses_correct_search_endpoint_for_api_versions() {
        assert_eq!(client("2").search_endpoint(), "search");
        assert_eq!(client("3").search_endpoint(), "search/jql");
        assert_eq!(client("7").api_version(), "2");
        assert_eq!(client("3").base_url, "https://jira.example.com/rest/api/3");
    }

    #[test]
    fn builds_basic_auth_from_config() {
        let config = ReportConfig {
            jira_server: Some("https://jira.example.com".to_string()),
            jira_user: Some("alice@example.com".to_string()),
            jira_password: Some("token".to_string()),
            api_version: Some("3".to_string()),
            default_issue_type: "Task".to_string(),
            ..ReportConfig::default()
        };

        let client = JiraClient::from_config(&config).expect("client");
        assert_eq!(
            client.auth_mode,
            AuthMode::Basic {
                user: "alice@example.com".to_string(),
                password: "token".to_string(),
            }
        );
        assert_eq!(client.default_issue_type, "Task");
    }

    #[test]
    fn rejects_incomplete_configuration() {
        let missing_server = ReportConfig::default();
        let error = JiraClient::from_config(&missing_server)
            .err()
            .expect("missing server");
        assert_eq!(error.kind(), ErrorKind::Validation);

        let missing_user = ReportConfig {
            jira_server: Some("https://jira.example.com".to_string()),
            jira_password: Some("token".to_string()),
            auth_method: Some("basic".to_string()),
            ..ReportConfig::default()
        };
        let error = JiraClient::from_config(&missing_user)
            .err()
            .expect("missing user");
        assert!(error.to_string().contains("jira_user"));
    }

    #[test]
    fn client_can_be_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JiraClient>();
    }
}
