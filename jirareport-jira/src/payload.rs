use std::{collections::BTreeMap, fmt::Display};

use jirareport_domain::{DetailLevel, IssueSummary};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{json, Map, Value};

#[derive(Deserialize)]
pub(crate) struct SearchPayload {
    #[serde(default)]
    pub issues: Vec<IssuePayload>,
    pub total: Option<usize>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
    #[serde(rename = "isLast")]
    pub is_last: Option<bool>,
}

#[derive(Deserialize)]
pub(crate) struct IssuePayload {
    pub key: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Default, Deserialize)]
pub(crate) struct CreatedPayload {
    pub key: Option<String>,
}

#[derive(Default, Deserialize)]
pub(crate) struct TransitionsPayload {
    #[serde(default)]
    pub transitions: Vec<TransitionPayload>,
}

#[derive(Default, Deserialize)]
pub(crate) struct TransitionPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub to: Option<NameLike>,
}

#[derive(Default, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

// Fields decode independently; an unexpected shape yields that field's default.
#[derive(Default, Deserialize)]
struct IssueFields {
    #[serde(default, deserialize_with = "lenient")]
    summary: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    status: Option<NameLike>,
    #[serde(default, deserialize_with = "lenient")]
    assignee: Option<UserLike>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    attachment: Vec<AttachmentLike>,
}

#[derive(Default, Deserialize)]
pub(crate) struct NameLike {
    name: Option<String>,
}

#[derive(Default, Deserialize)]
struct UserLike {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    name: Option<String>,
    #[serde(rename = "emailAddress")]
    email_address: Option<String>,
}

#[derive(Default, Deserialize)]
struct AttachmentLike {
    id: Option<String>,
    filename: Option<String>,
}

/// Current state of an issue as far as an update needs to know it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct IssueState {
    pub status: Option<String>,
    pub description: String,
    pub attachments: Vec<ExistingAttachment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ExistingAttachment {
    pub id: String,
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Transition {
    pub id: String,
    pub name: Option<String>,
    pub to_status: Option<String>,
}

impl Transition {
    pub fn reaches(&self, status: &str) -> bool {
        let matches = |value: &Option<String>| {
            value
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(status))
        };
        matches(&self.to_status) || matches(&self.name)
    }
}

pub(crate) fn into_issue_summary(payload: IssuePayload, detail: DetailLevel) -> IssueSummary {
    let raw = Value::Object(payload.fields);
    let fields = IssueFields::deserialize(&raw).unwrap_or_default();

    let extra = match (detail, raw) {
        (DetailLevel::AllFields, Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };

    IssueSummary {
        key: payload.key,
        summary: fields.summary.and_then(non_empty),
        status: fields.status.and_then(name_like),
        assignee: fields.assignee.and_then(display_name_like),
        fields: extra,
    }
}

pub(crate) fn into_issue_state(payload: IssuePayload) -> IssueState {
    let raw = Value::Object(payload.fields);
    let fields = IssueFields::deserialize(&raw).unwrap_or_default();

    IssueState {
        status: fields.status.and_then(name_like),
        description: normalize_description(fields.description),
        attachments: fields
            .attachment
            .into_iter()
            .filter_map(|item| {
                Some(ExistingAttachment {
                    id: item.id.and_then(non_empty)?,
                    file_name: item.filename?,
                })
            })
            .collect(),
    }
}

pub(crate) fn into_transition(payload: TransitionPayload) -> Option<Transition> {
    Some(Transition {
        id: payload.id.and_then(non_empty)?,
        name: payload.name.and_then(non_empty),
        to_status: payload.to.and_then(name_like),
    })
}

/// Message for a failed response, keeping the read error when the body itself was lost.
pub(crate) fn failure_message<E: Display>(body: Result<String, E>) -> String {
    match body {
        Ok(body) => error_message(&body),
        Err(error) => format!("unreadable response body: {error}"),
    }
}

/// Flattens a Jira error body into one line, falling back to the raw text.
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    let Ok(payload) = serde_json::from_str::<ErrorPayload>(trimmed) else {
        return trimmed.to_string();
    };

    let mut messages = payload.error_messages;
    messages.extend(
        payload
            .errors
            .into_iter()
            .map(|(field, message)| format!("{field}: {message}")),
    );

    if messages.is_empty() {
        trimmed.to_string()
    } else {
        messages.join("; ")
    }
}

/// Text field value in the shape the API version expects.
pub(crate) fn text_value(api_version: &str, text: &str) -> Value {
    if api_version != "3" {
        return Value::String(text.to_string());
    }

    let paragraphs = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            json!({
                "type": "paragraph",
                "content": [{"type": "text", "text": line}]
            })
        })
        .collect::<Vec<_>>();

    json!({
        "type": "doc",
        "version": 1,
        "content": paragraphs
    })
}

/// Whether `wanted` would read back from the tracker as `current`.
pub(crate) fn same_description(api_version: &str, wanted: &str, current: &str) -> bool {
    let stored = normalize_description(Some(text_value(api_version, wanted)));
    stored.trim() == current.trim()
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

fn name_like(value: NameLike) -> Option<String> {
    value.name.and_then(non_empty)
}

fn display_name_like(value: UserLike) -> Option<String> {
    value
        .display_name
        .and_then(non_empty)
        .or_else(|| value.name.and_then(non_empty))
        .or_else(|| value.email_address.and_then(non_empty))
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

pub(crate) fn normalize_description(value: Option<Value>) -> String {
    let Some(payload) = value else {
        return String::new();
    };

    if let Some(text) = payload.as_str() {
        return text.to_string();
    }

    if let Some(raw) = payload.get("raw").and_then(Value::as_str) {
        return raw.to_string();
    }

    let is_doc = payload
        .get("type")
        .and_then(Value::as_str)
        .map(|value| value == "doc")
        .unwrap_or(false);

    if !is_doc {
        return String::new();
    }

    let mut out = String::new();
    extract_adf_text(&payload, &mut out);
    out.trim().to_string()
}

fn extract_adf_text(node: &Value, out: &mut String) {
    let children = node.get("content").and_then(Value::as_array);
    match node.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("hardBreak") => out.push('\n'),
        Some("paragraph" | "heading" | "blockquote" | "listItem") => {
            for child in children.into_iter().flatten() {
                extract_adf_text(child, out);
            }
            out.push('\n');
        }
        _ => {
            for child in children.into_iter().flatten() {
                extract_adf_text(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use jirareport_domain::DetailLevel;
    use serde_json::{json, Value};

    use super::{
        error_message, failure_message, into_issue_state, into_issue_summary, into_transition,
        normalize_description, same_description, text_value, IssuePayload, TransitionPayload,
    };

    fn issue(fields: Value) -> IssuePayload {
        serde_json::from_value(json!({"key": "SKP-277", "fields": fields})).expect("payload")
    }

    #[test]
    fn maps_standard_fields_without_raw_map() {
        let summary = into_issue_summary(
            issue(json!({
                "summary": " Login broken ",
                "status": {"name": "To Do"},
                "assignee": {"displayName": "", "name": "alice"}
            })),
            DetailLevel::Standard,
        );

        assert_eq!(summary.key, "SKP-277");
        assert_eq!(summary.summary.as_deref(), Some("Login broken"));
        assert_eq!(summary.status.as_deref(), Some("To Do"));
        assert_eq!(summary.assignee.as_deref(), Some("alice"));
        assert!(summary.fields.is_empty());
    }

    #[test]
    fn keeps_raw_fields_for_all_fields_detail() {
        let summary = into_issue_summary(
            issue(json!({
                "summary": "Login broken",
                "status": null,
                "priority": {"name": "Major"}
            })),
            DetailLevel::AllFields,
        );

        assert_eq!(summary.status, None);
        assert_eq!(summary.fields["priority"], json!({"name": "Major"}));
        assert!(summary.fields.contains_key("summary"));
    }

    #[test]
    fn collects_issue_state_attachments() {
        let state = into_issue_state(issue(json!({
            "status": {"name": "Done"},
            "description": "old text",
            "attachment": [
                {"id": "10", "filename": "shot.png"},
                {"filename": "orphan.png"}
            ]
        })));

        assert_eq!(state.status.as_deref(), Some("Done"));
        assert_eq!(state.description, "old text");
        assert_eq!(state.attachments.len(), 1);
        assert_eq!(state.attachments[0].file_name, "shot.png");
    }

    #[test]
    fn transitions_match_target_or_name_case_insensitively() {
        let transition = into_transition(TransitionPayload {
            id: Some("31".to_string()),
            name: Some("Resolve".to_string()),
            to: serde_json::from_value(json!({"name": "Done"})).ok(),
        })
        .expect("transition");

        assert!(transition.reaches("done"));
        assert!(transition.reaches("RESOLVE"));
        assert!(!transition.reaches("To Do"));

        assert!(into_transition(TransitionPayload::default()).is_none());
    }

    #[test]
    fn flattens_jira_error_bodies() {
        let body = r#"{"errorMessages":["Field 'x' does not exist"],"errors":{"project":"valid project is required"}}"#;
        assert_eq!(
            error_message(body),
            "Field 'x' does not exist; project: valid project is required"
        );
        assert_eq!(error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
        assert_eq!(error_message("  "), "empty response body");
    }

    #[test]
    fn keeps_body_read_errors_in_the_message() {
        assert_eq!(
            failure_message::<String>(Err("connection reset by peer".to_string())),
            "unreadable response body: connection reset by peer"
        );
        assert_eq!(
            failure_message::<String>(Ok(r#"{"errorMessages":["Forbidden"]}"#.to_string())),
            "Forbidden"
        );
    }

    #[test]
    fn odd_field_shapes_do_not_hide_the_rest() {
        let summary = into_issue_summary(
            issue(json!({
                "summary": "Login broken",
                "status": "Done",
                "assignee": {"displayName": "Alice"},
                "attachment": null
            })),
            DetailLevel::AllFields,
        );
        assert_eq!(summary.summary.as_deref(), Some("Login broken"));
        assert_eq!(summary.status, None);
        assert_eq!(summary.assignee.as_deref(), Some("Alice"));

        let state = into_issue_state(issue(json!({
            "status": {"name": "To Do"},
            "description": "old text",
            "attachment": {"unexpected": true}
        })));
        assert_eq!(state.status.as_deref(), Some("To Do"));
        assert_eq!(state.description, "old text");
        assert!(state.attachments.is_empty());
    }

    #[test]
    fn compares_descriptions_as_the_tracker_stores_them() {
        let stored = normalize_description(Some(json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "first"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "second"}]}
            ]
        })));
        assert!(same_description("3", "first\n\nsecond", &stored));
        assert!(!same_description("3", "first\nthird", &stored));

        assert!(same_description("2", " plain text ", "plain text"));
        assert!(!same_description("2", "first\n\nsecond", "first\nsecond"));
    }

    #[test]
    fn flattens_adf_description() {
        let doc = json!({
            "type": "doc",
            "content": [
                {
                    "type": "paragraph",
                    "content": [{"type": "text", "text": "Hello"}]
                },
                {
                    "type": "paragraph",
                    "content": [{"type": "text", "text": "World"}]
                }
            ]
        });

        assert_eq!(normalize_description(Some(doc)), "Hello\nWorld");
    }

    #[test]
    fn builds_text_value_by_api_version() {
        assert_eq!(text_value("2", "hello"), json!("hello"));
        assert_eq!(
            text_value("3", "hello\n\nworld"),
            json!({
                "type": "doc",
                "version": 1,
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "hello"}]},
                    {"type": "paragraph", "content": [{"type": "text", "text": "world"}]}
                ]
            })
        );
        assert_eq!(
            normalize_description(Some(text_value("3", "hello\nworld"))),
            "hello\nworld"
        );
    }
}
