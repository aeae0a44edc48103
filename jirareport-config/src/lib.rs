use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{anyhow, Context, Result};
use jirareport_domain::ReportStatus;
use serde::Deserialize;

const DEFAULT_ISSUE_TYPE: &str = "Bug";
const DEFAULT_SEARCH_PAGE_SIZE: usize = 100;
const DEFAULT_PASS_STATUS: &str = "Done";
const DEFAULT_FAIL_STATUS: &str = "To Do";

/// Tracker status names that report outcomes move an issue to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMap {
    pub pass: Option<String>,
    pub fail: Option<String>,
    pub info: Option<String>,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self {
            pass: Some(DEFAULT_PASS_STATUS.to_string()),
            fail: Some(DEFAULT_FAIL_STATUS.to_string()),
            info: None,
        }
    }
}

impl StatusMap {
    pub fn target_for<'a>(&'a self, status: &'a ReportStatus) -> Option<&'a str> {
        match status {
            ReportStatus::Pass => self.pass.as_deref(),
            ReportStatus::Fail => self.fail.as_deref(),
            ReportStatus::Info => self.info.as_deref(),
            ReportStatus::Native(name) => Some(name.as_str()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportConfig {
    pub jira_server: Option<String>,
    pub jira_user: Option<String>,
    pub jira_password: Option<String>,
    pub api_version: Option<String>,
    pub auth_method: Option<String>,
    pub insecure: bool,
    pub default_project: Option<String>,
    pub default_issue_type: String,
    pub search_page_size: usize,
    pub status_map: StatusMap,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

#[derive(Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    general: RawGeneral,
    jira_server: Option<String>,
    jira_user: Option<String>,
    jira_password: Option<String>,
    api_version: Option<String>,
    auth_method: Option<String>,
    insecure: Option<bool>,
    default_project: Option<String>,
    default_issue_type: Option<String>,
    search_page_size: Option<usize>,
    status_map: Option<RawStatusMap>,
}

#[derive(Default, Deserialize)]
struct RawGeneral {
    jira_server: Option<String>,
    jira_user: Option<String>,
    jira_password: Option<String>,
    api_version: Option<String>,
    auth_method: Option<String>,
    insecure: Option<bool>,
    default_project: Option<String>,
    default_issue_type: Option<String>,
    search_page_size: Option<usize>,
    status_map: Option<RawStatusMap>,
}

#[derive(Default, Deserialize)]
struct RawStatusMap {
    pass: Option<String>,
    fail: Option<String>,
    info: Option<String>,
}

impl ReportConfig {
    /// Loads the given file (or the default one) and applies `JIRA_*` environment overrides.
    /// A missing default file is not an error so the environment alone can configure a run.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let raw: RawConfig =
            serde_yaml::from_str(&payload).with_context(|| "invalid YAML config format")?;
        Ok(Self::from_raw(raw))
    }

    pub fn api_version(&self) -> &str {
        match self.api_version.as_deref() {
            Some("3") => "3",
            _ => "2",
        }
    }

    pub fn auth_method(&self) -> &str {
        if let Some(value) = self.auth_method.as_deref() {
            match value.trim().to_ascii_lowercase().as_str() {
                "basic" => return "basic",
                "bearer" => return "bearer",
                _ => {}
            }
        }

        if self.api_version() == "3" {
            "basic"
        } else {
            "bearer"
        }
    }

    /// Project key to use when the caller does not name one.
    pub fn resolve_project<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        requested
            .and_then(non_empty_str)
            .or_else(|| self.default_project.as_deref())
            .ok_or_else(|| anyhow!("no project given and default_project not configured"))
    }

    pub fn issue_url(&self, key: &str) -> Result<String> {
        let server = self
            .jira_server
            .as_deref()
            .ok_or_else(|| anyhow!("jira_server not configured"))?;
        Ok(format!("{server}/browse/{key}"))
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup("JIRA_SERVER").and_then(normalize_jira_server) {
            self.jira_server = Some(server);
        }
        if let Some(user) = lookup("JIRA_USER").and_then(non_empty) {
            self.jira_user = Some(user);
        }
        if let Some(password) = lookup("JIRA_PASSWORD").and_then(resolve_jira_password) {
            self.jira_password = Some(password);
        }
    }

    fn from_raw(raw: RawConfig) -> Self {
        let general = raw.general;
        let jira_server =
            first_some(general.jira_server, raw.jira_server).and_then(normalize_jira_server);
        let jira_user = first_some(general.jira_user, raw.jira_user).and_then(non_empty);
        let jira_password =
            first_some(general.jira_password, raw.jira_password).and_then(resolve_jira_password);
        let api_version = first_some(general.api_version, raw.api_version).and_then(non_empty);
        let auth_method = first_some(general.auth_method, raw.auth_method).and_then(non_empty);
        let insecure = general.insecure.or(raw.insecure).unwrap_or(false);
        let default_project =
            first_some(general.default_project, raw.default_project).and_then(non_empty);
        let default_issue_type = first_some(general.default_issue_type, raw.default_issue_type)
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_ISSUE_TYPE.to_string());
        let search_page_size = first_some(general.search_page_size, raw.search_page_size)
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_SEARCH_PAGE_SIZE);
        let status_map = first_some(general.status_map, raw.status_map)
            .map(parse_status_map)
            .unwrap_or_default();

        Self {
            jira_server,
            jira_user,
            jira_password,
            api_version,
            auth_method,
            insecure,
            default_project,
            default_issue_type,
            search_page_size,
            status_map,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(override_path) = env::var_os("JIRAREPORT_CONFIG_FILE") {
        return PathBuf::from(override_path);
    }

    let mut base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push(".config");
    base.push("jirareport");
    base.push("config.yaml");
    base
}

fn parse_status_map(raw: RawStatusMap) -> StatusMap {
    let defaults = StatusMap::default();
    // An explicit empty string disables the transition for that outcome.
    let pick = |value: Option<String>, fallback: Option<String>| match value {
        Some(value) => non_empty(value),
        None => fallback,
    };
    StatusMap {
        pass: pick(raw.pass, defaults.pass),
        fail: pick(raw.fail, defaults.fail),
        info: pick(raw.info, defaults.info),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed)
}

fn normalize_jira_server(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.trim_end_matches('/').to_string())
    } else {
        Some(format!("https://{}", trimmed.trim_end_matches('/')))
    }
}

fn first_some<T>(first: Option<T>, second: Option<T>) -> Option<T> {
    first.or(second)
}

fn resolve_jira_password(value: String) -> Option<String> {
    resolve_jira_password_with(value, fetch_secret_from_manager)
}

fn resolve_jira_password_with<F>(value: String, fetch: F) -> Option<String>
where
    F: Fn(&str, &str) -> Option<String>,
{
    let password = non_empty(value)?;
    let Some((provider, key)) = parse_secret_reference(password.as_str()) else {
        return Some(password);
    };
    fetch(provider, key)
}

fn parse_secret_reference(value: &str) -> Option<(&str, &str)> {
    let (provider, key) = value.split_once("::")?;
    if key.trim().is_empty() {
        return None;
    }
    if provider == "pass" || provider == "passage" {
        Some((provider, key.trim()))
    } else {
        None
    }
}

fn fetch_secret_from_manager(provider: &str, key: &str) -> Option<String> {
    let output = Command::new(provider).arg("show").arg(key).output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    non_empty(stdout.trim().to_string())
}
