use std::{env, sync::OnceLock, time::Duration};

use tracing::{info, warn};

use crate::utils::compact_error;

static TELEMETRY_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn emit_success(op: &str, key: Option<&str>, elapsed: Duration) {
    if !telemetry_enabled() {
        return;
    }
    info!(
        target: "jirareport::telemetry",
        op,
        key = key.unwrap_or("-"),
        status = "ok",
        duration_ms = elapsed.as_millis() as u64,
    );
}

pub fn emit_failure(op: &str, key: Option<&str>, elapsed: Duration, error: &str) {
    if !telemetry_enabled() {
        return;
    }
    warn!(
        target: "jirareport::telemetry",
        op,
        key = key.unwrap_or("-"),
        status = "error",
        duration_ms = elapsed.as_millis() as u64,
        error = %compact_error(error),
    );
}

fn telemetry_enabled() -> bool {
    *TELEMETRY_ENABLED.get_or_init(|| {
        let value = env::var("JIRAREPORT_TELEMETRY").unwrap_or_default();
        parse_bool_flag(value.as_str())
    })
}

fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
