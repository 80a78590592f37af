//! HTTP probe paths and result merging.
//!
//! Two probe paths run concurrently: the primary usage endpoints can yield a
//! precise remaining figure from response headers, the fallback mirror yields
//! a coarse state from its status code. The first precise result wins; with
//! none, the higher-confidence state wins; with nothing, the outcome is
//! `unknown` with a populated reason.

use crate::config::ProbeConfig;
use crate::database::{QuotaMode, QuotaState};
use crate::{CodexSwitchError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// User-Agent the codex CLI itself sends; probes must blend in.
const CLI_USER_AGENT: &str = "codex_cli_rs/0.98.0 (codex-switch)";
const CODEX_ORIGIN: &str = "https://chatgpt.com";

/// Primary endpoints: (url, source label, confidence when precise).
const PRIMARY_ENDPOINTS: [(&str, &str, i64); 2] = [
    (
        "https://chatgpt.com/backend-api/api/codex/usage",
        "primary-usage",
        90,
    ),
    (
        "https://chatgpt.com/backend-api/wham/usage",
        "primary-wham",
        80,
    ),
];

/// Fallback mirror endpoints, classified by status code.
const FALLBACK_ENDPOINTS: [&str; 2] = [
    "https://chat.openai.com/backend-api/api/codex/usage",
    "https://chat.openai.com/backend-api/wham/usage",
];

const FALLBACK_SOURCE: &str = "fallback-status";
const STATUS_CONFIDENCE: i64 = 50;

/// One probe observation, ready to persist as a snapshot row.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub mode: QuotaMode,
    pub remaining_value: Option<f64>,
    pub remaining_unit: Option<String>,
    pub quota_state: QuotaState,
    pub reset_at: Option<String>,
    pub source: String,
    pub confidence: i64,
    pub reason: Option<String>,
}

impl ProbeOutcome {
    fn precise(
        remaining: f64,
        unit: Option<String>,
        reset_at: Option<String>,
        source: &str,
        confidence: i64,
    ) -> Self {
        Self {
            mode: QuotaMode::Precise,
            remaining_value: Some(remaining),
            remaining_unit: unit,
            quota_state: state_from_remaining(remaining),
            reset_at,
            source: source.to_string(),
            confidence,
            reason: None,
        }
    }

    fn status(state: QuotaState, source: &str) -> Self {
        Self {
            mode: QuotaMode::Status,
            remaining_value: None,
            remaining_unit: None,
            quota_state: state,
            reset_at: None,
            source: source.to_string(),
            confidence: STATUS_CONFIDENCE,
            reason: None,
        }
    }

    pub(crate) fn unknown(reason: &str, source: &str) -> Self {
        Self {
            mode: QuotaMode::Unknown,
            remaining_value: None,
            remaining_unit: None,
            quota_state: QuotaState::Unknown,
            reset_at: None,
            source: source.to_string(),
            confidence: 0,
            reason: Some(reason.to_string()),
        }
    }
}

/// Build the shared probe client with the CLI's request identity.
pub fn build_client(timeout_ms: u64) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLI_USER_AGENT));
    headers.insert(ORIGIN, HeaderValue::from_static(CODEX_ORIGIN));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .default_headers(headers)
        .build()
        .map_err(|error| CodexSwitchError::Store(format!("probe client init failed: {error}")))
}

/// Probe one account. Both paths run concurrently; the merged outcome always
/// satisfies the mode/state coupling invariants.
pub async fn probe_account(client: &Client, access_token: &str, config: &ProbeConfig) -> ProbeOutcome {
    let (primary, fallback) = tokio::join!(
        probe_primary(client, access_token, config),
        probe_fallback(client, access_token)
    );
    merge_outcomes(primary, fallback)
}

async fn probe_primary(client: &Client, access_token: &str, config: &ProbeConfig) -> ProbeOutcome {
    let mut last_reason = "source_unavailable".to_string();

    for (endpoint, source, confidence) in PRIMARY_ENDPOINTS {
        let response = match client.get(endpoint).bearer_auth(access_token).send().await {
            Ok(response) => response,
            Err(error) => {
                last_reason = format!("{}@{endpoint}", reason_from_request_error(&error));
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            last_reason = format!("{}@{endpoint}", reason_from_status(status.as_u16()));
            continue;
        }

        match precise_from_headers(response.headers(), config, source, confidence) {
            Some(outcome) => return outcome,
            None => {
                last_reason = format!("remaining_header_missing@{endpoint}");
            }
        }
    }

    ProbeOutcome::unknown(&last_reason, "primary")
}

async fn probe_fallback(client: &Client, access_token: &str) -> ProbeOutcome {
    let mut last_reason = "source_unavailable".to_string();

    for endpoint in FALLBACK_ENDPOINTS {
        let response = match client.get(endpoint).bearer_auth(access_token).send().await {
            Ok(response) => response,
            Err(error) => {
                last_reason = format!("{}@{endpoint}", reason_from_request_error(&error));
                continue;
            }
        };

        let status = response.status().as_u16();
        let body: Option<Value> = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok());

        match classify_fallback(status, body.as_ref()) {
            Ok(state) => return ProbeOutcome::status(state, FALLBACK_SOURCE),
            Err(reason) => {
                last_reason = format!("{reason}@{endpoint}");
            }
        }
    }

    ProbeOutcome::unknown(&last_reason, FALLBACK_SOURCE)
}

/// Parse the precise headers; `None` when the remaining header is absent or
/// unparsable.
fn precise_from_headers(
    headers: &HeaderMap,
    config: &ProbeConfig,
    source: &str,
    confidence: i64,
) -> Option<ProbeOutcome> {
    let remaining: f64 = header_text(headers, &config.remaining_header)?
        .parse()
        .ok()?;
    let unit = header_text(headers, &config.unit_header);
    let reset_at = header_text(headers, &config.reset_at_header)
        .filter(|raw| chrono::DateTime::parse_from_rfc3339(raw).is_ok());
    Some(ProbeOutcome::precise(
        remaining, unit, reset_at, source, confidence,
    ))
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Map a fallback response to a coarse state, or a short reason label when
/// it decides nothing.
fn classify_fallback(status: u16, body: Option<&Value>) -> std::result::Result<QuotaState, String> {
    if status == 402 || body_reports_quota_exceeded(body) {
        return Ok(QuotaState::Exhausted);
    }
    if status == 429 {
        return Ok(QuotaState::NearLimit);
    }
    if status == 200 {
        let plan = body.and_then(|value| {
            value
                .get("plan")
                .or_else(|| value.get("plan_type"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|plan| !plan.is_empty())
        });
        return match plan {
            Some(_) => Ok(QuotaState::Available),
            None => Err("plan_missing".to_string()),
        };
    }
    Err(reason_from_status(status).to_string())
}

fn body_reports_quota_exceeded(body: Option<&Value>) -> bool {
    let Some(body) = body else {
        return false;
    };
    let code = body
        .get("error")
        .and_then(|error| error.get("code"))
        .or_else(|| body.get("code"))
        .and_then(Value::as_str);
    code == Some("quota_exceeded")
}

fn reason_from_status(status: u16) -> &'static str {
    match status {
        401 => "auth_expired",
        403 => "auth_forbidden",
        404 => "endpoint_not_found",
        408 | 504 => "upstream_timeout",
        429 => "rate_limited",
        301 | 302 | 307 | 308 => "endpoint_redirected",
        500 | 502 | 503 => "upstream_unavailable",
        400..=499 => "client_error",
        500..=599 => "server_error",
        _ => "source_unavailable",
    }
}

fn reason_from_request_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "request_timeout"
    } else if error.is_connect() {
        "connect_failed"
    } else if error.is_decode() {
        "response_decode_failed"
    } else {
        "request_failed"
    }
}

fn state_from_remaining(remaining: f64) -> QuotaState {
    if remaining <= 0.0 {
        QuotaState::Exhausted
    } else if remaining <= 3.0 {
        QuotaState::NearLimit
    } else {
        QuotaState::Available
    }
}

fn merge_outcomes(primary: ProbeOutcome, fallback: ProbeOutcome) -> ProbeOutcome {
    if primary.mode == QuotaMode::Precise {
        return primary;
    }
    if fallback.mode == QuotaMode::Precise {
        return fallback;
    }

    let mut decided: Vec<ProbeOutcome> = [primary.clone(), fallback.clone()]
        .into_iter()
        .filter(|outcome| outcome.quota_state != QuotaState::Unknown)
        .collect();
    decided.sort_by_key(|outcome| std::cmp::Reverse(outcome.confidence));
    if let Some(best) = decided.into_iter().next() {
        return best;
    }

    let merged_reason = format!(
        "primary:{}|fallback:{}",
        primary.reason.as_deref().unwrap_or("unknown"),
        fallback.reason.as_deref().unwrap_or("unknown")
    );
    ProbeOutcome::unknown(&merged_reason, "merged")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn default_config() -> ProbeConfig {
        ProbeConfig::default()
    }

    #[test]
    fn parses_precise_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-codex-remaining", HeaderValue::from_static("12.5"));
        headers.insert("x-codex-unit", HeaderValue::from_static("requests"));
        headers.insert(
            "x-codex-reset-at",
            HeaderValue::from_static("2026-03-01T00:00:00Z"),
        );

        let outcome = precise_from_headers(&headers, &default_config(), "primary-usage", 90)
            .expect("should parse");
        assert_eq!(outcome.mode, QuotaMode::Precise);
        assert_eq!(outcome.remaining_value, Some(12.5));
        assert_eq!(outcome.remaining_unit.as_deref(), Some("requests"));
        assert_eq!(outcome.reset_at.as_deref(), Some("2026-03-01T00:00:00Z"));
        assert_eq!(outcome.quota_state, QuotaState::Available);
        assert_eq!(outcome.confidence, 90);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn precise_state_tracks_remaining_value() {
        let mut headers = HeaderMap::new();
        headers.insert("x-codex-remaining", HeaderValue::from_static("0"));
        let outcome =
            precise_from_headers(&headers, &default_config(), "primary-usage", 90).unwrap();
        assert_eq!(outcome.quota_state, QuotaState::Exhausted);

        let mut headers = HeaderMap::new();
        headers.insert("x-codex-remaining", HeaderValue::from_static("2"));
        let outcome =
            precise_from_headers(&headers, &default_config(), "primary-wham", 80).unwrap();
        assert_eq!(outcome.quota_state, QuotaState::NearLimit);
        assert_eq!(outcome.confidence, 80);
    }

    #[test]
    fn missing_or_garbled_remaining_header_is_none() {
        let headers = HeaderMap::new();
        assert!(precise_from_headers(&headers, &default_config(), "primary-usage", 90).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("x-codex-remaining", HeaderValue::from_static("lots"));
        assert!(precise_from_headers(&headers, &default_config(), "primary-usage", 90).is_none());
    }

    #[test]
    fn header_names_are_configurable() {
        let config = ProbeConfig {
            remaining_header: "x-quota-left".to_string(),
            ..ProbeConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-quota-left", HeaderValue::from_static("7"));
        let outcome = precise_from_headers(&headers, &config, "primary-usage", 90).unwrap();
        assert_eq!(outcome.remaining_value, Some(7.0));
    }

    #[test]
    fn invalid_reset_timestamp_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-codex-remaining", HeaderValue::from_static("5"));
        headers.insert("x-codex-reset-at", HeaderValue::from_static("tomorrow"));
        let outcome =
            precise_from_headers(&headers, &default_config(), "primary-usage", 90).unwrap();
        assert!(outcome.reset_at.is_none());
    }

    #[test]
    fn fallback_classification_maps_status_codes() {
        let plan_body: Value = serde_json::json!({"plan": "pro"});
        assert_eq!(
            classify_fallback(200, Some(&plan_body)),
            Ok(QuotaState::Available)
        );
        assert_eq!(classify_fallback(402, None), Ok(QuotaState::Exhausted));
        assert_eq!(classify_fallback(429, None), Ok(QuotaState::NearLimit));

        assert_eq!(classify_fallback(200, None), Err("plan_missing".to_string()));
        assert_eq!(
            classify_fallback(500, None),
            Err("upstream_unavailable".to_string())
        );
        assert_eq!(classify_fallback(401, None), Err("auth_expired".to_string()));
    }

    #[test]
    fn quota_exceeded_body_wins_over_status() {
        let body: Value = serde_json::json!({"error": {"code": "quota_exceeded"}});
        assert_eq!(
            classify_fallback(403, Some(&body)),
            Ok(QuotaState::Exhausted)
        );
    }

    #[test]
    fn merge_prefers_precise() {
        let precise = ProbeOutcome::precise(10.0, None, None, "primary-usage", 90);
        let status = ProbeOutcome::status(QuotaState::Exhausted, FALLBACK_SOURCE);
        let merged = merge_outcomes(precise, status);
        assert_eq!(merged.mode, QuotaMode::Precise);
        assert_eq!(merged.source, "primary-usage");
    }

    #[test]
    fn merge_degrades_to_status_then_unknown() {
        // Primary 500, fallback 429: the documented degrade path.
        let primary = ProbeOutcome::unknown("upstream_unavailable@primary", "primary");
        let fallback = ProbeOutcome::status(QuotaState::NearLimit, FALLBACK_SOURCE);
        let merged = merge_outcomes(primary, fallback);
        assert_eq!(merged.mode, QuotaMode::Status);
        assert_eq!(merged.quota_state, QuotaState::NearLimit);
        assert_eq!(merged.source, FALLBACK_SOURCE);
        assert_eq!(merged.confidence, STATUS_CONFIDENCE);
        assert!(merged.reason.is_none());

        let merged = merge_outcomes(
            ProbeOutcome::unknown("connect_failed@a", "primary"),
            ProbeOutcome::unknown("connect_failed@b", FALLBACK_SOURCE),
        );
        assert_eq!(merged.mode, QuotaMode::Unknown);
        assert_eq!(merged.quota_state, QuotaState::Unknown);
        assert_eq!(merged.confidence, 0);
        assert_eq!(
            merged.reason.as_deref(),
            Some("primary:connect_failed@a|fallback:connect_failed@b")
        );
    }

    #[test]
    fn outcomes_satisfy_mode_state_coupling() {
        let precise = ProbeOutcome::precise(1.0, None, None, "primary-usage", 90);
        assert!(precise.remaining_value.is_some());

        let status = ProbeOutcome::status(QuotaState::Available, FALLBACK_SOURCE);
        assert_ne!(status.quota_state, QuotaState::Unknown);

        let unknown = ProbeOutcome::unknown("reason", "merged");
        assert_eq!(unknown.quota_state, QuotaState::Unknown);
        assert!(unknown.reason.is_some());
        assert_eq!(unknown.confidence, 0);
    }
}
