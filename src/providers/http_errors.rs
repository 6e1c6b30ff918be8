use anyhow::anyhow;
use reqwest::StatusCode;
use serde_json::Value;
use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::config::{API_URL_ENV_VAR, TIMEOUT_ENV_VAR};

fn error_chain_has_kind(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_kind(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_kind(err, ErrorKind::TimedOut, "timed out")
}

pub(crate) fn api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return anyhow!(
            "API request timed out after {}s while calling '{}'. \
             Increase {} or try again later.",
            timeout_secs,
            api_url,
            TIMEOUT_ENV_VAR
        );
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return anyhow!(
                "Connection refused by API at '{}'. Check {} and network connectivity.",
                api_url,
                API_URL_ENV_VAR
            );
        }

        return anyhow!(
            "Failed to connect to API at '{}'. Check {} and network connectivity.",
            api_url,
            API_URL_ENV_VAR
        );
    }

    anyhow!("API request error while calling '{}': {}", api_url, err)
}

/// Failure while reading an already-accepted streaming body.
pub(crate) fn stream_read_error(err: reqwest::Error, timeout_secs: u64) -> anyhow::Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return anyhow!(
            "Response stream stalled for more than {}s. Increase {} or try again later.",
            timeout_secs,
            TIMEOUT_ENV_VAR
        );
    }

    anyhow!("Response stream was interrupted: {}", err)
}

pub(crate) fn api_status_error(status: StatusCode, body: &str) -> anyhow::Error {
    let details = describe_error_body(body);
    anyhow!("API HTTP error ({}):\n{}", status, details)
}

/// Pretty-prints JSON bodies and pulls the provider's `error.message` to the front.
fn describe_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty response body>".to_string();
    }

    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    let pretty = serde_json::to_string_pretty(&json).unwrap_or_else(|_| trimmed.to_string());
    match json
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
    {
        Some(message) => format!("{message}\nResponse body:\n{pretty}"),
        None => format!("Response body:\n{pretty}"),
    }
}
