use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::types::{ActionReply, InstanceRecord, InstanceRequest, StatusReport};

use super::{BackendError, InstanceBackend};

const STATUS_PATH: &str = "/api/v1/docker_status";
const CONTAINER_PATH: &str = "/api/v1/container";
// 9999-12-31T23:59:59Z
const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Talks to the docker-challenges plugin endpoints of a CTFd server.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| BackendError::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self { config, client })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn status_url(&self) -> String {
        format!("{}{STATUS_PATH}", self.base_url())
    }

    fn container_url(&self, request: &InstanceRequest) -> String {
        let mut url = format!(
            "{}{CONTAINER_PATH}?name={}&challenge={}",
            self.base_url(),
            urlencoding::encode(&request.identifier),
            urlencoding::encode(&request.task_name)
        );
        if request.stop {
            url.push_str("&stopcontainer=True");
        }
        url
    }

    async fn get(&self, url: &str) -> Result<(u16, String), BackendError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_request_error)?;
        Ok((status, body))
    }
}

#[async_trait]
impl InstanceBackend for HttpBackend {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        let url = self.status_url();
        let (status, body) = self.get(&url).await?;
        if !(200..300).contains(&status) {
            return Err(BackendError::Rejected {
                status: Some(status),
                message: extract_message(&body),
            });
        }

        parse_status_body(&body)
    }

    async fn request_instance(
        &self,
        request: &InstanceRequest,
    ) -> Result<ActionReply, BackendError> {
        let url = self.container_url(request);
        debug!(
            identifier = %request.identifier,
            stop = request.stop,
            "sending instance request"
        );
        let (status, body) = self.get(&url).await?;
        parse_action_response(status, &body)
    }
}

fn map_request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Transport(format!("request timed out: {err}"))
    } else {
        BackendError::Transport(err.to_string())
    }
}

fn extract_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_action_response(status: u16, body: &str) -> Result<ActionReply, BackendError> {
    let payload = serde_json::from_str::<Value>(body).ok();
    let message = payload
        .as_ref()
        .and_then(|payload| payload.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if !(200..300).contains(&status) {
        return Err(BackendError::Rejected {
            status: Some(status),
            message,
        });
    }

    let Some(payload) = payload else {
        return Err(BackendError::Malformed(format!(
            "expected a JSON body from {CONTAINER_PATH}"
        )));
    };

    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(BackendError::Rejected {
            status: Some(status),
            message,
        });
    }

    Ok(ActionReply { message })
}

fn parse_status_body(body: &str) -> Result<StatusReport, BackendError> {
    let payload: Value = serde_json::from_str(body).map_err(|err| {
        BackendError::Malformed(format!("failed to parse {STATUS_PATH} response JSON: {err}"))
    })?;

    let object = payload.as_object().ok_or_else(|| {
        BackendError::Malformed(format!("expected {STATUS_PATH} response to be a JSON object"))
    })?;

    let success = object
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let records = match object.get("data") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let record = parse_record(item);
                if record.is_none() {
                    debug!(entry = %item, "skipping instance entry with missing fields");
                }
                record
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            debug!(data = %other, "status data is not an array; treating as empty");
            Vec::new()
        }
    };

    Ok(StatusReport { success, records })
}

fn parse_record(value: &Value) -> Option<InstanceRecord> {
    let object = value.as_object()?;
    let identifier = object.get("docker_image")?.as_str()?.to_string();
    let host = object.get("host")?.as_str()?.to_string();
    let expires_at_epoch_seconds = parse_epoch_seconds(object.get("revert_time")?)?;
    let instance_id = object
        .get("instance_id")
        .and_then(scalar_to_string)
        .unwrap_or_default();
    let ports = object.get("ports").map(parse_ports).unwrap_or_default();

    Some(InstanceRecord {
        identifier,
        instance_id,
        host,
        ports,
        expires_at_epoch_seconds,
    })
}

/// Accepts either a comma-joined string or an array of entries.
fn parse_ports(value: &Value) -> Vec<String> {
    let entries: Vec<String> = match value {
        Value::String(joined) => joined.split(',').map(str::to_string).collect(),
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    };

    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Expiry timestamps outside 1970..=9999 are treated as missing.
fn parse_epoch_seconds(value: &Value) -> Option<i64> {
    let seconds = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|seconds| seconds.floor() as i64)),
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (0..=MAX_EPOCH_SECONDS).contains(&seconds).then_some(seconds)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
