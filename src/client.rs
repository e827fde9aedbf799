//! Blocking HTTP client for the plants API.
//!
//! - One bounded-timeout GET per call, no retries. A failed item is retried by
//!   the next cycle, not by this client.
//! - Uses `ureq` with status-as-error disabled so every response goes through
//!   [`classify_reading`], which decides between a usable reading and an error.

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::models::plants::{ApiSummary, PlantId, RawReading};

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug)]
pub enum PlantsClientError {
    Timeout(String),
    Transport(String),
    Http { status: u16, message: String },
    /// HTTP 200 whose body carries an `error` key (e.g. plant on loan).
    Api { message: String },
    /// Body is not the expected shape; `path` names the offending field.
    Malformed { path: String, message: String },
}

impl core::fmt::Display for PlantsClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlantsClientError::Timeout(s) => write!(f, "timed out: {}", s),
            PlantsClientError::Transport(s) => write!(f, "transport error: {}", s),
            PlantsClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            PlantsClientError::Api { message } => write!(f, "api error: {}", message),
            PlantsClientError::Malformed { path, message } => write!(f, "malformed body at `{}`: {}", path, message),
        }
    }
}

impl std::error::Error for PlantsClientError {}

impl From<ureq::Error> for PlantsClientError {
    fn from(value: ureq::Error) -> Self {
        if matches!(value, ureq::Error::Timeout(_)) {
            PlantsClientError::Timeout(value.to_string())
        } else {
            PlantsClientError::Transport(value.to_string())
        }
    }
}

/// Anything that can produce one plant's current reading.
pub trait ReadingSource {
    fn fetch(&self, plant_id: PlantId) -> Result<RawReading, PlantsClientError>;
}

pub struct PlantsClient {
    agent: ureq::Agent,
    base_url: String,
}

impl PlantsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        PlantsClient { agent, base_url }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn get_text(&self, path: &str) -> Result<(StatusCode, String), PlantsClientError> {
        let url = self.url(path);
        let mut res = self.agent.get(&url).header("Accept", "application/json").call()?;
        let status = res.status();
        let body = res.body_mut().read_to_string()?;
        Ok((status, body))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlantsClientError> {
        let (status, body) = self.get_text(path)?;
        if status != StatusCode::OK {
            return Err(http_error(status, &body));
        }
        parse_body(&body)
    }

    pub fn get_plant(&self, plant_id: PlantId) -> Result<RawReading, PlantsClientError> {
        let (status, body) = self.get_text(&format!("/plants/{}", plant_id.0))?;
        classify_reading(status, &body)
    }

    /// Number of plants currently on display, as reported by the API root.
    pub fn plants_on_display(&self) -> Result<Option<u32>, PlantsClientError> {
        let summary: ApiSummary = self.get_json("/")?;
        Ok(summary.plants_on_display)
    }
}

impl ReadingSource for PlantsClient {
    fn fetch(&self, plant_id: PlantId) -> Result<RawReading, PlantsClientError> {
        self.get_plant(plant_id)
    }
}

/// Decide whether a plant response is a usable reading.
///
/// Only a 200 whose body has no `error` key and deserializes into
/// [`RawReading`] is accepted.
pub fn classify_reading(status: StatusCode, body: &str) -> Result<RawReading, PlantsClientError> {
    if status != StatusCode::OK {
        return Err(http_error(status, body));
    }
    let value: Value = parse_body(body)?;
    if let Some(err) = value.get("error") {
        let message = match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(PlantsClientError::Api { message });
    }
    serde_path_to_error::deserialize(value).map_err(|e| PlantsClientError::Malformed {
        path: e.path().to_string(),
        message: e.into_inner().to_string(),
    })
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, PlantsClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| PlantsClientError::Malformed {
        path: e.path().to_string(),
        message: e.into_inner().to_string(),
    })
}

fn http_error(status: StatusCode, body: &str) -> PlantsClientError {
    let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    PlantsClientError::Http {
        status: status.as_u16(),
        message: if message.is_empty() { "<no body>".to_string() } else { message },
    }
}
