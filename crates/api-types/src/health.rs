use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub cors_origins: Vec<String>,
}

/// Echo of the caller's request headers, used to debug proxy and CORS setups.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiagnosticResponse {
    pub message: String,
    pub origin: Option<String>,
    pub host: Option<String>,
    pub timestamp: DateTime<Utc>,
}
