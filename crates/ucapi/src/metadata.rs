//! Driver metadata from `driver.json`

use crate::error::{ApiError, Result};
use intg_core::LocalizedText;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Driver developer information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Developer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Contents of `driver.json`
///
/// Fields the driver doesn't use (icon, description, setup data schema, ...)
/// are kept in `extra` and returned unchanged by `get_driver_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverMetadata {
    pub driver_id: String,
    pub version: String,
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<Developer>,
    /// Default WebSocket port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DriverMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ApiError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_json(&text).map_err(|e| ApiError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let metadata: DriverMetadata = serde_json::from_str(text)?;

        if metadata.driver_id.trim().is_empty() {
            return Err(ApiError::Protocol("driver_id must not be empty".to_string()));
        }
        Ok(metadata)
    }

    /// English name, or any name if there is no English one
    pub fn display_name(&self) -> &str {
        self.name
            .get("en")
            .or_else(|| self.name.values().next())
            .map(String::as_str)
            .unwrap_or(&self.driver_id)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
