use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Configuration of one set-up device, persisted in `config.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique identifier of the device
    pub identifier: String,
    /// Friendly name for display purposes
    pub name: String,
    /// Network address of the device (simulated for the demo)
    pub address: String,
}

impl DeviceConfig {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            address: address.into(),
        }
    }
}

/// A device found on the local network during setup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub identifier: String,
    pub name: String,
    pub address: String,
    pub port: Option<u16>,
    /// Additional discovery data (e.g. mDNS TXT properties)
    pub extra: HashMap<String, String>,
}

/// Text keyed by language code, e.g. `{"en": "Demo Device Setup"}`
pub type LocalizedText = BTreeMap<String, String>;

/// Build a localized text with an English entry only
pub fn localized(en: impl Into<String>) -> LocalizedText {
    let mut text = LocalizedText::new();
    text.insert("en".to_string(), en.into());
    text
}

/// Status codes returned to the Remote in responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Unauthorized,
    NotFound,
    Timeout,
    Conflict,
    ServerError,
    NotImplemented,
    ServiceUnavailable,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::NotFound => 404,
            StatusCode::Timeout => 408,
            StatusCode::Conflict => 409,
            StatusCode::ServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

/// Connection state of the integration as reported to the Remote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

/// Entity types known to the Integration API
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Button,
    Climate,
    Cover,
    Light,
    MediaPlayer,
    Remote,
    Sensor,
    Switch,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Button => "button",
            EntityType::Climate => "climate",
            EntityType::Cover => "cover",
            EntityType::Light => "light",
            EntityType::MediaPlayer => "media_player",
            EntityType::Remote => "remote",
            EntityType::Sensor => "sensor",
            EntityType::Switch => "switch",
        }
    }
}

/// Error type for invalid entity type strings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseEntityTypeError(pub String);

impl std::fmt::Display for ParseEntityTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid entity type: {}", self.0)
    }
}

impl std::error::Error for ParseEntityTypeError {}

impl FromStr for EntityType {
    type Err = ParseEntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "button" => Ok(EntityType::Button),
            "climate" => Ok(EntityType::Climate),
            "cover" => Ok(EntityType::Cover),
            "light" => Ok(EntityType::Light),
            "media_player" => Ok(EntityType::MediaPlayer),
            "remote" => Ok(EntityType::Remote),
            "sensor" => Ok(EntityType::Sensor),
            "switch" => Ok(EntityType::Switch),
            other => Err(ParseEntityTypeError(other.to_string())),
        }
    }
}

/// Create an entity identifier: `<entity_type>.<device_id>`
pub fn create_entity_id(entity_type: EntityType, device_id: &str) -> String {
    format!("{}.{}", entity_type.as_str(), device_id)
}

/// Split an entity identifier into its entity type and device identifier
///
/// Returns `None` if the identifier has no `.` separator or an unknown type prefix.
pub fn parse_entity_id(entity_id: &str) -> Option<(EntityType, &str)> {
    let (prefix, device_id) = entity_id.split_once('.')?;
    let entity_type = prefix.parse().ok()?;
    Some((entity_type, device_id))
}
