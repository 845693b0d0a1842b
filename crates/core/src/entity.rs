use crate::models::{EntityType, LocalizedText};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity attributes as sent to the Remote (`attribute name -> value`)
pub type AttributeMap = Map<String, Value>;

/// Media player attribute names
pub mod attributes {
    pub const STATE: &str = "state";
    pub const MEDIA_TITLE: &str = "media_title";
    pub const MEDIA_IMAGE_URL: &str = "media_image_url";
}

/// Media player states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaPlayerState {
    On,
    #[default]
    Off,
    Playing,
    Paused,
    Standby,
    Buffering,
    Unavailable,
    Unknown,
}

impl MediaPlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPlayerState::On => "ON",
            MediaPlayerState::Off => "OFF",
            MediaPlayerState::Playing => "PLAYING",
            MediaPlayerState::Paused => "PAUSED",
            MediaPlayerState::Standby => "STANDBY",
            MediaPlayerState::Buffering => "BUFFERING",
            MediaPlayerState::Unavailable => "UNAVAILABLE",
            MediaPlayerState::Unknown => "UNKNOWN",
        }
    }

    /// Powered and not paused: the states in which content is shown
    pub fn is_active(&self) -> bool {
        matches!(self, MediaPlayerState::On | MediaPlayerState::Playing)
    }

    pub fn is_powered(&self) -> bool {
        matches!(
            self,
            MediaPlayerState::On | MediaPlayerState::Playing | MediaPlayerState::Paused
        )
    }
}

impl std::fmt::Display for MediaPlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media player features advertised in the entity definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPlayerFeature {
    OnOff,
    Toggle,
    Volume,
    PlayPause,
    Stop,
    Next,
    Previous,
    MediaTitle,
    MediaImageUrl,
}

impl MediaPlayerFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPlayerFeature::OnOff => "on_off",
            MediaPlayerFeature::Toggle => "toggle",
            MediaPlayerFeature::Volume => "volume",
            MediaPlayerFeature::PlayPause => "play_pause",
            MediaPlayerFeature::Stop => "stop",
            MediaPlayerFeature::Next => "next",
            MediaPlayerFeature::Previous => "previous",
            MediaPlayerFeature::MediaTitle => "media_title",
            MediaPlayerFeature::MediaImageUrl => "media_image_url",
        }
    }
}

/// Media player commands sent by the Remote
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaPlayerCommand {
    On,
    Off,
    Toggle,
    PlayPause,
    /// Any command without dedicated handling
    Other(String),
}

impl MediaPlayerCommand {
    pub fn parse(cmd_id: &str) -> Self {
        match cmd_id {
            "on" => MediaPlayerCommand::On,
            "off" => MediaPlayerCommand::Off,
            "toggle" => MediaPlayerCommand::Toggle,
            "play_pause" => MediaPlayerCommand::PlayPause,
            other => MediaPlayerCommand::Other(other.to_string()),
        }
    }
}

/// Media player device classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPlayerDeviceClass {
    Receiver,
    SetTopBox,
    Speaker,
    StreamingBox,
    Tv,
}

impl MediaPlayerDeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPlayerDeviceClass::Receiver => "receiver",
            MediaPlayerDeviceClass::SetTopBox => "set_top_box",
            MediaPlayerDeviceClass::Speaker => "speaker",
            MediaPlayerDeviceClass::StreamingBox => "streaming_box",
            MediaPlayerDeviceClass::Tv => "tv",
        }
    }
}

/// Current attribute values of a media player
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPlayerAttributes {
    pub state: MediaPlayerState,
    #[serde(default)]
    pub media_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_image_url: Option<String>,
}

impl MediaPlayerAttributes {
    /// Convert into the attribute map sent in entity_change events
    pub fn to_map(&self) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert(attributes::STATE.to_string(), self.state.as_str().into());
        map.insert(
            attributes::MEDIA_TITLE.to_string(),
            self.media_title.clone().into(),
        );
        if let Some(url) = &self.media_image_url {
            map.insert(attributes::MEDIA_IMAGE_URL.to_string(), url.clone().into());
        }
        map
    }

    /// Attribute map containing only the state
    pub fn state_map(state: MediaPlayerState) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert(attributes::STATE.to_string(), state.as_str().into());
        map
    }
}

/// Static description of an entity, as listed in `available_entities`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub entity_id: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub features: Vec<String>,
    pub name: LocalizedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}
