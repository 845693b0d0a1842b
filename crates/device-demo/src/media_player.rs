use crate::device::DemoDevice;
use async_trait::async_trait;
use intg_core::{
    localized, AttributeMap, Device, DeviceConfig, Entity, EntityDefinition, EntityType,
    MediaPlayerCommand, MediaPlayerDeviceClass, MediaPlayerFeature, StatusCode,
};
use std::sync::Arc;

/// Features supported by the demo media player
pub const FEATURES: [MediaPlayerFeature; 4] = [
    MediaPlayerFeature::OnOff,
    MediaPlayerFeature::Toggle,
    MediaPlayerFeature::PlayPause,
    MediaPlayerFeature::MediaTitle,
];

/// Media player entity of a demo device
///
/// Supports power on/off/toggle and play/pause. Play/pause cycles to a new
/// random TV show.
pub struct DemoMediaPlayer {
    definition: EntityDefinition,
    device: Arc<DemoDevice>,
}

impl DemoMediaPlayer {
    pub fn new(config: &DeviceConfig, device: Arc<DemoDevice>) -> Self {
        let definition = EntityDefinition {
            entity_id: device.entity_id().to_string(),
            entity_type: EntityType::MediaPlayer,
            device_id: Some(config.identifier.clone()),
            features: FEATURES.iter().map(|f| f.as_str().to_string()).collect(),
            name: localized(config.name.clone()),
            area: None,
            device_class: Some(MediaPlayerDeviceClass::StreamingBox.as_str().to_string()),
            options: None,
        };

        tracing::debug!("Initializing demo media player entity: {}", definition.entity_id);

        Self { definition, device }
    }
}

#[async_trait]
impl Entity for DemoMediaPlayer {
    fn definition(&self) -> &EntityDefinition {
        &self.definition
    }

    fn device_id(&self) -> &str {
        self.device.identifier()
    }

    async fn handle_command(&self, cmd_id: &str, params: Option<&AttributeMap>) -> StatusCode {
        match params {
            Some(params) => tracing::info!("Received command: {} {:?}", cmd_id, params),
            None => tracing::info!("Received command: {}", cmd_id),
        }

        let result = match MediaPlayerCommand::parse(cmd_id) {
            MediaPlayerCommand::On => self.device.power_on().await,
            MediaPlayerCommand::Off => self.device.power_off().await,
            MediaPlayerCommand::Toggle => self.device.power_toggle().await,
            MediaPlayerCommand::PlayPause => self.device.play_pause().await,
            MediaPlayerCommand::Other(cmd) => {
                tracing::warn!("Unhandled command: {}", cmd);
                return StatusCode::NotImplemented;
            }
        };

        match result {
            Ok(()) => StatusCode::Ok,
            Err(e) => {
                tracing::error!("Error executing command {}: {:#}", cmd_id, e);
                StatusCode::BadRequest
            }
        }
    }
}
