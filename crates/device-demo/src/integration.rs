use crate::device::DemoDevice;
use crate::media_player::DemoMediaPlayer;
use intg_core::{DeviceConfig, DeviceEventSender, Entity, Integration};
use std::sync::Arc;

/// Creates demo devices and their media player entities
#[derive(Clone, Debug, Default)]
pub struct DemoIntegration;

impl Integration for DemoIntegration {
    type Device = DemoDevice;

    fn create_device(&self, config: &DeviceConfig, events: DeviceEventSender) -> Arc<DemoDevice> {
        Arc::new(DemoDevice::new(config.clone(), events))
    }

    fn create_entities(
        &self,
        config: &DeviceConfig,
        device: &Arc<DemoDevice>,
    ) -> Vec<Arc<dyn Entity>> {
        vec![Arc::new(DemoMediaPlayer::new(config, device.clone()))]
    }
}
