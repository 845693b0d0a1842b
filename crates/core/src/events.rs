use crate::entity::AttributeMap;
use tokio::sync::mpsc;

/// Events emitted by devices towards the integration driver
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    Connected { device_id: String },
    Disconnected { device_id: String },
    /// Attribute changes of one entity
    Update {
        entity_id: String,
        attributes: AttributeMap,
    },
    Error { device_id: String, message: String },
}

pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;
pub type DeviceEventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

pub fn device_event_channel() -> (DeviceEventSender, DeviceEventReceiver) {
    mpsc::unbounded_channel()
}
