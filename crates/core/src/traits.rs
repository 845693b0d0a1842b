use crate::entity::{AttributeMap, EntityDefinition};
use crate::events::DeviceEventSender;
use crate::models::{DeviceConfig, DiscoveredDevice, StatusCode};
use crate::setup::{InputValues, QueryOutcome, RequestUserInput};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for a controlled device (one per configured device)
#[async_trait]
pub trait Device: Send + Sync + 'static {
    /// Unique identifier of this device (from its configuration)
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    fn address(&self) -> Option<&str>;

    /// Identifier used in log messages: the name if set, else the identifier
    fn log_id(&self) -> &str {
        if self.name().is_empty() {
            self.identifier()
        } else {
            self.name()
        }
    }

    /// Connect to the device and start tracking its state
    async fn connect(&self) -> Result<()>;

    /// Disconnect and stop tracking state
    async fn disconnect(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// Current attributes of one of this device's entities
    async fn entity_attributes(&self, entity_id: &str) -> AttributeMap;
}

/// An entity exposed to the Remote, backed by a device
#[async_trait]
pub trait Entity: Send + Sync {
    fn definition(&self) -> &EntityDefinition;

    fn entity_id(&self) -> &str {
        &self.definition().entity_id
    }

    /// Identifier of the device owning this entity
    fn device_id(&self) -> &str;

    /// Execute a command sent by the Remote
    async fn handle_command(&self, cmd_id: &str, params: Option<&AttributeMap>) -> StatusCode;
}

/// Factory binding an integration's device and entity types to configurations
pub trait Integration: Send + Sync + 'static {
    type Device: Device;

    fn create_device(&self, config: &DeviceConfig, events: DeviceEventSender) -> Arc<Self::Device>;

    fn create_entities(
        &self,
        config: &DeviceConfig,
        device: &Arc<Self::Device>,
    ) -> Vec<Arc<dyn Entity>>;
}

/// Device discovery used during setup
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>>;
}

/// Integration-specific part of the setup flow
#[async_trait]
pub trait SetupHandler: Send + Sync {
    /// Form for entering device details manually
    fn manual_entry_form(&self) -> RequestUserInput;

    /// Identify a device from the submitted input values
    async fn query_device(&self, input: &InputValues) -> QueryOutcome;

    /// Discovery to run before offering manual entry, if any
    fn discovery(&self) -> Option<Arc<dyn Discovery>> {
        None
    }

    /// Input values to query a device the user picked from the discovery results
    fn discovered_input(&self, device: &DiscoveredDevice) -> InputValues {
        let mut input = InputValues::new();
        input.insert("address".to_string(), device.address.clone());
        input
    }
}
