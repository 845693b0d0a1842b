//! Driver setup flow
//!
//! Drives the `setup_driver` / `set_driver_user_data` exchange: configuration
//! mode for existing devices, discovery, manual entry and storing the result.
//! Integration specific parts are delegated to a [`SetupHandler`].

use crate::protocol::SetupDriver;
use anyhow::Result;
use async_trait::async_trait;
use intg_core::{
    DeviceConfig, DiscoveredDevice, DropdownItem, Field, InputValues, QueryOutcome,
    RequestUserInput, SetupErrorKind, SetupHandler, Setting,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Dropdown item of the discovery form selecting manual entry
pub const MANUAL_CHOICE: &str = "manual";

/// Where the setup flow currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    Idle,
    /// Waiting for an action on the configured devices
    ConfigurationMode,
    /// Waiting for the user to pick one of these devices
    DiscoveryChoice(Vec<DiscoveredDevice>),
    ManualEntry,
}

/// Next thing the driver reports to the Remote
#[derive(Debug, Clone, PartialEq)]
pub enum SetupAction {
    /// Show a form and wait for user data
    Input(RequestUserInput),
    Complete,
    Error(SetupErrorKind),
}

/// Access to the device configuration during setup
#[async_trait]
pub trait SetupContext: Send + Sync {
    async fn configured_devices(&self) -> Vec<DeviceConfig>;

    /// Persist a device and make its entities available
    async fn store_device(&self, config: DeviceConfig) -> Result<()>;

    /// Returns `false` if the device is not configured
    async fn delete_device(&self, identifier: &str) -> Result<bool>;

    /// Remove all configured devices
    async fn reset_devices(&self) -> Result<()>;
}

/// Setup state machine shared by all sessions
pub struct SetupFlow {
    handler: Arc<dyn SetupHandler>,
    step: Mutex<SetupStep>,
}

impl SetupFlow {
    pub fn new(handler: Arc<dyn SetupHandler>) -> Self {
        Self {
            handler,
            step: Mutex::new(SetupStep::Idle),
        }
    }

    pub async fn step(&self) -> SetupStep {
        self.step.lock().await.clone()
    }

    /// Handle `setup_driver`
    ///
    /// A reconfiguration with configured devices enters configuration mode.
    /// Any other setup starts over from an empty configuration.
    pub async fn start(&self, ctx: &dyn SetupContext, request: &SetupDriver) -> SetupAction {
        let devices = ctx.configured_devices().await;
        tracing::debug!(
            "Starting driver setup (reconfigure: {}, configured devices: {})",
            request.reconfigure,
            devices.len()
        );

        if request.reconfigure && !devices.is_empty() {
            self.set_step(SetupStep::ConfigurationMode).await;
            return SetupAction::Input(configuration_form(&devices));
        }

        if !request.reconfigure {
            if let Err(e) = ctx.reset_devices().await {
                tracing::error!("Failed to clear configuration: {:#}", e);
                return self.fail(SetupErrorKind::Other).await;
            }
        }

        self.select_device().await
    }

    /// Handle `set_driver_user_data`
    pub async fn user_data(&self, ctx: &dyn SetupContext, values: &InputValues) -> SetupAction {
        match self.step().await {
            SetupStep::Idle => {
                tracing::warn!("Received setup user data without an active setup");
                self.fail(SetupErrorKind::Other).await
            }
            SetupStep::ConfigurationMode => self.configuration_action(ctx, values).await,
            SetupStep::DiscoveryChoice(devices) => {
                let choice = values.get("choice").map(String::as_str).unwrap_or_default();

                if choice == MANUAL_CHOICE {
                    return self.manual_entry().await;
                }

                match devices.iter().find(|d| d.identifier == choice) {
                    Some(device) => {
                        let input = self.handler.discovered_input(device);
                        self.query(ctx, &input).await
                    }
                    None => {
                        tracing::warn!("Selected device {} was not discovered", choice);
                        self.fail(SetupErrorKind::NotFound).await
                    }
                }
            }
            SetupStep::ManualEntry => self.query(ctx, values).await,
        }
    }

    /// Handle `abort_driver_setup`
    pub async fn abort(&self) {
        let mut step = self.step.lock().await;
        if *step != SetupStep::Idle {
            tracing::info!("Driver setup aborted");
            *step = SetupStep::Idle;
        }
    }

    async fn configuration_action(
        &self,
        ctx: &dyn SetupContext,
        values: &InputValues,
    ) -> SetupAction {
        let action = values.get("action").map(String::as_str).unwrap_or_default();

        match action {
            "add" => self.select_device().await,
            "remove" => {
                let Some(choice) = values.get("choice") else {
                    tracing::warn!("No device selected for removal");
                    return self.fail(SetupErrorKind::Other).await;
                };

                match ctx.delete_device(choice).await {
                    Ok(true) => {
                        tracing::info!("Removed device {}", choice);
                        self.finish().await
                    }
                    Ok(false) => {
                        tracing::warn!("Cannot remove unknown device {}", choice);
                        self.fail(SetupErrorKind::NotFound).await
                    }
                    Err(e) => {
                        tracing::error!("Failed to remove device {}: {:#}", choice, e);
                        self.fail(SetupErrorKind::Other).await
                    }
                }
            }
            "reset" => match ctx.reset_devices().await {
                Ok(()) => {
                    tracing::info!("Configuration reset");
                    self.select_device().await
                }
                Err(e) => {
                    tracing::error!("Failed to reset configuration: {:#}", e);
                    self.fail(SetupErrorKind::Other).await
                }
            },
            other => {
                tracing::warn!("Unknown configuration action: {}", other);
                self.fail(SetupErrorKind::Other).await
            }
        }
    }

    /// Offer discovered devices, or the manual entry form if there are none
    async fn select_device(&self) -> SetupAction {
        if let Some(discovery) = self.handler.discovery() {
            match discovery.discover().await {
                Ok(devices) if !devices.is_empty() => {
                    let form = discovery_form(&devices);
                    self.set_step(SetupStep::DiscoveryChoice(devices)).await;
                    return SetupAction::Input(form);
                }
                Ok(_) => tracing::info!("No devices discovered, continuing with manual entry"),
                Err(e) => tracing::warn!("Discovery failed: {:#}", e),
            }
        }

        self.manual_entry().await
    }

    async fn manual_entry(&self) -> SetupAction {
        self.set_step(SetupStep::ManualEntry).await;
        SetupAction::Input(self.handler.manual_entry_form())
    }

    async fn query(&self, ctx: &dyn SetupContext, input: &InputValues) -> SetupAction {
        match self.handler.query_device(input).await {
            QueryOutcome::Config(config) => {
                let identifier = config.identifier.clone();
                match ctx.store_device(config).await {
                    Ok(()) => {
                        tracing::info!("Setup of device {} complete", identifier);
                        self.finish().await
                    }
                    Err(e) => {
                        tracing::error!("Failed to store device {}: {:#}", identifier, e);
                        self.fail(SetupErrorKind::Other).await
                    }
                }
            }
            QueryOutcome::Form(form) => {
                self.set_step(SetupStep::ManualEntry).await;
                SetupAction::Input(form)
            }
            QueryOutcome::Error(kind) => self.fail(kind).await,
        }
    }

    async fn set_step(&self, step: SetupStep) {
        *self.step.lock().await = step;
    }

    async fn finish(&self) -> SetupAction {
        self.set_step(SetupStep::Idle).await;
        SetupAction::Complete
    }

    async fn fail(&self, kind: SetupErrorKind) -> SetupAction {
        self.set_step(SetupStep::Idle).await;
        SetupAction::Error(kind)
    }
}

fn device_label(name: &str, address: &str) -> String {
    format!("{} ({})", name, address)
}

/// Form listing the configured devices and what to do with them
pub fn configuration_form(devices: &[DeviceConfig]) -> RequestUserInput {
    let choices = devices
        .iter()
        .map(|d| DropdownItem::new(&d.identifier, device_label(&d.name, &d.address)))
        .collect();

    let actions = vec![
        DropdownItem::new("add", "Add a new device"),
        DropdownItem::new("remove", "Delete selected device"),
        DropdownItem::new("reset", "Reset configuration and reconfigure"),
    ];

    RequestUserInput::new(
        "Configuration mode",
        vec![
            Setting::new("choice", "Configured devices", Field::dropdown(choices)),
            Setting::new("action", "Action", Field::dropdown(actions)),
        ],
    )
}

/// Form to pick a discovered device or continue with manual entry
pub fn discovery_form(devices: &[DiscoveredDevice]) -> RequestUserInput {
    let mut choices: Vec<DropdownItem> = devices
        .iter()
        .map(|d| DropdownItem::new(&d.identifier, device_label(&d.name, &d.address)))
        .collect();
    choices.push(DropdownItem::new(MANUAL_CHOICE, "Setup manually"));

    RequestUserInput::new(
        "Select a device",
        vec![Setting::new(
            "choice",
            "Discovered devices",
            Field::dropdown(choices),
        )],
    )
}
