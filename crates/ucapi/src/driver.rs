//! Integration driver
//!
//! Owns the configured devices and their entities, answers Integration API
//! requests and forwards device events to the connected Remotes.

use crate::entities::EntityRegistry;
use crate::error::Result;
use crate::metadata::DriverMetadata;
use crate::protocol::{
    DriverSetupChange, DriverVersion, EntityCommand, OutgoingMessage, RemoteEvent, Request,
    VersionInfo, API_VERSION,
};
use crate::server::RequestHandler;
use crate::session::{Session, Sessions};
use crate::setup::{SetupAction, SetupContext, SetupFlow};
use async_trait::async_trait;
use intg_core::{
    attributes, device_event_channel, AttributeMap, Device, DeviceConfig, DeviceEvent,
    DeviceEventReceiver, DeviceEventSender, DeviceState, Entity, Integration, MediaPlayerState,
    SetupHandler, StatusCode,
};
use intg_persistence::{ConfigChange, ConfigManager};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Integration driver for devices of one [`Integration`]
pub struct IntegrationDriver<I: Integration> {
    integration: I,
    metadata: DriverMetadata,
    sessions: Sessions,
    config: RwLock<ConfigManager>,
    devices: RwLock<HashMap<String, Arc<I::Device>>>,
    /// Entity instances by entity id
    entities: RwLock<HashMap<String, Arc<dyn Entity>>>,
    available: RwLock<EntityRegistry>,
    configured: RwLock<EntityRegistry>,
    device_state: RwLock<DeviceState>,
    events_tx: DeviceEventSender,
    events_rx: Mutex<Option<DeviceEventReceiver>>,
    setup: SetupFlow,
    /// Session running the driver setup
    setup_session: Mutex<Option<u64>>,
}

impl<I: Integration> IntegrationDriver<I> {
    pub fn new(
        integration: I,
        metadata: DriverMetadata,
        config: ConfigManager,
        setup_handler: Arc<dyn SetupHandler>,
        sessions: Sessions,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = device_event_channel();

        Arc::new(Self {
            integration,
            metadata,
            sessions,
            config: RwLock::new(config),
            devices: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            available: RwLock::new(EntityRegistry::new()),
            configured: RwLock::new(EntityRegistry::new()),
            device_state: RwLock::new(DeviceState::Disconnected),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            setup: SetupFlow::new(setup_handler),
            setup_session: Mutex::new(None),
        })
    }

    pub fn metadata(&self) -> &DriverMetadata {
        &self.metadata
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub async fn device_state(&self) -> DeviceState {
        *self.device_state.read().await
    }

    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn available_entity_ids(&self) -> Vec<String> {
        self.available.read().await.ids()
    }

    pub async fn configured_entity_ids(&self) -> Vec<String> {
        self.configured.read().await.ids()
    }

    /// Start forwarding device events
    ///
    /// Returns `None` if the event loop is already running.
    pub async fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut events = self.events_rx.lock().await.take()?;
        let driver = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(driver) = driver.upgrade() else {
                    break;
                };
                driver.handle_device_event(event).await;
            }
            tracing::debug!("Device event loop finished");
        }))
    }

    /// Create devices and entities for every stored configuration
    pub async fn register_all_configured_devices(&self) {
        let configs = self.config.read().await.all().to_vec();
        tracing::info!("Registering {} configured device(s)", configs.len());

        for config in &configs {
            self.add_configured_device(config).await;
        }
    }

    /// Create the device and entities of a configuration
    ///
    /// A device with the same identifier is replaced. Entities the Remote
    /// already subscribed to stay subscribed and the device is connected.
    pub async fn add_configured_device(&self, config: &DeviceConfig) {
        if self.devices.read().await.contains_key(&config.identifier) {
            tracing::debug!("Replacing device {}", config.identifier);
            self.drop_device_instance(&config.identifier).await;
        }

        let device = self
            .integration
            .create_device(config, self.events_tx.clone());
        let entities = self.integration.create_entities(config, &device);

        let mut subscribed = false;
        for entity in entities {
            let entity_id = entity.entity_id().to_string();
            let attributes = device.entity_attributes(&entity_id).await;

            self.available
                .write()
                .await
                .add(entity.definition().clone(), attributes.clone());

            {
                let mut configured = self.configured.write().await;
                if configured.contains(&entity_id) {
                    configured.add(entity.definition().clone(), attributes);
                    subscribed = true;
                }
            }

            tracing::debug!("Added entity {}", entity_id);
            self.entities.write().await.insert(entity_id, entity);
        }

        self.devices
            .write()
            .await
            .insert(config.identifier.clone(), device.clone());
        tracing::info!("Added device {} ({})", config.name, config.identifier);

        if subscribed {
            connect_device(device.as_ref()).await;
        }
    }

    /// Disconnect a device and remove it with all its entities
    pub async fn drop_device(&self, identifier: &str) -> bool {
        let entity_ids = self.drop_device_instance(identifier).await;
        let Some(entity_ids) = entity_ids else {
            return false;
        };

        let mut available = self.available.write().await;
        let mut configured = self.configured.write().await;
        for entity_id in &entity_ids {
            available.remove(entity_id);
            configured.remove(entity_id);
        }

        tracing::info!("Removed device {}", identifier);
        true
    }

    pub async fn drop_all_devices(&self) {
        let ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        for id in ids {
            self.drop_device(&id).await;
        }

        self.available.write().await.clear();
        self.configured.write().await.clear();
    }

    /// Remove the device and its entity instances, returning the entity ids
    async fn drop_device_instance(&self, identifier: &str) -> Option<Vec<String>> {
        let device = self.devices.write().await.remove(identifier)?;

        if let Err(e) = device.disconnect().await {
            tracing::warn!("[{}] Disconnect failed: {:#}", device.log_id(), e);
        }

        let mut entities = self.entities.write().await;
        let entity_ids: Vec<String> = entities
            .values()
            .filter(|e| e.device_id() == identifier)
            .map(|e| e.entity_id().to_string())
            .collect();
        for entity_id in &entity_ids {
            entities.remove(entity_id);
        }

        Some(entity_ids)
    }

    fn all_devices(devices: &HashMap<String, Arc<I::Device>>) -> Vec<Arc<I::Device>> {
        devices.values().cloned().collect()
    }

    pub async fn connect_all(&self) {
        let devices = Self::all_devices(&*self.devices.read().await);
        for device in devices {
            connect_device(device.as_ref()).await;
        }
    }

    pub async fn disconnect_all(&self) {
        let devices = Self::all_devices(&*self.devices.read().await);
        for device in devices {
            if let Err(e) = device.disconnect().await {
                tracing::warn!("[{}] Disconnect failed: {:#}", device.log_id(), e);
            }
        }
    }

    /// Set the integration's device state and notify all Remotes
    pub async fn set_device_state(&self, state: DeviceState) {
        *self.device_state.write().await = state;
        self.sessions
            .broadcast(OutgoingMessage::device_state(state))
            .await;
    }

    /// Subscribe to entity events; no ids subscribes to all available entities
    ///
    /// The owning devices are connected and the current attributes of every
    /// subscribed entity are sent.
    pub async fn subscribe(&self, entity_ids: &[String]) {
        let entity_ids = if entity_ids.is_empty() {
            self.available.read().await.ids()
        } else {
            entity_ids.to_vec()
        };

        let mut subscribed = Vec::new();
        {
            let available = self.available.read().await;
            let mut configured = self.configured.write().await;

            for entity_id in entity_ids {
                let Some(definition) = available.definition(&entity_id) else {
                    tracing::warn!("Cannot subscribe to unknown entity {}", entity_id);
                    continue;
                };
                let attributes = available.attributes(&entity_id).cloned().unwrap_or_default();
                configured.add(definition.clone(), attributes);
                subscribed.push(entity_id);
            }
        }

        let devices = self.devices_of(&subscribed).await;
        for device in &devices {
            connect_device(device.as_ref()).await;
        }

        for entity_id in &subscribed {
            let Some(device) = self.device_of(entity_id).await else {
                continue;
            };
            let attributes = device.entity_attributes(entity_id).await;
            self.available
                .write()
                .await
                .update_attributes(entity_id, &attributes);

            let entity_type = {
                let mut configured = self.configured.write().await;
                configured.update_attributes(entity_id, &attributes);
                configured.definition(entity_id).map(|d| d.entity_type)
            };

            if let Some(entity_type) = entity_type {
                self.sessions
                    .broadcast(OutgoingMessage::entity_change(
                        entity_type,
                        entity_id,
                        attributes,
                    ))
                    .await;
            }
        }
    }

    /// Unsubscribe from entity events; no ids unsubscribes from all
    ///
    /// Devices without any remaining subscribed entity are disconnected.
    pub async fn unsubscribe(&self, entity_ids: &[String]) {
        let entity_ids = if entity_ids.is_empty() {
            self.configured.read().await.ids()
        } else {
            entity_ids.to_vec()
        };

        {
            let mut configured = self.configured.write().await;
            for entity_id in &entity_ids {
                if configured.remove(entity_id).is_none() {
                    tracing::debug!("Entity {} was not subscribed", entity_id);
                }
            }
        }

        let remaining = self.configured.read().await.ids();
        let still_used: BTreeSet<String> = self.device_ids_of(&remaining).await;

        for device in self.devices_of(&entity_ids).await {
            if still_used.contains(device.identifier()) {
                continue;
            }
            if let Err(e) = device.disconnect().await {
                tracing::warn!("[{}] Disconnect failed: {:#}", device.log_id(), e);
            }
        }
    }

    /// Execute a command on a subscribed entity
    pub async fn entity_command(&self, command: &EntityCommand) -> StatusCode {
        if !self.configured.read().await.contains(&command.entity_id) {
            tracing::warn!(
                "Entity {} is not configured, ignoring command {}",
                command.entity_id,
                command.cmd_id
            );
            return StatusCode::NotFound;
        }

        let entity = self.entities.read().await.get(&command.entity_id).cloned();
        match entity {
            Some(entity) => {
                entity
                    .handle_command(&command.cmd_id, command.params.as_ref())
                    .await
            }
            None => {
                tracing::warn!("No entity instance for {}", command.entity_id);
                StatusCode::NotFound
            }
        }
    }

    /// Apply a device event to the entity registries and notify the Remotes
    pub async fn handle_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Update {
                entity_id,
                attributes,
            } => self.update_entity(&entity_id, &attributes).await,
            DeviceEvent::Connected { device_id } => {
                tracing::info!("Device {} connected", device_id);
                self.set_device_state(DeviceState::Connected).await;

                let Some(device) = self.devices.read().await.get(&device_id).cloned() else {
                    return;
                };
                for entity_id in self.entity_ids_of(&device_id).await {
                    let attributes = device.entity_attributes(&entity_id).await;
                    self.update_entity(&entity_id, &attributes).await;
                }
            }
            DeviceEvent::Disconnected { device_id } => {
                tracing::info!("Device {} disconnected", device_id);
                self.mark_unavailable(&device_id).await;
            }
            DeviceEvent::Error { device_id, message } => {
                tracing::error!("Device {} error: {}", device_id, message);
                self.mark_unavailable(&device_id).await;
            }
        }
    }

    async fn mark_unavailable(&self, device_id: &str) {
        let attributes = AttributeMap::from_iter([(
            attributes::STATE.to_string(),
            json!(MediaPlayerState::Unavailable),
        )]);

        for entity_id in self.entity_ids_of(device_id).await {
            self.update_entity(&entity_id, &attributes).await;
        }
    }

    /// Merge attributes and send the changed ones of subscribed entities
    async fn update_entity(&self, entity_id: &str, attributes: &AttributeMap) {
        self.available
            .write()
            .await
            .update_attributes(entity_id, attributes);

        let change = {
            let mut configured = self.configured.write().await;
            configured
                .update_attributes(entity_id, attributes)
                .filter(|changed| !changed.is_empty())
                .and_then(|changed| {
                    configured
                        .definition(entity_id)
                        .map(|d| (d.entity_type, changed))
                })
        };

        if let Some((entity_type, changed)) = change {
            tracing::debug!("Entity {} changed: {:?}", entity_id, changed);
            self.sessions
                .broadcast(OutgoingMessage::entity_change(entity_type, entity_id, changed))
                .await;
        }
    }

    async fn entity_ids_of(&self, device_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entities
            .read()
            .await
            .values()
            .filter(|e| e.device_id() == device_id)
            .map(|e| e.entity_id().to_string())
            .collect();
        ids.sort();
        ids
    }

    async fn device_ids_of(&self, entity_ids: &[String]) -> BTreeSet<String> {
        let entities = self.entities.read().await;
        entity_ids
            .iter()
            .filter_map(|id| entities.get(id))
            .map(|e| e.device_id().to_string())
            .collect()
    }

    async fn devices_of(&self, entity_ids: &[String]) -> Vec<Arc<I::Device>> {
        let device_ids = self.device_ids_of(entity_ids).await;
        let devices = self.devices.read().await;
        device_ids
            .iter()
            .filter_map(|id| devices.get(id).cloned())
            .collect()
    }

    async fn device_of(&self, entity_id: &str) -> Option<Arc<I::Device>> {
        let device_id = self
            .entities
            .read()
            .await
            .get(entity_id)
            .map(|e| e.device_id().to_string())?;
        self.devices.read().await.get(&device_id).cloned()
    }

    async fn send_setup_action(&self, session: &Session, action: SetupAction) -> Result<()> {
        let change = match action {
            SetupAction::Input(form) => DriverSetupChange::user_input(form),
            SetupAction::Complete => DriverSetupChange::complete(),
            SetupAction::Error(kind) => DriverSetupChange::error(kind),
        };
        session.send(OutgoingMessage::driver_setup_change(&change)?);
        Ok(())
    }

    /// Disconnect all devices
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down driver");
        self.disconnect_all().await;
    }
}

async fn connect_device<D: Device + ?Sized>(device: &D) {
    if let Err(e) = device.connect().await {
        tracing::error!("[{}] Connect failed: {:#}", device.log_id(), e);
    }
}

#[async_trait]
impl<I: Integration> RequestHandler for IntegrationDriver<I> {
    async fn handle_request(&self, session: &Session, req_id: u32, request: Request) -> Result<()> {
        match request {
            Request::GetDriverVersion => {
                let version = DriverVersion {
                    name: self.metadata.display_name().to_string(),
                    version: VersionInfo {
                        api: API_VERSION.to_string(),
                        driver: self.metadata.version.clone(),
                    },
                };
                session.respond(
                    req_id,
                    StatusCode::Ok,
                    "driver_version",
                    serde_json::to_value(version)?,
                );
            }
            Request::GetDriverMetadata => {
                session.respond(
                    req_id,
                    StatusCode::Ok,
                    "driver_metadata",
                    self.metadata.to_value()?,
                );
            }
            Request::GetDeviceState => {
                let state = self.device_state().await;
                session.respond(req_id, StatusCode::Ok, "device_state", json!({ "state": state }));
            }
            Request::GetAvailableEntities(filter) => {
                let entities = self
                    .available
                    .read()
                    .await
                    .available_entities(filter.filter.as_ref());
                session.respond(
                    req_id,
                    StatusCode::Ok,
                    "available_entities",
                    json!({ "available_entities": entities }),
                );
            }
            Request::GetEntityStates => {
                let states = self.configured.read().await.entity_states();
                session.respond(
                    req_id,
                    StatusCode::Ok,
                    "entity_states",
                    serde_json::to_value(states)?,
                );
            }
            Request::SubscribeEvents(ids) => {
                self.subscribe(&ids.entity_ids).await;
                session.result(req_id, StatusCode::Ok);
            }
            Request::UnsubscribeEvents(ids) => {
                self.unsubscribe(&ids.entity_ids).await;
                session.result(req_id, StatusCode::Ok);
            }
            Request::EntityCommand(command) => {
                let code = self.entity_command(&command).await;
                session.result(req_id, code);
            }
            Request::SetupDriver(request) => {
                session.result(req_id, StatusCode::Ok);
                session.send(OutgoingMessage::driver_setup_change(
                    &DriverSetupChange::progress(),
                )?);

                *self.setup_session.lock().await = Some(session.id());
                let action = self.setup.start(self, &request).await;
                self.send_setup_action(session, action).await?;
            }
            Request::SetDriverUserData(data) => {
                session.result(req_id, StatusCode::Ok);
                session.send(OutgoingMessage::driver_setup_change(
                    &DriverSetupChange::progress(),
                )?);

                let action = self.setup.user_data(self, &data.values()).await;
                self.send_setup_action(session, action).await?;
            }
            Request::Unknown(msg) => {
                tracing::warn!("[{}] Unsupported request: {}", session.peer(), msg);
                session.result(req_id, StatusCode::BadRequest);
            }
        }

        Ok(())
    }

    async fn handle_event(&self, session: &Session, event: RemoteEvent) {
        tracing::debug!("[{}] Remote event: {:?}", session.peer(), event);

        match event {
            RemoteEvent::Connect => {
                self.set_device_state(DeviceState::Connected).await;
                self.connect_all().await;
            }
            RemoteEvent::Disconnect => {
                self.disconnect_all().await;
                self.set_device_state(DeviceState::Disconnected).await;
            }
            RemoteEvent::EnterStandby => self.disconnect_all().await,
            RemoteEvent::ExitStandby => self.connect_all().await,
            RemoteEvent::AbortDriverSetup => self.setup.abort().await,
            RemoteEvent::Unknown(msg) => {
                tracing::debug!("[{}] Ignoring event {}", session.peer(), msg)
            }
        }
    }

    async fn session_closed(&self, session: &Session) {
        let mut setup_session = self.setup_session.lock().await;
        if *setup_session == Some(session.id()) {
            tracing::info!("[{}] Setup session closed", session.peer());
            *setup_session = None;
            self.setup.abort().await;
        }
    }
}

#[async_trait]
impl<I: Integration> SetupContext for IntegrationDriver<I> {
    async fn configured_devices(&self) -> Vec<DeviceConfig> {
        self.config.read().await.all().to_vec()
    }

    async fn store_device(&self, config: DeviceConfig) -> anyhow::Result<()> {
        let change = self.config.write().await.add_or_update(config.clone()).await?;
        match change {
            ConfigChange::Added(_) => tracing::info!("Device {} added", config.identifier),
            ConfigChange::Updated(_) => tracing::info!("Device {} updated", config.identifier),
        }

        self.add_configured_device(&config).await;
        Ok(())
    }

    async fn delete_device(&self, identifier: &str) -> anyhow::Result<bool> {
        let removed = self.config.write().await.remove(identifier).await?;
        if removed.is_none() {
            return Ok(false);
        }

        self.drop_device(identifier).await;
        Ok(true)
    }

    async fn reset_devices(&self) -> anyhow::Result<()> {
        self.config.write().await.clear().await?;
        self.drop_all_devices().await;
        Ok(())
    }
}
