use crate::shows::pick_show;
use anyhow::Result;
use async_trait::async_trait;
use intg_core::{
    create_entity_id, AttributeMap, Device, DeviceConfig, DeviceEvent, DeviceEventSender,
    EntityType, MediaPlayerAttributes, MediaPlayerState, Poller,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The demo device polls every 30 seconds
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub const MEDIA_IMAGE_URL: &str = "https://avatars.githubusercontent.com/u/102359576?s=200&v=4";

/// Simulated player state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PlayerState {
    pub power_state: MediaPlayerState,
    pub media_title: String,
}

impl PlayerState {
    fn select_random_show<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.media_title = pick_show(&self.media_title, rng).to_string();
    }

    pub fn power_on<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.power_state = MediaPlayerState::On;
        self.select_random_show(rng);
    }

    pub fn power_off(&mut self) {
        self.power_state = MediaPlayerState::Off;
        self.media_title.clear();
    }

    pub fn power_toggle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.power_state.is_powered() {
            self.power_off();
        } else {
            self.power_on(rng);
        }
    }

    /// Off turns on and plays; paused and on start playing; playing pauses.
    /// Every transition picks a new show.
    pub fn play_pause<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        match self.power_state {
            MediaPlayerState::Off => {
                self.power_on(rng);
                self.power_state = MediaPlayerState::Playing;
            }
            MediaPlayerState::Playing => {
                self.power_state = MediaPlayerState::Paused;
                self.select_random_show(rng);
            }
            _ => {
                self.power_state = MediaPlayerState::Playing;
                self.select_random_show(rng);
            }
        }
    }

    /// Poll step: returns true if the title changed
    pub fn poll<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.power_state.is_active() {
            return false;
        }
        self.select_random_show(rng);
        true
    }

    pub fn attributes(&self) -> MediaPlayerAttributes {
        MediaPlayerAttributes {
            state: self.power_state,
            media_title: self.media_title.clone(),
            media_image_url: Some(MEDIA_IMAGE_URL.to_string()),
        }
    }
}

/// State shared between the device handle and its poll task
struct Shared {
    config: DeviceConfig,
    entity_id: String,
    events: DeviceEventSender,
    state: Mutex<PlayerState>,
}

impl Shared {
    fn log_id(&self) -> &str {
        if self.config.name.is_empty() {
            &self.config.identifier
        } else {
            &self.config.name
        }
    }

    fn emit(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("[{}] No listener for device events", self.log_id());
        }
    }

    fn emit_update(&self, attributes: AttributeMap) {
        self.emit(DeviceEvent::Update {
            entity_id: self.entity_id.clone(),
            attributes,
        });
    }

    async fn poll(&self) -> Result<()> {
        tracing::debug!("[{}] Polling demo device...", self.log_id());

        let update = {
            let mut state = self.state.lock().await;
            if state.poll(&mut rand::thread_rng()) {
                tracing::info!(
                    "[{}] Poll update - Now showing: {}",
                    self.log_id(),
                    state.media_title
                );
                let mut attributes = MediaPlayerAttributes::state_map(state.power_state);
                attributes.insert(
                    intg_core::attributes::MEDIA_TITLE.to_string(),
                    state.media_title.clone().into(),
                );
                Some(attributes)
            } else {
                None
            }
        };

        if let Some(attributes) = update {
            self.emit_update(attributes);
        }
        Ok(())
    }
}

/// Simulated media player device
///
/// Polls every [`POLL_INTERVAL`] while connected, picking a new random show
/// as media title whenever the player is on or playing.
pub struct DemoDevice {
    shared: Arc<Shared>,
    poller: Poller,
    /// Held from the connection check until the poller runs
    connecting: Mutex<()>,
}

impl DemoDevice {
    pub fn new(config: DeviceConfig, events: DeviceEventSender) -> Self {
        Self::with_poll_interval(config, events, POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        config: DeviceConfig,
        events: DeviceEventSender,
        poll_interval: Duration,
    ) -> Self {
        let entity_id = create_entity_id(EntityType::MediaPlayer, &config.identifier);
        Self {
            shared: Arc::new(Shared {
                config,
                entity_id,
                events,
                state: Mutex::new(PlayerState::default()),
            }),
            poller: Poller::new(poll_interval),
            connecting: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    /// Entity identifier of the device's media player
    pub fn entity_id(&self) -> &str {
        &self.shared.entity_id
    }

    pub async fn state(&self) -> MediaPlayerState {
        self.shared.state.lock().await.power_state
    }

    pub async fn media_title(&self) -> String {
        self.shared.state.lock().await.media_title.clone()
    }

    pub async fn attributes(&self) -> MediaPlayerAttributes {
        self.shared.state.lock().await.attributes()
    }

    /// Simulated connection setup; a real device would be queried for its state here
    async fn establish_connection(&self) {
        tracing::info!(
            "[{}] Demo device connection established (simulated) at {}",
            self.log_id(),
            self.shared.config.address
        );
        self.shared
            .state
            .lock()
            .await
            .power_on(&mut rand::thread_rng());
    }

    /// Apply a state change and send the resulting attributes to the Remote
    async fn apply(&self, action: impl FnOnce(&mut PlayerState)) -> MediaPlayerAttributes {
        let attributes = {
            let mut state = self.shared.state.lock().await;
            action(&mut state);
            state.attributes()
        };
        self.shared.emit_update(attributes.to_map());
        attributes
    }

    pub async fn power_on(&self) -> Result<()> {
        tracing::debug!("[{}] Powering on", self.log_id());
        self.apply(|state| state.power_on(&mut rand::thread_rng()))
            .await;
        Ok(())
    }

    pub async fn power_off(&self) -> Result<()> {
        tracing::debug!("[{}] Powering off", self.log_id());
        self.apply(PlayerState::power_off).await;
        Ok(())
    }

    pub async fn power_toggle(&self) -> Result<()> {
        tracing::debug!("[{}] Toggling power", self.log_id());
        self.apply(|state| state.power_toggle(&mut rand::thread_rng()))
            .await;
        Ok(())
    }

    /// Cycle play/pause; every press shows a new random TV show
    pub async fn play_pause(&self) -> Result<()> {
        tracing::debug!("[{}] Play/Pause pressed", self.log_id());
        let attributes = self
            .apply(|state| state.play_pause(&mut rand::thread_rng()))
            .await;
        tracing::info!(
            "[{}] Now showing: {} (state: {})",
            self.log_id(),
            attributes.media_title,
            attributes.state
        );
        Ok(())
    }
}

#[async_trait]
impl Device for DemoDevice {
    fn identifier(&self) -> &str {
        &self.shared.config.identifier
    }

    fn name(&self) -> &str {
        &self.shared.config.name
    }

    fn address(&self) -> Option<&str> {
        Some(&self.shared.config.address)
    }

    async fn connect(&self) -> Result<()> {
        let _connecting = self.connecting.lock().await;
        if self.poller.is_running().await {
            tracing::debug!("[{}] Already connected", self.log_id());
            return Ok(());
        }

        self.establish_connection().await;

        let shared = self.shared.clone();
        self.poller
            .start(self.log_id(), move || {
                let shared = shared.clone();
                async move { shared.poll().await }
            })
            .await;

        self.shared.emit(DeviceEvent::Connected {
            device_id: self.identifier().to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.poller.stop().await {
            tracing::info!("[{}] Disconnected", self.log_id());
        }
        self.shared.emit(DeviceEvent::Disconnected {
            device_id: self.identifier().to_string(),
        });
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.poller.is_running().await
    }

    async fn entity_attributes(&self, entity_id: &str) -> AttributeMap {
        if entity_id != self.shared.entity_id {
            return AttributeMap::new();
        }
        self.attributes().await.to_map()
    }
}
