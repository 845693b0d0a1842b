//! Demo device integration
//!
//! A simulated media player for exercising the integration driver without
//! real hardware. The device cycles through TV show titles: every poll while
//! it is on, and on every play/pause press.

pub mod device;
pub mod discovery;
pub mod integration;
pub mod media_player;
pub mod setup;
pub mod shows;

pub use device::{DemoDevice, MEDIA_IMAGE_URL, POLL_INTERVAL};
pub use discovery::MdnsDiscovery;
pub use integration::DemoIntegration;
pub use media_player::DemoMediaPlayer;
pub use setup::DemoSetupFlow;
