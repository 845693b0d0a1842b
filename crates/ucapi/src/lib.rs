//! Unfolded Circle Integration API
//!
//! This crate implements the driver side of the Integration API: a WebSocket
//! server the Remote connects to, exchanging JSON requests, responses and
//! events.
//!
//! # Components
//!
//! - [`protocol`]: message envelopes, requests, events and payloads
//! - [`server`]: WebSocket listener dispatching to a [`RequestHandler`]
//! - [`driver`]: [`IntegrationDriver`] managing devices, entities and setup
//! - [`setup`]: setup flow state machine
//! - [`mdns`]: `_uc-integration._tcp` advertisement

pub mod driver;
pub mod entities;
pub mod error;
pub mod mdns;
pub mod metadata;
pub mod protocol;
pub mod server;
pub mod session;
pub mod setup;

pub use driver::IntegrationDriver;
pub use entities::EntityRegistry;
pub use error::{ApiError, Result};
pub use mdns::{MdnsAdvertisement, MdnsPublisher, SERVICE_TYPE};
pub use metadata::{Developer, DriverMetadata};
pub use protocol::{OutgoingMessage, RemoteEvent, Request, API_VERSION};
pub use server::{IntegrationServer, RequestHandler};
pub use session::{Session, Sessions};
pub use setup::{SetupAction, SetupContext, SetupFlow, SetupStep};
