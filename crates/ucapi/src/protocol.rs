//! Integration API wire protocol
//!
//! Every WebSocket text frame carries one JSON message with a `kind`:
//! `req` (Remote request), `resp` (driver response) or `event`.

use crate::error::{ApiError, Result};
use intg_core::{
    AttributeMap, DeviceState, EntityDefinition, EntityType, InputValues, RequestUserInput,
    SetupErrorKind, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Version of the Integration API implemented by this driver
pub const API_VERSION: &str = "0.12.1";

/// Message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Req,
    Resp,
    Event,
}

/// Message received from the Remote, before request/event parsing
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// Message kind
    pub kind: MessageKind,
    /// Request id, present for requests
    #[serde(default)]
    pub id: Option<u32>,
    /// Message name
    pub msg: String,
    /// Message payload
    #[serde(default)]
    pub msg_data: Value,
}

impl IncomingMessage {
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Device,
    Entity,
    Remote,
}

/// Message sent by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OutgoingMessage {
    /// Response to a request
    #[serde(rename = "resp")]
    Response {
        req_id: u32,
        code: u16,
        msg: String,
        msg_data: Value,
    },

    /// Event pushed by the driver
    #[serde(rename = "event")]
    Event {
        msg: String,
        cat: EventCategory,
        msg_data: Value,
    },
}

impl OutgoingMessage {
    pub fn response(req_id: u32, code: StatusCode, msg: &str, msg_data: Value) -> Self {
        OutgoingMessage::Response {
            req_id,
            code: code.code(),
            msg: msg.to_string(),
            msg_data,
        }
    }

    /// Generic `result` response carrying only a status code
    pub fn result(req_id: u32, code: StatusCode) -> Self {
        Self::response(req_id, code, "result", json!({}))
    }

    /// Greeting sent on every new connection
    pub fn authentication() -> Self {
        Self::response(0, StatusCode::Ok, "authentication", json!({}))
    }

    pub fn entity_change(entity_type: EntityType, entity_id: &str, attributes: AttributeMap) -> Self {
        OutgoingMessage::Event {
            msg: "entity_change".to_string(),
            cat: EventCategory::Entity,
            msg_data: json!({
                "entity_type": entity_type,
                "entity_id": entity_id,
                "attributes": attributes,
            }),
        }
    }

    pub fn device_state(state: DeviceState) -> Self {
        OutgoingMessage::Event {
            msg: "device_state".to_string(),
            cat: EventCategory::Device,
            msg_data: json!({ "state": state }),
        }
    }

    pub fn driver_setup_change(change: &DriverSetupChange) -> Result<Self> {
        Ok(OutgoingMessage::Event {
            msg: "driver_setup_change".to_string(),
            cat: EventCategory::Device,
            msg_data: serde_json::to_value(change)?,
        })
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message name of this response or event
    pub fn msg(&self) -> &str {
        match self {
            OutgoingMessage::Response { msg, .. } | OutgoingMessage::Event { msg, .. } => msg,
        }
    }
}

/// Requests sent by the Remote
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetDriverVersion,
    GetDriverMetadata,
    GetDeviceState,
    GetAvailableEntities(AvailableEntitiesFilter),
    GetEntityStates,
    SubscribeEvents(EntityIds),
    UnsubscribeEvents(EntityIds),
    EntityCommand(EntityCommand),
    SetupDriver(SetupDriver),
    SetDriverUserData(SetDriverUserData),
    /// Request this driver does not handle
    Unknown(String),
}

impl Request {
    pub fn parse(msg: &str, msg_data: Value) -> Result<Self> {
        // requests without payload may omit msg_data
        let msg_data = if msg_data.is_null() {
            json!({})
        } else {
            msg_data
        };

        let request = match msg {
            "get_driver_version" => Request::GetDriverVersion,
            "get_driver_metadata" => Request::GetDriverMetadata,
            "get_device_state" => Request::GetDeviceState,
            "get_available_entities" => Request::GetAvailableEntities(payload(msg, msg_data)?),
            "get_entity_states" => Request::GetEntityStates,
            "subscribe_events" => Request::SubscribeEvents(payload(msg, msg_data)?),
            "unsubscribe_events" => Request::UnsubscribeEvents(payload(msg, msg_data)?),
            "entity_command" => Request::EntityCommand(payload(msg, msg_data)?),
            "setup_driver" => Request::SetupDriver(payload(msg, msg_data)?),
            "set_driver_user_data" => Request::SetDriverUserData(payload(msg, msg_data)?),
            other => Request::Unknown(other.to_string()),
        };
        Ok(request)
    }
}

fn payload<T: serde::de::DeserializeOwned>(msg: &str, msg_data: Value) -> Result<T> {
    serde_json::from_value(msg_data)
        .map_err(|e| ApiError::Protocol(format!("invalid msg_data for {}: {}", msg, e)))
}

/// Events sent by the Remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    Connect,
    Disconnect,
    EnterStandby,
    ExitStandby,
    AbortDriverSetup,
    Unknown(String),
}

impl RemoteEvent {
    pub fn parse(msg: &str) -> Self {
        match msg {
            "connect" => RemoteEvent::Connect,
            "disconnect" => RemoteEvent::Disconnect,
            "enter_standby" => RemoteEvent::EnterStandby,
            "exit_standby" => RemoteEvent::ExitStandby,
            "abort_driver_setup" => RemoteEvent::AbortDriverSetup,
            other => RemoteEvent::Unknown(other.to_string()),
        }
    }
}

/// Optional filter of `get_available_entities`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AvailableEntitiesFilter {
    #[serde(default)]
    pub filter: Option<EntityFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityFilter {
    #[serde(default)]
    pub device_id: Option<String>,
    /// Entity type name; a type unknown to the driver matches no entity
    #[serde(default)]
    pub entity_type: Option<String>,
}

/// Entity ids of `subscribe_events` / `unsubscribe_events`; empty means all
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityIds {
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

/// Command for one entity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityCommand {
    pub entity_id: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    pub cmd_id: String,
    #[serde(default)]
    pub params: Option<AttributeMap>,
}

/// Start of a setup or reconfiguration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SetupDriver {
    #[serde(default)]
    pub reconfigure: bool,
    /// Values of the driver's initial setup form
    #[serde(default)]
    pub setup_data: serde_json::Map<String, Value>,
}

/// User response during setup: form values or a confirmation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SetDriverUserData {
    #[serde(default)]
    pub input_values: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub confirm: Option<bool>,
}

impl SetDriverUserData {
    /// Submitted values as strings; a confirmation becomes `confirm`
    pub fn values(&self) -> InputValues {
        let mut values: InputValues = self
            .input_values
            .iter()
            .flatten()
            .map(|(key, value)| (key.clone(), value_to_string(value)))
            .collect();

        if let Some(confirm) = self.confirm {
            values.insert("confirm".to_string(), confirm.to_string());
        }
        values
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `driver_version` response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverVersion {
    pub name: String,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub api: String,
    pub driver: String,
}

/// Entry of `available_entities`: definition plus current attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableEntity {
    #[serde(flatten)]
    pub definition: EntityDefinition,
    pub attributes: AttributeMap,
}

/// Entry of `entity_states`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub attributes: AttributeMap,
}

/// Setup event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupEventType {
    Start,
    Setup,
    Stop,
}

/// Setup states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupState {
    Setup,
    WaitUserAction,
    Ok,
    Error,
}

/// What the driver needs from the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequireUserAction {
    pub input: RequestUserInput,
}

/// `driver_setup_change` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSetupChange {
    pub event_type: SetupEventType,
    pub state: SetupState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SetupErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_user_action: Option<RequireUserAction>,
}

impl DriverSetupChange {
    /// Setup in progress
    pub fn progress() -> Self {
        Self {
            event_type: SetupEventType::Setup,
            state: SetupState::Setup,
            error: None,
            require_user_action: None,
        }
    }

    pub fn user_input(input: RequestUserInput) -> Self {
        Self {
            event_type: SetupEventType::Setup,
            state: SetupState::WaitUserAction,
            error: None,
            require_user_action: Some(RequireUserAction { input }),
        }
    }

    pub fn complete() -> Self {
        Self {
            event_type: SetupEventType::Stop,
            state: SetupState::Ok,
            error: None,
            require_user_action: None,
        }
    }

    pub fn error(kind: SetupErrorKind) -> Self {
        Self {
            event_type: SetupEventType::Stop,
            state: SetupState::Error,
            error: Some(kind),
            require_user_action: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_without_msg_data() {
        let message =
            IncomingMessage::from_text(r#"{"kind":"req","id":3,"msg":"get_driver_version"}"#)
                .unwrap();
        assert_eq!(message.kind, MessageKind::Req);
        assert_eq!(message.id, Some(3));

        let request = Request::parse(&message.msg, message.msg_data).unwrap();
        assert_eq!(request, Request::GetDriverVersion);
    }

    #[test]
    fn test_parse_entity_command() {
        let message = IncomingMessage::from_text(
            r#"{"kind":"req","id":7,"msg":"entity_command","msg_data":{
                "entity_type":"media_player","entity_id":"media_player.demo_1","cmd_id":"play_pause"}}"#,
        )
        .unwrap();

        let Request::EntityCommand(cmd) = Request::parse(&message.msg, message.msg_data).unwrap()
        else {
            panic!("expected entity_command");
        };
        assert_eq!(cmd.entity_id, "media_player.demo_1");
        assert_eq!(cmd.entity_type, Some(EntityType::MediaPlayer));
        assert_eq!(cmd.cmd_id, "play_pause");
        assert!(cmd.params.is_none());
    }

    #[test]
    fn test_parse_invalid_payload() {
        let result = Request::parse("entity_command", json!({"entity_id": 5}));
        assert!(matches!(result, Err(ApiError::Protocol(_))));
    }

    #[test]
    fn test_parse_unknown_request_and_event() {
        assert_eq!(
            Request::parse("get_version", Value::Null).unwrap(),
            Request::Unknown("get_version".to_string())
        );
        assert_eq!(RemoteEvent::parse("enter_standby"), RemoteEvent::EnterStandby);
        assert_eq!(
            RemoteEvent::parse("reboot"),
            RemoteEvent::Unknown("reboot".to_string())
        );
    }

    #[test]
    fn test_parse_filter_with_unknown_entity_type() {
        let request = Request::parse(
            "get_available_entities",
            json!({"filter": {"entity_type": "ir_emitter", "device_id": "demo_1"}}),
        )
        .unwrap();

        let Request::GetAvailableEntities(filter) = request else {
            panic!("expected get_available_entities");
        };
        let filter = filter.filter.unwrap();
        assert_eq!(filter.entity_type.as_deref(), Some("ir_emitter"));
        assert_eq!(filter.device_id.as_deref(), Some("demo_1"));
    }

    #[test]
    fn test_subscribe_defaults_to_all() {
        let request = Request::parse("subscribe_events", json!({})).unwrap();
        assert_eq!(request, Request::SubscribeEvents(EntityIds::default()));
    }

    #[test]
    fn test_user_data_values() {
        let data: SetDriverUserData = serde_json::from_value(json!({
            "input_values": {"address": "10.0.0.1", "remember": true}
        }))
        .unwrap();

        let values = data.values();
        assert_eq!(values["address"], "10.0.0.1");
        assert_eq!(values["remember"], "true");

        let confirm: SetDriverUserData = serde_json::from_value(json!({"confirm": true})).unwrap();
        assert_eq!(confirm.values()["confirm"], "true");
    }

    #[test]
    fn test_response_wire_format() {
        let text = OutgoingMessage::result(12, StatusCode::NotFound)
            .to_text()
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["kind"], "resp");
        assert_eq!(value["req_id"], 12);
        assert_eq!(value["code"], 404);
        assert_eq!(value["msg"], "result");
    }

    #[test]
    fn test_entity_change_wire_format() {
        let mut attributes = AttributeMap::new();
        attributes.insert("state".to_string(), "ON".into());

        let value = serde_json::to_value(OutgoingMessage::entity_change(
            EntityType::MediaPlayer,
            "media_player.demo_1",
            attributes,
        ))
        .unwrap();

        assert_eq!(value["kind"], "event");
        assert_eq!(value["cat"], "ENTITY");
        assert_eq!(value["msg_data"]["entity_type"], "media_player");
        assert_eq!(value["msg_data"]["attributes"]["state"], "ON");
    }

    #[test]
    fn test_setup_change_wire_format() {
        let message =
            OutgoingMessage::driver_setup_change(&DriverSetupChange::error(SetupErrorKind::Timeout))
                .unwrap();
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["msg"], "driver_setup_change");
        assert_eq!(value["msg_data"]["event_type"], "STOP");
        assert_eq!(value["msg_data"]["state"], "ERROR");
        assert_eq!(value["msg_data"]["error"], "TIMEOUT");
        assert!(value["msg_data"].get("require_user_action").is_none());
    }
}
