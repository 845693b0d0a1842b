//! Setup flow data: user input forms and setup outcomes

use crate::models::{localized, DeviceConfig, LocalizedText};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Values submitted by the user for a setup form (`setting id -> value`)
pub type InputValues = HashMap<String, String>;

/// A form the Remote shows to the user during setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestUserInput {
    pub title: LocalizedText,
    pub settings: Vec<Setting>,
}

impl RequestUserInput {
    pub fn new(title: impl Into<String>, settings: Vec<Setting>) -> Self {
        Self {
            title: localized(title),
            settings,
        }
    }

    pub fn setting(&self, id: &str) -> Option<&Setting> {
        self.settings.iter().find(|s| s.id == id)
    }
}

/// One input element of a setup form
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    pub label: LocalizedText,
    pub field: Field,
}

impl Setting {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field: Field) -> Self {
        Self {
            id: id.into(),
            label: localized(label),
            field,
        }
    }
}

/// Input field kinds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    /// Read-only informational text
    Label { value: LocalizedText },
    Dropdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        items: Vec<DropdownItem>,
    },
    Checkbox { value: bool },
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Field::Text {
            value: Some(value.into()),
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Field::Label {
            value: localized(text),
        }
    }

    /// Dropdown preselecting the first item
    pub fn dropdown(items: Vec<DropdownItem>) -> Self {
        Field::Dropdown {
            value: items.first().map(|item| item.id.clone()),
            items,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropdownItem {
    pub id: String,
    pub label: LocalizedText,
}

impl DropdownItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: localized(label),
        }
    }
}

/// Setup error kinds reported to the Remote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetupErrorKind {
    None,
    NotFound,
    ConnectionRefused,
    AuthorizationError,
    Timeout,
    Other,
}

/// Result of querying a device from user input
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    /// The device was identified and can be stored
    Config(DeviceConfig),
    /// Input was incomplete; show this form (again)
    Form(RequestUserInput),
    Error(SetupErrorKind),
}
