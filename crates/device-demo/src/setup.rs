use anyhow::Result;
use async_trait::async_trait;
use intg_core::{
    DeviceConfig, Discovery, Field, InputValues, QueryOutcome, RequestUserInput, SetupErrorKind,
    SetupHandler, Setting,
};
use std::io::ErrorKind;
use std::sync::Arc;

pub const DEFAULT_ADDRESS: &str = "192.168.1.100";

const INFO_TEXT: &str = "Enter an IP address to set up the demo device. \
    This is a simulated device for testing the integration driver. \
    The IP address doesn't need to be reachable - it's just used \
    as a placeholder identifier.";

/// Setup of demo devices: a single IP address input
///
/// Identifier and name are generated from the address, standing in for what
/// a real integration would read from the device.
pub struct DemoSetupFlow {
    discovery: Option<Arc<dyn Discovery>>,
}

impl DemoSetupFlow {
    pub fn new(discovery: Option<Arc<dyn Discovery>>) -> Self {
        Self { discovery }
    }

    /// Identify the device at `address`
    ///
    /// A real integration connects here and reads serial number and model.
    async fn identify(&self, address: &str) -> Result<DeviceConfig> {
        let short_id = uuid::Uuid::new_v4().simple().to_string();
        let identifier = format!("demo_{}_{}", address.replace('.', "_"), &short_id[..8]);
        let name = format!("Demo ({})", address);

        Ok(DeviceConfig::new(identifier, name, address))
    }
}

/// Map a failure while identifying a device to the setup error shown to the user
pub fn setup_error_for(error: &anyhow::Error) -> SetupErrorKind {
    match error.downcast_ref::<std::io::Error>().map(|e| e.kind()) {
        Some(ErrorKind::TimedOut) => SetupErrorKind::Timeout,
        Some(ErrorKind::NotFound) => SetupErrorKind::NotFound,
        Some(ErrorKind::PermissionDenied) => SetupErrorKind::AuthorizationError,
        _ => SetupErrorKind::ConnectionRefused,
    }
}

#[async_trait]
impl SetupHandler for DemoSetupFlow {
    fn manual_entry_form(&self) -> RequestUserInput {
        RequestUserInput::new(
            "Demo Device Setup",
            vec![
                Setting::new("info", "Setup Demo Device", Field::label(INFO_TEXT)),
                Setting::new("address", "IP Address", Field::text(DEFAULT_ADDRESS)),
            ],
        )
    }

    async fn query_device(&self, input: &InputValues) -> QueryOutcome {
        let address = input.get("address").map(|a| a.trim()).unwrap_or_default();

        if address.is_empty() {
            tracing::warn!("Address is required, re-displaying form");
            return QueryOutcome::Form(self.manual_entry_form());
        }

        tracing::debug!("Setting up demo device with address: {}", address);

        match self.identify(address).await {
            Ok(config) => {
                tracing::info!(
                    "Created demo device - ID: {}, Name: {}",
                    config.identifier,
                    config.name
                );
                QueryOutcome::Config(config)
            }
            Err(e) => {
                tracing::error!("Failed to set up demo device at {}: {:#}", address, e);
                QueryOutcome::Error(setup_error_for(&e))
            }
        }
    }

    fn discovery(&self) -> Option<Arc<dyn Discovery>> {
        self.discovery.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn input(address: &str) -> InputValues {
        let mut values = InputValues::new();
        values.insert("address".to_string(), address.to_string());
        values
    }

    #[test]
    fn test_manual_entry_form() {
        let form = DemoSetupFlow::new(None).manual_entry_form();
        assert_eq!(form.title["en"], "Demo Device Setup");
        assert!(form.setting("info").is_some());
        assert_eq!(
            form.setting("address").map(|s| &s.field),
            Some(&Field::text(DEFAULT_ADDRESS))
        );
    }

    #[tokio::test]
    async fn test_query_device_generates_config() {
        let flow = DemoSetupFlow::new(None);

        let QueryOutcome::Config(config) = flow.query_device(&input(" 192.168.1.42 ")).await else {
            panic!("expected a device configuration");
        };

        assert_eq!(config.address, "192.168.1.42");
        assert_eq!(config.name, "Demo (192.168.1.42)");

        let suffix = config
            .identifier
            .strip_prefix("demo_192_168_1_42_")
            .expect("identifier prefix");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_identifiers_are_unique() {
        let flow = DemoSetupFlow::new(None);
        let first = flow.identify("10.0.0.1").await.unwrap();
        let second = flow.identify("10.0.0.1").await.unwrap();
        assert_ne!(first.identifier, second.identifier);
    }

    #[tokio::test]
    async fn test_empty_address_redisplays_form() {
        let flow = DemoSetupFlow::new(None);

        assert_eq!(
            flow.query_device(&input("   ")).await,
            QueryOutcome::Form(flow.manual_entry_form())
        );
        assert_eq!(
            flow.query_device(&InputValues::new()).await,
            QueryOutcome::Form(flow.manual_entry_form())
        );
    }

    #[test]
    fn test_setup_error_mapping() {
        let timeout = anyhow::Error::new(std::io::Error::from(ErrorKind::TimedOut));
        assert_eq!(setup_error_for(&timeout), SetupErrorKind::Timeout);

        let refused = anyhow::Error::new(std::io::Error::from(ErrorKind::ConnectionRefused));
        assert_eq!(setup_error_for(&refused), SetupErrorKind::ConnectionRefused);

        assert_eq!(
            setup_error_for(&anyhow!("unexpected response")),
            SetupErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn test_no_discovery_by_default() {
        assert!(DemoSetupFlow::new(None).discovery().is_none());
    }
}
