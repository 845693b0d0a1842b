use anyhow::{Context, Result};
use async_trait::async_trait;
use intg_core::{DiscoveredDevice, Discovery};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::time::Duration;

/// Discover devices advertising an mDNS service type
///
/// The demo device has nothing to discover; this is used when the driver is
/// started with a discovery service type.
pub struct MdnsDiscovery {
    service_type: String,
    timeout: Duration,
}

impl MdnsDiscovery {
    /// `service_type` like `_demo._tcp`; the `.local.` domain is appended if missing
    pub fn new(service_type: &str, timeout: Duration) -> Self {
        let service_type = if service_type.ends_with(".local.") {
            service_type.to_string()
        } else {
            format!("{}.local.", service_type.trim_end_matches('.'))
        };

        Self {
            service_type,
            timeout,
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }
}

/// Convert a resolved service into a discovered device
///
/// Identifier and name come from the `id`/`identifier` and `name` TXT
/// properties, falling back to the instance name. IPv4 addresses are preferred.
pub fn parse_service(info: &ServiceInfo) -> Option<DiscoveredDevice> {
    let addresses = info.get_addresses();
    let address = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())?;

    let fullname = info.get_fullname();
    let instance = fullname
        .strip_suffix(info.get_type())
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string();

    let extra: HashMap<String, String> = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();

    let identifier = extra
        .get("id")
        .or_else(|| extra.get("identifier"))
        .cloned()
        .unwrap_or_else(|| instance.clone());
    let name = extra.get("name").cloned().unwrap_or(instance);

    Some(DiscoveredDevice {
        identifier,
        name,
        address: address.to_string(),
        port: Some(info.get_port()),
        extra,
    })
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn discover(&self) -> Result<Vec<DiscoveredDevice>> {
        tracing::info!("Starting mDNS discovery for {}", self.service_type);

        let mdns = ServiceDaemon::new().context("Failed to create mDNS service daemon")?;
        let receiver = mdns
            .browse(&self.service_type)
            .with_context(|| format!("Failed to browse for service: {}", self.service_type))?;

        let mut discovered: Vec<DiscoveredDevice> = Vec::new();
        let start = std::time::Instant::now();

        while start.elapsed() < self.timeout {
            let event = tokio::task::spawn_blocking({
                let receiver = receiver.clone();
                move || receiver.recv_timeout(Duration::from_millis(100))
            })
            .await;

            match event {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    let Some(device) = parse_service(&info) else {
                        tracing::debug!("Ignoring {} without address", info.get_fullname());
                        continue;
                    };

                    tracing::info!(
                        "Discovered device: {} at {}",
                        device.name,
                        device.address
                    );

                    if !discovered.iter().any(|d| d.address == device.address) {
                        discovered.push(device);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) => {
                    // recv timeout, keep browsing until the deadline
                }
                Err(e) => {
                    tracing::warn!("mDNS receive task failed: {}", e);
                    break;
                }
            }
        }

        if let Err(e) = mdns.shutdown() {
            tracing::debug!("mDNS daemon shutdown failed: {}", e);
        }

        tracing::info!("Discovery complete. Found {} device(s)", discovered.len());
        Ok(discovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_normalization() {
        let timeout = Duration::from_secs(1);
        assert_eq!(
            MdnsDiscovery::new("_demo._tcp", timeout).service_type(),
            "_demo._tcp.local."
        );
        assert_eq!(
            MdnsDiscovery::new("_demo._tcp.local.", timeout).service_type(),
            "_demo._tcp.local."
        );
    }

    #[test]
    fn test_parse_service_with_txt() {
        let mut properties = HashMap::new();
        properties.insert("id".to_string(), "SN-1234".to_string());
        properties.insert("name".to_string(), "Living Room".to_string());

        let info = ServiceInfo::new(
            "_demo._tcp.local.",
            "demo-1",
            "demo-1.local.",
            "192.168.1.50",
            8080,
            properties,
        )
        .unwrap();

        let device = parse_service(&info).unwrap();
        assert_eq!(device.identifier, "SN-1234");
        assert_eq!(device.name, "Living Room");
        assert_eq!(device.address, "192.168.1.50");
        assert_eq!(device.port, Some(8080));
        assert_eq!(device.extra.get("id").map(String::as_str), Some("SN-1234"));
    }

    #[test]
    fn test_parse_service_falls_back_to_instance_name() {
        let info = ServiceInfo::new(
            "_demo._tcp.local.",
            "Kitchen",
            "kitchen.local.",
            "192.168.1.51",
            80,
            HashMap::<String, String>::new(),
        )
        .unwrap();

        let device = parse_service(&info).unwrap();
        assert_eq!(device.identifier, "Kitchen");
        assert_eq!(device.name, "Kitchen");
    }
}
