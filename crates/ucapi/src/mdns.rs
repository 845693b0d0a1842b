//! mDNS advertisement of the driver
//!
//! The Remote finds integration drivers by browsing for
//! `_uc-integration._tcp`. The instance name is the driver id.

use crate::error::Result;
use crate::metadata::DriverMetadata;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::time::Duration;

/// Service type of integration drivers
pub const SERVICE_TYPE: &str = "_uc-integration._tcp.local.";

/// What is published for the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdnsAdvertisement {
    /// Instance name (the driver id)
    pub instance_name: String,
    /// Host name including the `.local.` domain
    pub hostname: String,
    pub port: u16,
    /// Driver name
    pub name: String,
    /// Driver version
    pub version: String,
    /// Developer name
    pub developer: Option<String>,
}

impl MdnsAdvertisement {
    /// Advertisement of a driver listening on `port`
    ///
    /// `hostname` overrides the system host name.
    pub fn for_driver(metadata: &DriverMetadata, port: u16, hostname: Option<&str>) -> Result<Self> {
        let hostname = match hostname {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => hostname::get()?.to_string_lossy().into_owned(),
        };

        Ok(Self {
            instance_name: metadata.driver_id.clone(),
            hostname: local_hostname(&hostname),
            port,
            name: metadata.display_name().to_string(),
            version: metadata.version.clone(),
            developer: metadata.developer.as_ref().map(|d| d.name.clone()),
        })
    }

    /// Convert to mDNS TXT record format
    pub fn to_txt_record(&self) -> HashMap<String, String> {
        let mut record = HashMap::new();

        record.insert("name".to_string(), self.name.clone());
        record.insert("ver".to_string(), self.version.clone());

        if let Some(developer) = &self.developer {
            record.insert("developer".to_string(), developer.clone());
        }

        record
    }
}

/// Qualify a host name with the `.local.` domain
pub fn local_hostname(hostname: &str) -> String {
    let hostname = hostname.trim_end_matches('.');
    let hostname = hostname.strip_suffix(".local").unwrap_or(hostname);
    format!("{}.local.", hostname)
}

/// Registered mDNS service, unregistered on [`MdnsPublisher::shutdown`]
pub struct MdnsPublisher {
    daemon: ServiceDaemon,
    fullname: String,
}

impl MdnsPublisher {
    pub fn publish(advertisement: &MdnsAdvertisement) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &advertisement.instance_name,
            &advertisement.hostname,
            "",
            advertisement.port,
            advertisement.to_txt_record(),
        )?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        daemon.register(info)?;

        tracing::info!(
            "Published mDNS service {} on {}:{}",
            fullname,
            advertisement.hostname,
            advertisement.port
        );

        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Unregister the service and stop the daemon
    pub fn shutdown(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(receiver) => {
                if receiver.recv_timeout(Duration::from_secs(1)).is_err() {
                    tracing::debug!("No unregister confirmation for {}", self.fullname);
                }
            }
            Err(e) => tracing::warn!("Failed to unregister {}: {}", self.fullname, e),
        }

        if let Err(e) = self.daemon.shutdown() {
            tracing::debug!("mDNS daemon shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> DriverMetadata {
        DriverMetadata::from_json(
            r#"{"driver_id": "demo", "version": "0.1.0", "name": {"en": "Demo Integration"},
                "developer": {"name": "Unfolded Circle ApS"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_local_hostname() {
        assert_eq!(local_hostname("remote"), "remote.local.");
        assert_eq!(local_hostname("remote.local"), "remote.local.");
        assert_eq!(local_hostname("remote.local."), "remote.local.");
    }

    #[test]
    fn test_advertisement_txt_record() {
        let advertisement =
            MdnsAdvertisement::for_driver(&metadata(), 9090, Some("demo-host")).unwrap();

        assert_eq!(advertisement.instance_name, "demo");
        assert_eq!(advertisement.hostname, "demo-host.local.");
        assert_eq!(advertisement.port, 9090);

        let txt = advertisement.to_txt_record();
        assert_eq!(txt.get("name").map(String::as_str), Some("Demo Integration"));
        assert_eq!(txt.get("ver").map(String::as_str), Some("0.1.0"));
        assert_eq!(
            txt.get("developer").map(String::as_str),
            Some("Unfolded Circle ApS")
        );
    }

    #[test]
    fn test_system_hostname_fallback() {
        let advertisement = MdnsAdvertisement::for_driver(&metadata(), 9090, Some(" ")).unwrap();
        assert!(advertisement.hostname.ends_with(".local."));
        assert!(advertisement.hostname.len() > ".local.".len());
    }
}
