use anyhow::{Context, Result};
use intg_core::DeviceConfig;
use std::path::{Path, PathBuf};

/// File name of the device configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Path of the device configuration file inside a config directory
pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Outcome of storing a device configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigChange {
    Added(DeviceConfig),
    Updated(DeviceConfig),
}

/// Manages the configured devices, persisted as a JSON array
pub struct ConfigManager {
    path: PathBuf,
    devices: Vec<DeviceConfig>,
}

impl ConfigManager {
    /// Load the configuration from `path`. A missing file is an empty configuration.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let devices = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("Failed to parse configuration {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No configuration at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read configuration {}", path.display()))
            }
        };

        let manager = Self { path, devices };
        tracing::debug!(
            "Loaded {} configured device(s) from {}",
            manager.devices.len(),
            manager.path.display()
        );
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn all(&self) -> &[DeviceConfig] {
        &self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.identifier == identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.get(identifier).is_some()
    }

    /// Store a device configuration, replacing one with the same identifier
    pub async fn add_or_update(&mut self, config: DeviceConfig) -> Result<ConfigChange> {
        let change = match self
            .devices
            .iter_mut()
            .find(|d| d.identifier == config.identifier)
        {
            Some(existing) => {
                *existing = config.clone();
                ConfigChange::Updated(config)
            }
            None => {
                self.devices.push(config.clone());
                ConfigChange::Added(config)
            }
        };

        self.store().await?;
        Ok(change)
    }

    /// Remove a device configuration. Returns the removed entry, if any.
    pub async fn remove(&mut self, identifier: &str) -> Result<Option<DeviceConfig>> {
        let Some(idx) = self.devices.iter().position(|d| d.identifier == identifier) else {
            return Ok(None);
        };

        let removed = self.devices.remove(idx);
        self.store().await?;
        tracing::info!("Removed device configuration {}", identifier);
        Ok(Some(removed))
    }

    /// Remove all device configurations
    pub async fn clear(&mut self) -> Result<()> {
        self.devices.clear();
        self.store().await?;
        tracing::info!("Cleared device configuration");
        Ok(())
    }

    /// Write the configuration to a temporary file and move it into place
    async fn store(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }

        let data = serde_json::to_vec_pretty(&self.devices)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::debug!(
            "Stored {} device(s) to {}",
            self.devices.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_config(id: &str, address: &str) -> DeviceConfig {
        DeviceConfig::new(id, format!("Demo ({})", address), address)
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::load(config_path(dir.path())).await.unwrap();

        assert!(manager.is_empty());
        assert!(!manager.path().exists());
    }

    #[tokio::test]
    async fn test_add_update_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());

        let mut manager = ConfigManager::load(&path).await.unwrap();
        let change = manager
            .add_or_update(demo_config("demo_1", "10.0.0.1"))
            .await
            .unwrap();
        assert!(matches!(change, ConfigChange::Added(_)));

        let change = manager
            .add_or_update(DeviceConfig::new("demo_1", "Renamed", "10.0.0.2"))
            .await
            .unwrap();
        assert!(matches!(change, ConfigChange::Updated(_)));
        assert_eq!(manager.all().len(), 1);

        let reloaded = ConfigManager::load(&path).await.unwrap();
        let device = reloaded.get("demo_1").unwrap();
        assert_eq!(device.name, "Renamed");
        assert_eq!(device.address, "10.0.0.2");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());

        let mut manager = ConfigManager::load(&path).await.unwrap();
        manager.add_or_update(demo_config("a", "10.0.0.1")).await.unwrap();
        manager.add_or_update(demo_config("b", "10.0.0.2")).await.unwrap();

        let removed = manager.remove("a").await.unwrap();
        assert_eq!(removed.map(|d| d.identifier), Some("a".to_string()));
        assert!(manager.remove("a").await.unwrap().is_none());
        assert!(manager.contains("b"));

        manager.clear().await.unwrap();
        assert!(manager.is_empty());
        assert!(ConfigManager::load(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_reads_framework_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        tokio::fs::write(
            &path,
            r#"[{"identifier":"demo_10_0_0_1_abcd1234","name":"Demo (10.0.0.1)","address":"10.0.0.1"}]"#,
        )
        .await
        .unwrap();

        let manager = ConfigManager::load(&path).await.unwrap();
        assert!(manager.contains("demo_10_0_0_1_abcd1234"));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(ConfigManager::load(&path).await.is_err());
    }
}
