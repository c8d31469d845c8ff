//! Persistent device configuration
//!
//! The device keeps its [`DeviceConfig`] in flash; the host keeps it in a JSON
//! file. A missing or unreadable file is not an error: the device boots with
//! defaults and logs why. An invalid file is treated the same way so a typo
//! cannot brick the sampler.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use log::{info, warn};

use vibemon_core::alerts::Thresholds;
use vibemon_core::config::{DeviceConfig, DeviceName};
use vibemon_core::dispatcher::DeliveryMode;
use vibemon_core::traits::ConfigProvider;

use crate::HostError;

/// Read a configuration file, validating it
pub fn load(path: impl AsRef<Path>) -> Result<DeviceConfig, HostError> {
    let text = fs::read_to_string(path.as_ref())?;
    let config: DeviceConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// Write a configuration file as pretty JSON
pub fn save(path: impl AsRef<Path>, config: &DeviceConfig) -> Result<(), HostError> {
    config.validate()?;
    let text = serde_json::to_string_pretty(config)?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

/// Configuration shared between the runtime tasks
///
/// Cloning is cheap; all clones see the same values. The sampler re-reads the
/// interval and thresholds every period, so updates apply on the next sample.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<DeviceConfig>>,
    path: Option<Arc<PathBuf>>,
}

impl SharedConfig {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
        }
    }

    /// Load from `path`, falling back to defaults on any failure
    ///
    /// The path is remembered so [`SharedConfig::persist`] writes back to it.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let config = match load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Using default configuration ({}: {})", path.display(), e);
                DeviceConfig::default()
            }
        };

        Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(Arc::new(path.to_path_buf())),
        }
    }

    /// Copy of the current configuration
    pub fn get(&self) -> DeviceConfig {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the configuration after validating it
    pub fn update(&self, config: DeviceConfig) -> Result<(), HostError> {
        config.validate()?;
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Edit the configuration in place; rejected edits leave it untouched
    pub fn modify<F>(&self, edit: F) -> Result<(), HostError>
    where
        F: FnOnce(&mut DeviceConfig),
    {
        let mut candidate = self.get();
        edit(&mut candidate);
        self.update(candidate)
    }

    /// Restore factory defaults, keeping the device name
    pub fn reset(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let device_name = guard.device_name.clone();
        *guard = DeviceConfig {
            device_name,
            ..DeviceConfig::default()
        };
        info!("Configuration reset to defaults");
    }

    pub fn delivery(&self) -> DeliveryMode {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).delivery
    }

    /// Name the device advertises under
    pub fn device_name(&self) -> DeviceName {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .device_name
            .clone()
    }

    /// Write the current configuration back to the file it was loaded from
    ///
    /// A no-op for configurations not backed by a file.
    pub fn persist(&self) -> Result<(), HostError> {
        match &self.path {
            Some(path) => save(path.as_path(), &self.get()),
            None => Ok(()),
        }
    }
}

impl ConfigProvider for SharedConfig {
    fn sample_interval_ms(&self) -> u32 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).sample_interval_ms
    }

    fn thresholds(&self) -> Thresholds {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).thresholds
    }

    fn alerts_enabled(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).alerts_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibemon_core::config::SamplingPreset;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(config.get(), DeviceConfig::default());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "sample_interval_ms": 5 }"#).unwrap();

        assert!(matches!(load(&path), Err(HostError::Config(_))));
        assert_eq!(SharedConfig::load_or_default(&path).sample_interval_ms(), 1000);

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path), Err(HostError::Json(_))));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "sample_interval_ms": 250, "delivery": "indicate" }"#).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.sample_interval_ms, 250);
        assert_eq!(config.delivery, DeliveryMode::Indicate);
        assert_eq!(config.thresholds, Thresholds::default());
        assert!(config.alerts_enabled);
    }

    #[test]
    fn persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");

        let shared = SharedConfig::load_or_default(&path);
        shared
            .modify(|c| {
                c.apply_preset(SamplingPreset::Slow);
                c.alerts_enabled = false;
            })
            .unwrap();
        shared.persist().unwrap();

        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded.sample_interval_ms, 5000);
        assert!(!reloaded.alerts_enabled);
    }

    #[test]
    fn rejected_update_keeps_previous() {
        let shared = SharedConfig::new(DeviceConfig::default());
        let result = shared.modify(|c| c.thresholds.vibration_warning = 9.0);
        assert!(matches!(result, Err(HostError::Config(_))));
        assert_eq!(shared.thresholds(), Thresholds::default());
    }

    #[test]
    fn reset_keeps_name() {
        let shared = SharedConfig::new(DeviceConfig::for_device([0, 0, 0, 0, 0x12, 0x34]));
        shared.modify(|c| c.sample_interval_ms = 100).unwrap();

        let clone = shared.clone();
        clone.reset();

        let config = shared.get();
        assert_eq!(config.sample_interval_ms, 1000);
        assert_eq!(config.device_name.as_str(), "VibeMon_1234");
    }
}
