use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfig};
use log::debug;
use std::collections::BTreeMap;

use crate::error::DriverError;

/// Output capabilities of one device
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub supported_sample_rates: Vec<u32>,
    pub max_channels: u16,
    pub default_config: SupportedStreamConfig,
}

/// Enumerates cpal output devices and remembers the selected one
pub struct DeviceManager {
    host: Host,
    devices: BTreeMap<String, Device>,
    capabilities: BTreeMap<String, DeviceCapabilities>,
    current_device: Option<Device>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, DriverError> {
        let mut manager = DeviceManager {
            host: cpal::default_host(),
            devices: BTreeMap::new(),
            capabilities: BTreeMap::new(),
            current_device: None,
        };
        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Re-read the host's output devices. Devices whose configuration
    /// cannot be queried are skipped.
    pub fn refresh_devices(&mut self) -> Result<(), DriverError> {
        self.devices.clear();
        self.capabilities.clear();

        let devices = self
            .host
            .output_devices()
            .map_err(|e| DriverError::Device(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            let Ok(name) = device.name() else { continue };
            match Self::query_capabilities(&name, &device) {
                Ok(capabilities) => {
                    self.capabilities.insert(name.clone(), capabilities);
                    self.devices.insert(name, device);
                }
                Err(e) => debug!("Skipping output device {}: {}", name, e),
            }
        }
        Ok(())
    }

    /// Device names in sorted order
    pub fn list_devices(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn get_capabilities(&self, device_name: &str) -> Option<&DeviceCapabilities> {
        self.capabilities.get(device_name)
    }

    /// Select a device by name, or the host default for `None`
    pub fn select_device(&mut self, device_name: Option<&str>) -> Result<(), DriverError> {
        match device_name {
            Some(name) => {
                let device = self
                    .devices
                    .get(name)
                    .cloned()
                    .ok_or_else(|| DriverError::Device(format!("Output device not found: {}", name)))?;
                self.current_device = Some(device);
                Ok(())
            }
            None => self.select_default_device(),
        }
    }

    pub fn select_default_device(&mut self) -> Result<(), DriverError> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| DriverError::Device("No default output device available".to_string()))?;
        self.current_device = Some(device);
        Ok(())
    }

    pub fn current_device(&self) -> Option<&Device> {
        self.current_device.as_ref()
    }

    pub fn current_device_name(&self) -> Option<String> {
        self.current_device.as_ref().and_then(|device| device.name().ok())
    }

    fn query_capabilities(name: &str, device: &Device) -> Result<DeviceCapabilities, DriverError> {
        let default_config = device
            .default_output_config()
            .map_err(|e| DriverError::Device(format!("No default config for {}: {}", name, e)))?;

        let mut sample_rates = Vec::new();
        let mut max_channels = default_config.channels();
        if let Ok(ranges) = device.supported_output_configs() {
            for range in ranges {
                let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
                for rate in [22050, 32000, 44100, 48000, 88200, 96000] {
                    if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
                max_channels = max_channels.max(range.channels());
            }
        }

        let default_rate = default_config.sample_rate().0;
        if !sample_rates.contains(&default_rate) {
            sample_rates.push(default_rate);
        }
        sample_rates.sort_unstable();

        Ok(DeviceCapabilities {
            name: name.to_string(),
            supported_sample_rates: sample_rates,
            max_channels,
            default_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hosts without audio hardware may have no devices at all, so these
    // only check behaviour that holds either way.

    #[test]
    fn test_unknown_device_is_rejected() {
        let Ok(mut manager) = DeviceManager::new() else { return };
        let result = manager.select_device(Some("NonExistentDevice"));
        assert!(matches!(result, Err(DriverError::Device(_))));
        assert!(manager.current_device().is_none());
    }

    #[test]
    fn test_capabilities_cover_listed_devices() {
        let Ok(manager) = DeviceManager::new() else { return };
        for name in manager.list_devices() {
            let caps = manager.get_capabilities(&name).unwrap();
            assert_eq!(caps.name, name);
            assert!(caps.max_channels > 0);
            assert!(caps
                .supported_sample_rates
                .contains(&caps.default_config.sample_rate().0));
        }
    }

    #[test]
    fn test_list_is_sorted() {
        let Ok(manager) = DeviceManager::new() else { return };
        let names = manager.list_devices();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
