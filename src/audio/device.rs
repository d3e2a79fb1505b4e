//! Input device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::AudioError;

/// Wrapper around a cpal input device
pub struct InputDevice {
    inner: cpal::Device,
    pub name: String,
}

impl InputDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get supported input configurations
    pub fn supported_configs(&self) -> Result<Vec<cpal::SupportedStreamConfigRange>, AudioError> {
        self.inner
            .supported_input_configs()
            .map(|iter| iter.collect())
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))
    }

    /// Whether the device supports mono capture at the given rate
    pub fn supports_rate(&self, sample_rate: u32) -> bool {
        let rate = cpal::SampleRate(sample_rate);
        self.supported_configs()
            .map(|configs| {
                configs
                    .iter()
                    .any(|c| rate >= c.min_sample_rate() && rate <= c.max_sample_rate())
            })
            .unwrap_or(false)
    }
}

/// Summary of an input device for host UIs
#[derive(Debug, Clone, Serialize)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

/// List all available input devices
pub fn list_input_devices() -> Vec<InputDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    if let Ok(input_devices) = host.input_devices() {
        for device in input_devices {
            if let Ok(name) = device.name() {
                let is_default = default_name.as_ref() == Some(&name);
                let (sample_rates, max_channels) = device_capabilities(&device);

                devices.push(InputDeviceInfo {
                    name,
                    is_default,
                    sample_rates,
                    max_channels,
                });
            }
        }
    }

    devices
}

/// Probe common sample rates and the channel ceiling for a device
fn device_capabilities(device: &cpal::Device) -> (Vec<u32>, u16) {
    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate_val in [8000u32, 16000, 22050, 44100, 48000, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }
            max_channels = max_channels.max(config.channels());
        }
    }

    sample_rates.sort();
    (sample_rates, max_channels)
}

/// Get an input device by name
pub fn get_input_device(name: &str) -> Result<InputDevice, AudioError> {
    let host = cpal::default_host();

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(InputDevice::from_cpal(device));
            }
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Get the default input device
pub fn default_input_device() -> Result<InputDevice, AudioError> {
    let host = cpal::default_host();
    host.default_input_device()
        .map(InputDevice::from_cpal)
        .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices_does_not_panic() {
        // May be empty on CI/systems without audio hardware
        let devices = list_input_devices();
        for device in &devices {
            assert!(!device.name.is_empty());
        }
    }

    #[test]
    fn unknown_device_is_an_error() {
        let result = get_input_device("definitely-not-a-real-device");
        assert!(matches!(result, Err(AudioError::DeviceNotFound(_))));
    }
}
