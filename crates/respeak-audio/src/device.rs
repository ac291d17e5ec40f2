use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use respeak_foundation::AudioError;

/// Immutable description of a capture device, fixed once resolved for a
/// session.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<(u32, u32)>,
    pub max_channels: u16,
}

/// Select the first device whose name contains the preferred substring
/// (case-insensitive); otherwise the system default; otherwise the first
/// device in the list.
pub fn select_device<'a>(
    devices: &'a [DeviceDescriptor],
    preferred: Option<&str>,
) -> Option<&'a DeviceDescriptor> {
    if let Some(preferred) = preferred.filter(|p| !p.is_empty()) {
        let needle = preferred.to_lowercase();
        if let Some(device) = devices
            .iter()
            .find(|d| d.name.to_lowercase().contains(&needle))
        {
            return Some(device);
        }
    }
    devices
        .iter()
        .find(|d| d.is_default)
        .or_else(|| devices.first())
}

/// Finds a usable capture device at session start. Re-resolution never
/// happens per-frame.
pub struct DeviceResolver {
    host: Host,
}

impl Default for DeviceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceResolver {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, AudioError> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for device in self.host.input_devices()? {
            let Ok(name) = device.name() else {
                continue;
            };
            let mut sample_rates = Vec::new();
            let mut max_channels = 0u16;
            if let Ok(configs) = device.supported_input_configs() {
                for config in configs {
                    sample_rates.push((config.min_sample_rate().0, config.max_sample_rate().0));
                    max_channels = max_channels.max(config.channels());
                }
            }
            devices.push(DeviceDescriptor {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                sample_rates,
                max_channels,
            });
        }
        Ok(devices)
    }

    pub fn resolve(&self, preferred: Option<&str>) -> Result<DeviceDescriptor, AudioError> {
        let devices = self.enumerate()?;
        match select_device(&devices, preferred) {
            Some(descriptor) => {
                tracing::info!(
                    device = %descriptor.name,
                    is_default = descriptor.is_default,
                    "resolved capture device"
                );
                Ok(descriptor.clone())
            }
            None => Err(AudioError::NoDeviceFound {
                preferred: preferred.map(String::from),
            }),
        }
    }

    /// Open the cpal device backing a descriptor. Falls back to the system
    /// default if the named device disappeared between resolution and open.
    pub fn open(&self, descriptor: &DeviceDescriptor) -> Result<Device, AudioError> {
        for device in self.host.input_devices()? {
            if device.name().map(|n| n == descriptor.name).unwrap_or(false) {
                return Ok(device);
            }
        }
        tracing::warn!(
            device = %descriptor.name,
            "resolved device vanished before open, trying system default"
        );
        self.host
            .default_input_device()
            .ok_or(AudioError::NoDeviceFound {
                preferred: Some(descriptor.name.clone()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, is_default: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            name: name.to_string(),
            is_default,
            sample_rates: vec![(8_000, 48_000)],
            max_channels: 2,
        }
    }

    #[test]
    fn preferred_substring_matches_case_insensitively() {
        let devices = vec![
            descriptor("default", true),
            descriptor("hw:Seeed2MicVoicecard", false),
        ];
        let picked = select_device(&devices, Some("seeed2mic")).unwrap();
        assert_eq!(picked.name, "hw:Seeed2MicVoicecard");
    }

    #[test]
    fn missing_preference_falls_back_to_default() {
        let devices = vec![descriptor("default", true)];
        let picked = select_device(&devices, Some("seeed2mic")).unwrap();
        assert_eq!(picked.name, "default");
    }

    #[test]
    fn no_preference_picks_default_over_first() {
        let devices = vec![descriptor("usb-mic", false), descriptor("default", true)];
        let picked = select_device(&devices, None).unwrap();
        assert_eq!(picked.name, "default");
    }

    #[test]
    fn no_default_picks_first() {
        let devices = vec![descriptor("usb-mic", false), descriptor("other", false)];
        let picked = select_device(&devices, None).unwrap();
        assert_eq!(picked.name, "usb-mic");
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert!(select_device(&[], Some("seeed")).is_none());
        assert!(select_device(&[], None).is_none());
    }

    #[test]
    fn empty_preference_behaves_like_none() {
        let devices = vec![descriptor("usb-mic", false), descriptor("default", true)];
        let picked = select_device(&devices, Some("")).unwrap();
        assert_eq!(picked.name, "default");
    }
}
