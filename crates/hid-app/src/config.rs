//! Application configuration

use bt_classic::host::HostConfig;
use bt_classic::DeviceClass;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bluetooth device name; None keeps the device hidden from inquiry
    pub device_name: Option<&'static str>,
    /// PIN offered during legacy pairing
    pub pin: Option<&'static str>,
    /// Advertised class of device
    pub class_of_device: DeviceClass,
    /// Link state machine tick period in milliseconds
    pub tick_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            pin: Some("0000"),
            class_of_device: DeviceClass::gamepad(),
            tick_ms: 100,
        }
    }
}

impl AppConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(name) = self.device_name {
            if name.is_empty() {
                return Err("Device name cannot be empty");
            }
            if name.len() > 247 {
                return Err("Device name must fit in 247 bytes");
            }
        }

        if let Some(pin) = self.pin {
            if pin.is_empty() || pin.len() > 16 {
                return Err("PIN must be between 1 and 16 bytes");
            }
        }

        if self.tick_ms < 10 || self.tick_ms > 1000 {
            return Err("Tick period must be between 10 and 1000 ms");
        }

        Ok(())
    }

    /// Host stack options derived from this configuration
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            local_name: self.device_name,
            pin: self.pin,
            class_of_device: self.class_of_device,
        }
    }
}
