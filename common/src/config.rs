use serde::{Deserialize, Serialize};

use crate::{power::PowerTrackerConfig, types::ProtocolKind};

/// A JSON sensor topic and the field to read from it. The field may be a
/// dotted path such as `ENERGY.Power`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorTopicConfig {
    pub topic: String,
    pub field: String,
}

impl SensorTopicConfig {
    pub fn is_usable(&self) -> bool {
        !self.topic.trim().is_empty() && !self.field.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub name: String,
    pub protocol: ProtocolKind,
    #[serde(default)]
    pub current_temperature: Option<SensorTopicConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Climate".to_string(),
            protocol: ProtocolKind::Tcl112,
            current_temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub discovery_enabled: bool,
    pub discovery_prefix: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            tick_interval_ms: 100,
            discovery_enabled: true,
            discovery_prefix: "homeassistant".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub tracker: PowerTrackerConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub power_sensor: Option<SensorTopicConfig>,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            tracker: PowerTrackerConfig::default(),
            bootstrap: BootstrapConfig::default(),
            power_sensor: Some(SensorTopicConfig {
                topic: "climate/power".to_string(),
                field: "power".to_string(),
            }),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.device.sanitize();
        self.tracker.sanitize();
        self.bootstrap.sanitize();
        self.power_sensor = self.power_sensor.take().filter(SensorTopicConfig::is_usable);
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        if self.name.trim().is_empty() {
            self.name = DeviceConfig::default().name;
        }
        self.current_temperature = self
            .current_temperature
            .take()
            .filter(SensorTopicConfig::is_usable);
    }
}

impl BootstrapConfig {
    pub fn sanitize(&mut self) {
        self.timeout_ms = self.timeout_ms.clamp(1_000, 60_000);
        self.tick_interval_ms = self.tick_interval_ms.clamp(10, 1_000);
        let prefix = self.discovery_prefix.trim().trim_end_matches('/');
        self.discovery_prefix = if prefix.is_empty() {
            "homeassistant".to_string()
        } else {
            prefix.to_string()
        };
    }
}
