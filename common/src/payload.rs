use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::SensorTopicConfig,
    device::ClimateDevice,
    error::RestoreError,
    topics::{ClimateTopics, PAYLOAD_OFFLINE, PAYLOAD_ONLINE},
    types::{CommandKind, FanLevel, Mode, SwingMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub temperature: f32,
    pub fan_mode: FanLevel,
    pub swing_mode: SwingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateAttributes {
    pub boost: bool,
    pub eco: bool,
    pub health: bool,
    pub light: bool,
    pub sleep: bool,
    /// Configured mode, kept while the unit is off.
    pub mode: Mode,
    pub prev_fan_mode: Option<FanLevel>,
    pub set_temp_allowed: bool,
    pub sleep_allowed: bool,
    pub boost_allowed: bool,
    pub fan_modes_allowed: Vec<FanLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_snapshot: Option<SnapshotPayload>,
}

impl Default for StateAttributes {
    fn default() -> Self {
        Self {
            boost: false,
            eco: false,
            health: false,
            light: false,
            sleep: false,
            mode: Mode::Undefined,
            prev_fan_mode: None,
            set_temp_allowed: false,
            sleep_allowed: false,
            boost_allowed: false,
            fan_modes_allowed: Vec::new(),
            boost_snapshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub hvac_mode: Mode,
    pub fan_mode: FanLevel,
    pub temperature: f32,
    pub swing_mode: SwingMode,
    #[serde(default)]
    pub attrs: StateAttributes,
}

impl StatePayload {
    pub fn from_json(bytes: &[u8]) -> Result<Self, RestoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
}

/// Home Assistant MQTT climate discovery config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,
    pub modes: Vec<Mode>,
    pub fan_modes: Vec<FanLevel>,
    pub swing_modes: Vec<SwingMode>,
    pub min_temp: f32,
    pub max_temp: f32,
    pub temp_step: f32,
    pub mode_command_topic: String,
    pub mode_state_topic: String,
    pub mode_state_template: String,
    pub temperature_command_topic: String,
    pub temperature_state_topic: String,
    pub temperature_state_template: String,
    pub fan_mode_command_topic: String,
    pub fan_mode_state_topic: String,
    pub fan_mode_state_template: String,
    pub swing_mode_command_topic: String,
    pub swing_mode_state_topic: String,
    pub swing_mode_state_template: String,
    pub json_attributes_topic: String,
    pub json_attributes_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_temperature_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_temperature_template: Option<String>,
    pub availability_topic: String,
    pub payload_available: String,
    pub payload_not_available: String,
    pub device: DiscoveryDevice,
}

impl DiscoveryPayload {
    pub fn build(
        device: &ClimateDevice,
        topics: &ClimateTopics,
        name: &str,
        current_temperature: Option<&SensorTopicConfig>,
    ) -> Self {
        let protocol = device.protocol();
        let range = protocol.temperature_range();
        let state_topic = topics.state.clone();

        Self {
            name: name.to_string(),
            unique_id: format!("climate_{}", topics.object_id),
            modes: protocol.modes().to_vec(),
            fan_modes: protocol.fan_levels().to_vec(),
            swing_modes: protocol.swing_modes().to_vec(),
            min_temp: range.min,
            max_temp: range.max,
            temp_step: range.step,
            mode_command_topic: topics.command(CommandKind::Mode).to_string(),
            mode_state_topic: state_topic.clone(),
            mode_state_template: "{{ value_json.hvac_mode }}".to_string(),
            temperature_command_topic: topics.command(CommandKind::Temperature).to_string(),
            temperature_state_topic: state_topic.clone(),
            temperature_state_template: "{{ value_json.temperature }}".to_string(),
            fan_mode_command_topic: topics.command(CommandKind::Fan).to_string(),
            fan_mode_state_topic: state_topic.clone(),
            fan_mode_state_template: "{{ value_json.fan_mode }}".to_string(),
            swing_mode_command_topic: topics.command(CommandKind::Swing).to_string(),
            swing_mode_state_topic: state_topic.clone(),
            swing_mode_state_template: "{{ value_json.swing_mode }}".to_string(),
            json_attributes_topic: state_topic,
            json_attributes_template: "{{ value_json.attrs | tojson }}".to_string(),
            current_temperature_topic: current_temperature.map(|sensor| sensor.topic.clone()),
            current_temperature_template: current_temperature
                .map(|sensor| format!("{{{{ value_json.{} }}}}", sensor.field)),
            availability_topic: topics.availability.clone(),
            payload_available: PAYLOAD_ONLINE.to_string(),
            payload_not_available: PAYLOAD_OFFLINE.to_string(),
            device: DiscoveryDevice {
                identifiers: vec![topics.object_id.clone()],
                name: name.to_string(),
                model: protocol.kind().to_string(),
                manufacturer: "ir-climate".to_string(),
            },
        }
    }
}

/// Reads a numeric field out of a JSON sensor payload. `field` may be a
/// dotted path. Absent, non-numeric and non-finite values yield `None`.
pub fn extract_reading(payload: &[u8], field: &str) -> Option<f32> {
    let root: Value = serde_json::from_slice(payload).ok()?;
    let value = field
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(&root, |node, segment| node.get(segment))?;

    let reading = match value {
        Value::Number(number) => number.as_f64()? as f32,
        Value::String(text) => text.trim().parse::<f32>().ok()?,
        _ => return None,
    };
    reading.is_finite().then_some(reading)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::ProtocolKind;

    #[test]
    fn state_payload_uses_wire_names() {
        let mut device = ClimateDevice::new(ProtocolKind::Daikin64);
        device.set_hvac_mode(Mode::Fan);
        let json = serde_json::to_value(device.state_payload()).unwrap();

        assert_eq!(json["hvac_mode"], "fan_only");
        assert_eq!(json["fan_mode"], "medium");
        assert_eq!(json["swing_mode"], "off");
        assert_eq!(json["attrs"]["mode"], "fan_only");
        assert_eq!(json["attrs"]["boost_allowed"], false);
        assert_eq!(
            json["attrs"]["fan_modes_allowed"],
            serde_json::json!(["low", "medium", "high"])
        );
        assert!(json["attrs"].get("boost_snapshot").is_none());
    }

    #[test]
    fn tolerates_missing_attributes_and_unknown_fields() {
        let payload = StatePayload::from_json(
            br#"{"hvac_mode":"heat","fan_mode":"low","temperature":22,"swing_mode":"off","extra":1}"#,
        )
        .unwrap();
        assert_eq!(payload.hvac_mode, Mode::Heat);
        assert_eq!(payload.attrs, StateAttributes::default());

        assert!(matches!(
            StatePayload::from_json(b"{not json"),
            Err(RestoreError::Json(_))
        ));
    }

    #[test]
    fn discovery_describes_protocol_capabilities() {
        let device = ClimateDevice::new(ProtocolKind::Tcl112);
        let topics = ClimateTopics::for_device("Office");
        let sensor = SensorTopicConfig {
            topic: "office/climate".to_string(),
            field: "temperature".to_string(),
        };
        let discovery = DiscoveryPayload::build(&device, &topics, "Office", Some(&sensor));

        assert_eq!(discovery.min_temp, 16.0);
        assert_eq!(discovery.max_temp, 31.0);
        assert_eq!(discovery.temp_step, 0.5);
        assert_eq!(discovery.mode_command_topic, "office/mode/set");
        assert_eq!(discovery.fan_modes.len(), 4);
        assert_eq!(
            discovery.current_temperature_template.as_deref(),
            Some("{{ value_json.temperature }}")
        );

        let json = serde_json::to_value(&discovery).unwrap();
        assert_eq!(json["modes"][0], "off");
        assert_eq!(json["device"]["model"], "tcl112");
    }

    #[test]
    fn extracts_nested_readings() {
        assert_eq!(extract_reading(br#"{"power": 412.5}"#, "power"), Some(412.5));
        assert_eq!(
            extract_reading(br#"{"ENERGY": {"Power": "37"}}"#, "ENERGY.Power"),
            Some(37.0)
        );
        assert_eq!(extract_reading(br#"{"power": null}"#, "power"), None);
        assert_eq!(extract_reading(br#"{"power": "n/a"}"#, "power"), None);
        assert_eq!(extract_reading(br#"{"voltage": 230}"#, "power"), None);
        assert_eq!(extract_reading(b"garbage", "power"), None);
    }
}
