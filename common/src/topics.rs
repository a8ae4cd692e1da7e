use serde::Serialize;

use crate::types::CommandKind;

pub const SUFFIX_STATE: &str = "state";
pub const SUFFIX_AVAILABILITY: &str = "availability";
pub const SUFFIX_IR_RECEIVED: &str = "ir/received";
pub const SUFFIX_IR_SEND: &str = "ir/send";

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

/// MQTT topic set of one climate device, all rooted at its sanitized name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClimateTopics {
    pub object_id: String,
    pub state: String,
    pub availability: String,
    pub ir_received: String,
    pub ir_send: String,
    commands: Vec<(CommandKind, String)>,
}

impl ClimateTopics {
    pub fn for_device(name: &str) -> Self {
        let object_id = sanitize_name(name);
        let commands = CommandKind::ALL
            .into_iter()
            .map(|kind| (kind, format!("{object_id}/{}/set", kind.as_str())))
            .collect();

        Self {
            state: format!("{object_id}/{SUFFIX_STATE}"),
            availability: format!("{object_id}/{SUFFIX_AVAILABILITY}"),
            ir_received: format!("{object_id}/{SUFFIX_IR_RECEIVED}"),
            ir_send: format!("{object_id}/{SUFFIX_IR_SEND}"),
            commands,
            object_id,
        }
    }

    pub fn command(&self, kind: CommandKind) -> &str {
        self.commands
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, topic)| topic.as_str())
            .unwrap_or_default()
    }

    pub fn commands(&self) -> impl Iterator<Item = (CommandKind, &str)> {
        self.commands
            .iter()
            .map(|(kind, topic)| (*kind, topic.as_str()))
    }

    pub fn command_for_topic(&self, topic: &str) -> Option<CommandKind> {
        self.commands()
            .find(|(_, candidate)| *candidate == topic)
            .map(|(kind, _)| kind)
    }

    pub fn discovery(&self, prefix: &str) -> String {
        format!("{prefix}/climate/{}/config", self.object_id)
    }
}

/// Lowercases and replaces everything outside `[a-z0-9_-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "climate".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_friendly_names() {
        assert_eq!(sanitize_name("Living Room AC"), "living_room_ac");
        assert_eq!(sanitize_name("daikin-1"), "daikin-1");
        assert_eq!(sanitize_name("Büro/Klima"), "b_ro_klima");
        assert_eq!(sanitize_name("   "), "climate");
    }

    #[test]
    fn builds_topics_under_object_id() {
        let topics = ClimateTopics::for_device("Bedroom");
        assert_eq!(topics.state, "bedroom/state");
        assert_eq!(topics.ir_received, "bedroom/ir/received");
        assert_eq!(topics.ir_send, "bedroom/ir/send");
        assert_eq!(topics.command(CommandKind::Fan), "bedroom/fan/set");
        assert_eq!(topics.command(CommandKind::Temperature), "bedroom/temperature/set");
        assert_eq!(topics.discovery("homeassistant"), "homeassistant/climate/bedroom/config");
    }

    #[test]
    fn maps_topics_back_to_commands() {
        let topics = ClimateTopics::for_device("bedroom");
        assert_eq!(
            topics.command_for_topic("bedroom/sleep/set"),
            Some(CommandKind::Sleep)
        );
        assert_eq!(topics.command_for_topic("bedroom/state"), None);
        assert_eq!(topics.commands().count(), CommandKind::ALL.len());
    }
}
