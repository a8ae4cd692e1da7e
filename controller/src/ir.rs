use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use climate_common::{CommandFrame, IrTransceiver, TransmitError};

/// IR line reached over MQTT: decoded frames arrive from an external receiver
/// through a bounded channel, transmitted frames go to an external blaster.
pub struct HostTransceiver {
    inbox: mpsc::Receiver<CommandFrame>,
    outlet: Option<(AsyncClient, String)>,
    receive_enabled: bool,
    sent_frames: u64,
    received_frames: u64,
    failed_sends: u64,
    last_send_at: Option<String>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrDiagnostics {
    #[serde(rename = "receiveEnabled")]
    pub receive_enabled: bool,
    #[serde(rename = "sendTopic")]
    pub send_topic: Option<String>,
    #[serde(rename = "sentFrames")]
    pub sent_frames: u64,
    #[serde(rename = "receivedFrames")]
    pub received_frames: u64,
    #[serde(rename = "failedSends")]
    pub failed_sends: u64,
    #[serde(rename = "lastSendAt")]
    pub last_send_at: Option<String>,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl HostTransceiver {
    pub fn new(inbox: mpsc::Receiver<CommandFrame>, outlet: Option<(AsyncClient, String)>) -> Self {
        Self {
            inbox,
            outlet,
            receive_enabled: true,
            sent_frames: 0,
            received_frames: 0,
            failed_sends: 0,
            last_send_at: None,
            last_error: None,
        }
    }

    pub fn diagnostics(&self) -> IrDiagnostics {
        IrDiagnostics {
            receive_enabled: self.receive_enabled,
            send_topic: self.outlet.as_ref().map(|(_, topic)| topic.clone()),
            sent_frames: self.sent_frames,
            received_frames: self.received_frames,
            failed_sends: self.failed_sends,
            last_send_at: self.last_send_at.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn send(&mut self, frame: &CommandFrame) -> Result<(), TransmitError> {
        let body = serde_json::to_vec(frame).map_err(|err| TransmitError(err.to_string()))?;

        match &self.outlet {
            Some((client, topic)) => client
                .try_publish(topic.as_str(), QoS::AtLeastOnce, false, body)
                .map_err(|err| TransmitError(err.to_string())),
            None => {
                info!("[ir]: no blaster attached, frame: {}", String::from_utf8_lossy(&body));
                Ok(())
            }
        }
    }
}

impl IrTransceiver for HostTransceiver {
    fn decode(&mut self) -> Option<CommandFrame> {
        if !self.receive_enabled {
            return None;
        }
        let frame = self.inbox.try_recv().ok()?;
        self.received_frames += 1;
        Some(frame)
    }

    fn transmit(&mut self, frame: &CommandFrame) -> Result<(), TransmitError> {
        match self.send(frame) {
            Ok(()) => {
                self.sent_frames += 1;
                self.last_send_at = Some(chrono::Utc::now().to_rfc3339());
                self.last_error = None;
                debug!(
                    "[ir]: sent {} frame, mode {}, fan {}, {}C",
                    frame.protocol, frame.mode_code, frame.fan_code, frame.temperature
                );
                Ok(())
            }
            Err(err) => {
                self.failed_sends += 1;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn set_receive_enabled(&mut self, enabled: bool) {
        self.receive_enabled = enabled;
    }
}
