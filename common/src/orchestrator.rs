use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{BootstrapConfig, RuntimeConfig, SensorTopicConfig},
    device::ClimateDevice,
    error::{CommandError, TransmitError},
    payload::{DiscoveryPayload, StatePayload},
    power::{PowerClass, PowerTracker},
    protocol::CommandFrame,
    topics::ClimateTopics,
    types::{parse_toggle, CommandKind},
};

const INITIAL_RETRY_MS: u64 = 250;

/// The IR line. Transmit and receive share it, so reception is switched off
/// around every transmission.
pub trait IrTransceiver {
    fn decode(&mut self) -> Option<CommandFrame>;
    fn transmit(&mut self, frame: &CommandFrame) -> Result<(), TransmitError>;
    fn set_receive_enabled(&mut self, enabled: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClimateAction {
    PublishState(StatePayload),
    PublishDiscovery {
        topic: String,
        payload: DiscoveryPayload,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Idle,
    AwaitingRetained,
    Settling,
    Retrying,
    Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub frames_sent: u32,
    pub transmit_failures: u32,
    pub frames_observed: u32,
    pub frames_rejected: u32,
    pub commands_rejected: u32,
    pub power_corrections: u32,
    pub publish_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerDiagnostics {
    pub initialized: bool,
    pub classification: PowerClass,
    pub latest_sample_w: Option<f32>,
    pub stable_w: f32,
    pub power_on: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub phase: BootstrapPhase,
    pub summary: String,
    pub power: PowerDiagnostics,
    pub stats: OrchestratorStats,
    pub last_command_ms: Option<u64>,
}

pub struct ClimateOrchestrator<T: IrTransceiver> {
    device: ClimateDevice,
    tracker: PowerTracker,
    transceiver: T,
    topics: ClimateTopics,
    name: String,
    bootstrap: BootstrapConfig,
    current_temperature: Option<SensorTopicConfig>,
    phase: BootstrapPhase,
    bootstrap_started_ms: u64,
    bootstrapped: bool,
    retry_at_ms: u64,
    retry_backoff_ms: u64,
    latest_power: Option<f32>,
    last_command_ms: Option<u64>,
    stats: OrchestratorStats,
}

impl<T: IrTransceiver> ClimateOrchestrator<T> {
    pub fn new(config: &RuntimeConfig, transceiver: T) -> Self {
        Self {
            device: ClimateDevice::new(config.device.protocol),
            tracker: PowerTracker::new(config.tracker.clone()),
            transceiver,
            topics: ClimateTopics::for_device(&config.device.name),
            name: config.device.name.clone(),
            bootstrap: config.bootstrap.clone(),
            current_temperature: config.device.current_temperature.clone(),
            phase: BootstrapPhase::Idle,
            bootstrap_started_ms: 0,
            bootstrapped: false,
            retry_at_ms: 0,
            retry_backoff_ms: INITIAL_RETRY_MS.min(config.bootstrap.timeout_ms),
            latest_power: None,
            last_command_ms: None,
            stats: OrchestratorStats::default(),
        }
    }

    pub fn device(&self) -> &ClimateDevice {
        &self.device
    }

    pub fn tracker(&self) -> &PowerTracker {
        &self.tracker
    }

    pub fn topics(&self) -> &ClimateTopics {
        &self.topics
    }

    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    pub fn transceiver_mut(&mut self) -> &mut T {
        &mut self.transceiver
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn state_payload(&self) -> StatePayload {
        self.device.state_payload()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            phase: self.phase,
            summary: self.device.summary(),
            power: PowerDiagnostics {
                initialized: self.tracker.is_initialized(),
                classification: self.tracker.classification(),
                latest_sample_w: self.latest_power,
                stable_w: self.tracker.stable_value(),
                power_on: self.tracker.power_on(),
            },
            stats: self.stats,
            last_command_ms: self.last_command_ms,
        }
    }

    pub fn begin_bootstrap(&mut self, now_ms: u64) {
        info!("[bootstrap]: waiting for retained state on {}", self.topics.state);
        self.phase = BootstrapPhase::AwaitingRetained;
        self.bootstrap_started_ms = now_ms;
        self.retry_at_ms = 0;
        self.retry_backoff_ms = INITIAL_RETRY_MS.min(self.bootstrap.timeout_ms);
        self.tracker.reset();
    }

    pub fn on_retained_state(&mut self, payload: &[u8], now_ms: u64) {
        if self.phase != BootstrapPhase::AwaitingRetained {
            return;
        }
        self.phase = BootstrapPhase::Settling;

        let restored = StatePayload::from_json(payload)
            .and_then(|state| self.device.restore(&state));
        if let Err(err) = restored {
            warn!("[bootstrap]: {err}, keeping current settings");
            return;
        }

        info!(
            "[bootstrap]: restored after {}ms: {}",
            now_ms.saturating_sub(self.bootstrap_started_ms),
            self.device.summary()
        );

        if self.tracker.is_initialized() {
            let watts = self.tracker.last_value();
            self.reconcile_power(watts, &mut Vec::new());
            self.tracker.reset();
        }
    }

    // Backoff doubles up to the bootstrap timeout. Inside the bootstrap
    // window a failure only pushes the initial publish back.
    pub fn publish_failed(&mut self, now_ms: u64) {
        self.stats.publish_failures += 1;
        if self.phase == BootstrapPhase::Idle {
            return;
        }

        self.retry_at_ms = now_ms + self.retry_backoff_ms;
        warn!(
            "[bootstrap]: publish failed, retrying in {}ms",
            self.retry_backoff_ms
        );
        self.retry_backoff_ms = (self.retry_backoff_ms * 2).min(self.bootstrap.timeout_ms);

        if matches!(self.phase, BootstrapPhase::Ready | BootstrapPhase::Retrying) {
            self.phase = BootstrapPhase::Retrying;
        }
    }

    pub fn update_power(&mut self, sample: f32) {
        if sample.is_finite() {
            self.latest_power = Some(sample);
        }
    }

    pub fn tick(&mut self, now_ms: u64) -> Vec<ClimateAction> {
        let mut actions = Vec::new();
        self.advance_bootstrap(now_ms, &mut actions);

        if !self.bootstrapped {
            return actions;
        }

        if let Some(frame) = self.transceiver.decode() {
            self.observe_frame(&frame, &mut actions);
        }
        self.feed_power(now_ms, &mut actions);
        actions
    }

    pub fn handle_command(
        &mut self,
        kind: CommandKind,
        payload: &str,
        now_ms: u64,
    ) -> Vec<ClimateAction> {
        debug!("[{kind}]: command payload '{payload}'");
        self.last_command_ms = Some(now_ms);

        match self.apply_command(kind, payload) {
            Ok(true) => self.transmit_state(),
            Ok(false) => {
                self.stats.commands_rejected += 1;
                debug!("[{kind}]: '{payload}' rejected in {}", self.device.summary());
            }
            Err(err) => {
                warn!("[{kind}]: {err}");
                return Vec::new();
            }
        }
        vec![ClimateAction::PublishState(self.device.state_payload())]
    }

    fn apply_command(&mut self, kind: CommandKind, payload: &str) -> Result<bool, CommandError> {
        let device = &mut self.device;
        let accepted = match kind {
            CommandKind::Mode => {
                let mode = payload.parse()?;
                self.tracker.reset();
                device.set_hvac_mode(mode)
            }
            CommandKind::Temperature => {
                let temperature = payload
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| CommandError::InvalidNumber(payload.to_string()))?;
                device.set_temperature(temperature)
            }
            CommandKind::Fan => device.set_fan(payload.parse()?),
            CommandKind::Swing => device.set_swing(payload.parse()?),
            CommandKind::Boost => device.set_boost(parse_toggle(payload)?),
            CommandKind::Eco => device.set_eco(parse_toggle(payload)?),
            CommandKind::Health => device.set_health(parse_toggle(payload)?),
            CommandKind::Light => device.set_light(parse_toggle(payload)?),
            CommandKind::Sleep => device.set_sleep(parse_toggle(payload)?),
        };
        Ok(accepted)
    }

    fn transmit_state(&mut self) {
        let frame = self.device.command_frame();

        self.transceiver.set_receive_enabled(false);
        let result = self.transceiver.transmit(&frame);
        self.transceiver.set_receive_enabled(true);

        match result {
            Ok(()) => {
                self.device.mark_transmitted();
                self.stats.frames_sent += 1;
                debug!("[ir]: sent {}", self.device.summary());
            }
            Err(err) => {
                self.stats.transmit_failures += 1;
                warn!("[ir]: {err}");
            }
        }
    }

    fn advance_bootstrap(&mut self, now_ms: u64, actions: &mut Vec<ClimateAction>) {
        let elapsed = now_ms.saturating_sub(self.bootstrap_started_ms);

        if self.phase == BootstrapPhase::AwaitingRetained {
            if elapsed <= self.bootstrap.timeout_ms {
                return;
            }
            warn!(
                "[bootstrap]: no retained state after {:.2}s, using current settings",
                elapsed as f32 / 1000.0
            );
            self.phase = BootstrapPhase::Settling;
        }

        let due = match self.phase {
            BootstrapPhase::Settling => {
                elapsed >= self.bootstrap.timeout_ms && now_ms >= self.retry_at_ms
            }
            BootstrapPhase::Retrying => now_ms >= self.retry_at_ms,
            _ => false,
        };
        if !due {
            return;
        }

        if self.bootstrap.discovery_enabled {
            actions.push(ClimateAction::PublishDiscovery {
                topic: self.topics.discovery(&self.bootstrap.discovery_prefix),
                payload: DiscoveryPayload::build(
                    &self.device,
                    &self.topics,
                    &self.name,
                    self.current_temperature.as_ref(),
                ),
            });
        }
        actions.push(ClimateAction::PublishState(self.device.state_payload()));

        if !self.bootstrapped {
            info!("[bootstrap]: initial state ready: {}", self.device.summary());
        }
        self.phase = BootstrapPhase::Ready;
        self.bootstrapped = true;
    }

    fn observe_frame(&mut self, frame: &CommandFrame, actions: &mut Vec<ClimateAction>) {
        self.tracker.reset();

        match self.device.apply_external_observation(frame) {
            Ok(()) => {
                self.stats.frames_observed += 1;
                info!("[ir]: received {}", self.device.summary());
                actions.push(ClimateAction::PublishState(self.device.state_payload()));
            }
            Err(err) => {
                self.stats.frames_rejected += 1;
                warn!("[ir]: ignoring frame: {err}");
            }
        }
    }

    fn feed_power(&mut self, now_ms: u64, actions: &mut Vec<ClimateAction>) {
        let Some(sample) = self.latest_power else {
            return;
        };

        if !self.tracker.is_initialized() {
            self.tracker.initialize(sample, now_ms);
            debug!("[power_tracker]: initialized with {sample:.2}W");
        }

        if let Some(stable) = self.tracker.set_power(sample, now_ms) {
            self.reconcile_power(stable.watts, actions);
        }
    }

    fn reconcile_power(&mut self, watts: f32, actions: &mut Vec<ClimateAction>) {
        let sensor_on = self.tracker.power_on();
        if sensor_on == self.device.power_on_state() {
            return;
        }

        warn!(
            "[power_tracker]: unit is {} at {watts:.2}W, correcting state",
            if sensor_on { "on" } else { "off" }
        );
        self.device.set_power_state(sensor_on);
        self.stats.power_corrections += 1;
        actions.push(ClimateAction::PublishState(self.device.state_payload()));
    }
}
