use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{FrameError, RestoreError},
    payload::{SnapshotPayload, StateAttributes, StatePayload},
    protocol::{
        AcProtocol, BoostTemperature, CommandFrame, ModeConstraints, PowerControl,
        PowerObservation,
    },
    types::{FanLevel, Mode, ProtocolKind, SwingMode},
};

const DEFAULT_TEMPERATURE: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostSnapshot {
    pub temperature: f32,
    pub fan: FanLevel,
    pub swing: SwingMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub power_on: bool,
    /// One-shot toggle request for variants whose frames carry a power
    /// toggle instead of a level. Cleared once a frame has been sent.
    pub power_toggle: bool,
    pub mode: Mode,
    pub fan: FanLevel,
    pub temperature: f32,
    pub swing: SwingMode,
    pub boost: bool,
    pub eco: bool,
    pub health: bool,
    pub light: bool,
    pub sleep: bool,
    pub previous_fan: FanLevel,
    pub saved_snapshot: Option<BoostSnapshot>,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |value: bool| if value { "on" } else { "off" };
        write!(
            f,
            "power: {}, mode: {}, temp: {}C, fan: {}, swing: {}, boost: {}, eco: {}, health: {}, light: {}, sleep: {}",
            on_off(self.power_on),
            self.mode,
            self.temperature,
            self.fan,
            self.swing,
            on_off(self.boost),
            on_off(self.eco),
            on_off(self.health),
            on_off(self.light),
            on_off(self.sleep),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClimateDevice {
    protocol: &'static dyn AcProtocol,
    state: DeviceState,
    constraints: ModeConstraints,
}

impl ClimateDevice {
    pub fn new(kind: ProtocolKind) -> Self {
        let protocol = kind.protocol();
        let range = protocol.temperature_range();
        let state = DeviceState {
            power_on: false,
            power_toggle: false,
            mode: Mode::Cool,
            fan: FanLevel::Medium,
            temperature: range.snap(DEFAULT_TEMPERATURE.clamp(range.min, range.max)),
            swing: SwingMode::Off,
            boost: false,
            eco: false,
            health: false,
            light: false,
            sleep: false,
            previous_fan: FanLevel::Medium,
            saved_snapshot: None,
        };
        Self::with_state(kind, state)
    }

    pub fn with_state(kind: ProtocolKind, state: DeviceState) -> Self {
        let protocol = kind.protocol();
        let mut device = Self {
            protocol,
            constraints: protocol.constraints(state.mode),
            state,
        };
        device.apply_constraints();
        device
    }

    pub fn protocol(&self) -> &'static dyn AcProtocol {
        self.protocol
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn constraints(&self) -> &ModeConstraints {
        &self.constraints
    }

    pub fn summary(&self) -> String {
        self.state.to_string()
    }

    pub fn power_on_state(&self) -> bool {
        self.state.power_on
    }

    pub fn hvac_mode(&self) -> Mode {
        if self.state.power_on {
            self.state.mode
        } else {
            Mode::Off
        }
    }

    pub fn is_fan_supported(&self, fan: FanLevel) -> bool {
        self.protocol
            .fan_supported(self.state.mode, fan, &self.constraints)
    }

    pub fn supported_fan_levels(&self) -> Vec<FanLevel> {
        self.protocol
            .fan_levels()
            .iter()
            .copied()
            .filter(|fan| self.is_fan_supported(*fan))
            .collect()
    }

    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if !mode.is_operating() || self.protocol.mode_code(mode).is_none() {
            debug!("[set_mode]: {mode} is not an operating mode");
            return false;
        }

        if self.state.boost {
            self.deactivate_boost();
        }

        self.state.mode = mode;
        self.apply_constraints();
        true
    }

    /// Mode as seen by the control surface: `off` powers the unit down and
    /// keeps the configured mode, anything else selects it and powers on.
    pub fn set_hvac_mode(&mut self, mode: Mode) -> bool {
        match mode {
            Mode::Off => self.set_power(false),
            Mode::Undefined => false,
            mode => {
                if mode != self.state.mode && !self.set_mode(mode) {
                    return false;
                }
                self.set_power(true)
            }
        }
    }

    pub fn set_power(&mut self, on: bool) -> bool {
        if self.state.power_on == on {
            return true;
        }

        if self.protocol.power_control() == PowerControl::Toggle {
            self.state.power_toggle = !self.state.power_toggle;
            debug!(
                "[set_power]: toggle armed: {}, power {} -> {}",
                self.state.power_toggle, self.state.power_on, on
            );
        }
        self.state.power_on = on;
        true
    }

    /// Corrects the believed on/off level without asking the unit to change.
    pub fn set_power_state(&mut self, on: bool) {
        self.state.power_on = on;
    }

    pub fn set_temperature(&mut self, temperature: f32) -> bool {
        let range = self.protocol.temperature_range();
        if !range.contains(temperature) {
            debug!(
                "[set_temperature]: {temperature} outside [{}, {}]",
                range.min, range.max
            );
            return false;
        }

        if !self.constraints.temperature_settable {
            debug!("[set_temperature]: not settable in mode {}", self.state.mode);
            return false;
        }

        let temperature = range.snap(temperature);
        if self.state.boost
            && temperature != self.state.temperature
            && matches!(self.state.mode, Mode::Cool | Mode::Heat)
        {
            self.deactivate_boost();
        }

        self.state.temperature = temperature;
        true
    }

    pub fn set_fan(&mut self, fan: FanLevel) -> bool {
        if !self.is_fan_supported(fan) {
            debug!(
                "[set_fan]: fan mode {fan} not supported for mode {} (allowed: {:?})",
                self.state.mode,
                self.supported_fan_levels()
            );
            return false;
        }

        if self.protocol.boost_fan_level() == Some(fan) {
            return self.set_boost(true);
        }

        if self.state.boost
            && fan != self.state.fan
            && matches!(
                self.state.mode,
                Mode::Cool | Mode::Heat | Mode::Fan | Mode::Dry
            )
        {
            self.deactivate_boost();
        }

        self.state.fan = fan;
        if !fan.is_exclusive() {
            self.state.previous_fan = fan;
        }
        true
    }

    pub fn set_swing(&mut self, swing: SwingMode) -> bool {
        if !self.constraints.swing {
            return false;
        }
        self.state.swing = swing;
        true
    }

    pub fn set_boost(&mut self, on: bool) -> bool {
        if self.state.boost == on {
            return true;
        }

        if !on {
            self.deactivate_boost();
            return true;
        }

        if !self.constraints.boost {
            debug!("[set_boost]: boost not allowed in mode {}", self.state.mode);
            return false;
        }

        let Some(profile) = self.protocol.boost_profile(self.state.mode) else {
            return false;
        };

        self.state.eco = false;

        if self.state.saved_snapshot.is_none() {
            self.state.saved_snapshot = Some(BoostSnapshot {
                temperature: self.state.temperature,
                fan: self.state.fan,
                swing: self.state.swing,
            });
        }

        let range = self.protocol.temperature_range();
        match profile.temperature {
            BoostTemperature::Keep => {}
            BoostTemperature::Min => self.state.temperature = range.min,
            BoostTemperature::Max => self.state.temperature = range.max,
        }
        self.state.fan = profile.fan;
        self.state.swing = profile.swing;
        self.state.boost = true;
        true
    }

    pub fn set_eco(&mut self, on: bool) -> bool {
        if !self.constraints.eco {
            return false;
        }
        if self.state.eco == on {
            return true;
        }
        if on && self.state.boost {
            self.deactivate_boost();
        }
        self.state.eco = on;
        true
    }

    pub fn set_health(&mut self, on: bool) -> bool {
        if !self.constraints.health {
            return false;
        }
        self.state.health = on;
        true
    }

    pub fn set_light(&mut self, on: bool) -> bool {
        if !self.constraints.light {
            return false;
        }
        self.state.light = on;
        true
    }

    pub fn set_sleep(&mut self, on: bool) -> bool {
        if !self.constraints.sleep {
            return false;
        }
        self.state.sleep = on;
        true
    }

    /// Absorbs a frame sent by some other remote. The frame replaces the
    /// believed state wholesale, then the mode's constraints are re-applied.
    pub fn apply_external_observation(&mut self, frame: &CommandFrame) -> Result<(), FrameError> {
        let observation = self.protocol.decode(frame)?;

        match observation.power {
            PowerObservation::Toggled => self.state.power_on = !self.state.power_on,
            PowerObservation::Unchanged => {}
            PowerObservation::Level(on) => self.state.power_on = on,
        }
        self.state.power_toggle = false;

        let range = self.protocol.temperature_range();
        self.state.mode = observation.mode;
        self.state.fan = observation.fan;
        if range.contains(observation.temperature) {
            self.state.temperature = range.snap(observation.temperature);
        }
        self.state.swing = observation.swing;
        self.state.eco = observation.eco;
        self.state.health = observation.health;
        self.state.light = observation.light;
        self.state.sleep = observation.sleep;

        // The decoded fields already carry whatever boost did to them, so a
        // boost the mode can't hold is dropped rather than unwound.
        let boost = observation.boost && self.protocol.constraints(observation.mode).boost;
        if !boost {
            self.state.saved_snapshot = None;
        }
        self.state.boost = boost;

        self.apply_constraints();

        if !self.state.boost && !self.state.fan.is_exclusive() {
            self.state.previous_fan = self.state.fan;
        }
        Ok(())
    }

    pub fn restore(&mut self, payload: &StatePayload) -> Result<(), RestoreError> {
        let attrs = &payload.attrs;
        let mode = if payload.hvac_mode.is_operating() {
            payload.hvac_mode
        } else {
            attrs.mode
        };
        if !mode.is_operating() {
            return Err(RestoreError::NoOperatingMode);
        }

        self.state.boost = false;
        self.state.saved_snapshot = None;
        self.state.mode = mode;
        self.apply_constraints();

        self.state.power_on = payload.hvac_mode.is_operating();
        self.state.power_toggle = false;

        let boost_fan = self.protocol.boost_fan_level() == Some(payload.fan_mode);
        if self.is_fan_supported(payload.fan_mode) && (attrs.boost || !boost_fan) {
            self.state.fan = payload.fan_mode;
        }
        self.state.previous_fan = match attrs.prev_fan_mode {
            Some(fan) if !fan.is_exclusive() && fan != FanLevel::Undefined => fan,
            _ => FanLevel::Medium,
        };
        if self.constraints.swing {
            self.state.swing = payload.swing_mode;
        }

        let range = self.protocol.temperature_range();
        if range.contains(payload.temperature) {
            self.state.temperature = range.snap(payload.temperature);
        }

        self.state.eco = attrs.eco && self.constraints.eco;
        self.state.health = attrs.health && self.constraints.health;
        self.state.light = attrs.light && self.constraints.light;
        self.state.sleep = attrs.sleep && self.constraints.sleep;

        if attrs.boost && self.constraints.boost {
            self.state.boost = true;
            self.state.eco = false;
            self.state.saved_snapshot = attrs.boost_snapshot.map(|snapshot| BoostSnapshot {
                temperature: snapshot.temperature,
                fan: snapshot.fan_mode,
                swing: snapshot.swing_mode,
            });
        }

        self.remap_fan();
        Ok(())
    }

    pub fn command_frame(&self) -> CommandFrame {
        self.protocol.encode(&self.state)
    }

    pub fn mark_transmitted(&mut self) {
        self.state.power_toggle = false;
    }

    pub fn state_payload(&self) -> StatePayload {
        StatePayload {
            hvac_mode: self.hvac_mode(),
            fan_mode: self.state.fan,
            temperature: self.state.temperature,
            swing_mode: self.state.swing,
            attrs: StateAttributes {
                boost: self.state.boost,
                eco: self.state.eco,
                health: self.state.health,
                light: self.state.light,
                sleep: self.state.sleep,
                mode: self.state.mode,
                prev_fan_mode: Some(self.state.previous_fan),
                set_temp_allowed: self.constraints.temperature_settable,
                sleep_allowed: self.constraints.sleep,
                boost_allowed: self.constraints.boost,
                fan_modes_allowed: self.supported_fan_levels(),
                boost_snapshot: self.state.saved_snapshot.map(|snapshot| SnapshotPayload {
                    temperature: snapshot.temperature,
                    fan_mode: snapshot.fan,
                    swing_mode: snapshot.swing,
                }),
            },
        }
    }

    fn apply_constraints(&mut self) {
        let constraints = self.protocol.constraints(self.state.mode);
        self.constraints = constraints;

        debug!(
            "[set_constraints]: mode: {}, boost: {}, quiet: {}, eco: {}, health: {}, light: {}, sleep: {}, set_temp: {}",
            self.state.mode,
            constraints.boost,
            constraints.quiet,
            constraints.eco,
            constraints.health,
            constraints.light,
            constraints.sleep,
            constraints.temperature_settable,
        );

        if self.state.boost && !constraints.boost {
            warn!("[set_constraints]: forcing boost off in mode {}", self.state.mode);
            self.deactivate_boost();
        }
        if self.state.eco && !constraints.eco {
            warn!("[set_constraints]: forcing eco off in mode {}", self.state.mode);
            self.state.eco = false;
        }
        if self.state.health && !constraints.health {
            self.state.health = false;
        }
        if self.state.light && !constraints.light {
            self.state.light = false;
        }
        if self.state.sleep && !constraints.sleep {
            self.state.sleep = false;
        }
        if self.state.swing.is_on() && !constraints.swing {
            self.state.swing = SwingMode::Off;
        }

        self.remap_fan();
    }

    fn remap_fan(&mut self) {
        if self.is_fan_supported(self.state.fan) {
            return;
        }

        let fallback = if self.is_fan_supported(self.state.previous_fan) {
            self.state.previous_fan
        } else {
            self.constraints.default_fan
        };
        debug!(
            "[remap_fan]: {} not allowed in mode {}, using {fallback}",
            self.state.fan, self.state.mode
        );
        self.state.fan = fallback;
    }

    fn deactivate_boost(&mut self) {
        self.state.boost = false;

        match self.state.saved_snapshot.take() {
            Some(snapshot) => {
                self.state.temperature = snapshot.temperature;
                self.state.fan = snapshot.fan;
                self.state.swing = snapshot.swing;
                debug!(
                    "[apply_state]: restored temp: {}, fan: {}, swing: {}",
                    snapshot.temperature, snapshot.fan, snapshot.swing
                );
            }
            None => {
                if self.protocol.boost_fan_level() == Some(self.state.fan) {
                    self.state.fan = self.state.previous_fan;
                }
            }
        }

        self.remap_fan();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const KINDS: [ProtocolKind; 2] = [ProtocolKind::Daikin64, ProtocolKind::Tcl112];
    const OPERATING: [Mode; 5] = [Mode::Heat, Mode::Dry, Mode::Cool, Mode::Fan, Mode::Auto];

    fn powered(kind: ProtocolKind, mode: Mode) -> ClimateDevice {
        let mut device = ClimateDevice::new(kind);
        assert!(device.set_hvac_mode(mode));
        device
    }

    fn enable_everything(device: &mut ClimateDevice) {
        device.set_eco(true);
        device.set_health(true);
        device.set_light(true);
        device.set_sleep(true);
        device.set_boost(true);
    }

    fn assert_legal(device: &ClimateDevice) {
        let state = device.state();
        let constraints = device.constraints();
        assert!(!state.boost || constraints.boost, "boost in {}", state.mode);
        assert!(!state.eco || constraints.eco, "eco in {}", state.mode);
        assert!(!state.health || constraints.health, "health in {}", state.mode);
        assert!(!state.light || constraints.light, "light in {}", state.mode);
        assert!(!state.sleep || constraints.sleep, "sleep in {}", state.mode);
        assert!(device.is_fan_supported(state.fan), "fan {} in {}", state.fan, state.mode);
        assert!(state.boost || state.saved_snapshot.is_none());
    }

    #[test]
    fn mode_change_leaves_only_legal_features() {
        for kind in KINDS {
            for from in OPERATING {
                for to in OPERATING {
                    let mut device = powered(kind, from);
                    enable_everything(&mut device);
                    assert!(device.set_mode(to));
                    assert_legal(&device);
                }
            }
        }
    }

    #[test]
    fn dry_mode_disables_boost_and_eco() {
        for kind in KINDS {
            let mut device = powered(kind, Mode::Cool);
            device.set_boost(true);
            assert!(device.set_mode(Mode::Dry));

            assert!(!device.state().boost);
            assert!(!device.state().eco);
            assert!(!device.set_boost(true));
            assert!(!device.state().boost);
        }
    }

    #[test]
    fn boost_twice_matches_boost_once() {
        for kind in KINDS {
            let mut once = powered(kind, Mode::Cool);
            once.set_fan(FanLevel::Low);
            let mut twice = once.clone();

            assert!(once.set_boost(true));
            assert!(twice.set_boost(true));
            assert!(twice.set_boost(true));

            assert_eq!(once.state(), twice.state());
        }
    }

    #[test]
    fn boost_round_trip_restores_configuration() {
        for kind in KINDS {
            for mode in OPERATING {
                let mut device = powered(kind, mode);
                if !device.constraints().boost {
                    continue;
                }
                let fan = if mode == Mode::Fan {
                    FanLevel::Low
                } else {
                    FanLevel::Auto
                };
                assert!(device.set_fan(fan));
                device.set_swing(SwingMode::Off);
                let before = device.state().clone();

                assert!(device.set_boost(true));
                assert!(device.set_boost(false));

                let after = device.state();
                assert_eq!(after.temperature, before.temperature, "{kind} {mode}");
                assert_eq!(after.fan, before.fan, "{kind} {mode}");
                assert_eq!(after.swing, before.swing, "{kind} {mode}");
                assert_eq!(after.saved_snapshot, None);
                assert!(!after.boost);
            }
        }
    }

    #[test]
    fn cool_boost_scenario() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        assert!(device.set_fan(FanLevel::Low));
        assert!(device.set_swing(SwingMode::Off));
        assert!(device.set_temperature(24.5));

        assert!(device.set_boost(true));
        let state = device.state();
        assert_eq!(state.mode, Mode::Cool);
        assert_eq!(state.fan, FanLevel::High);
        assert_eq!(state.swing, SwingMode::Horizontal);
        assert_eq!(state.temperature, 16.0);
        assert_eq!(
            state.saved_snapshot,
            Some(BoostSnapshot {
                temperature: 24.5,
                fan: FanLevel::Low,
                swing: SwingMode::Off,
            })
        );

        assert!(device.set_boost(false));
        let state = device.state();
        assert_eq!(state.fan, FanLevel::Low);
        assert_eq!(state.swing, SwingMode::Off);
        assert_eq!(state.temperature, 24.5);
        assert_eq!(state.saved_snapshot, None);
    }

    #[test]
    fn daikin_boost_uses_turbo_fan() {
        let mut device = powered(ProtocolKind::Daikin64, Mode::Cool);
        device.set_fan(FanLevel::Low);

        assert!(device.set_fan(FanLevel::Boost));
        assert!(device.state().boost);
        assert_eq!(device.state().fan, FanLevel::Boost);
        assert_eq!(device.state().temperature, 16.0);
        assert_eq!(device.state().previous_fan, FanLevel::Low);

        let frame = device.command_frame();
        assert_eq!(frame.fan_code, 3);
        assert!(frame.turbo);
    }

    #[test]
    fn temperature_bounds() {
        for kind in KINDS {
            let mut device = powered(kind, Mode::Cool);
            let range = kind.protocol().temperature_range();
            let before = device.state().temperature;

            assert!(!device.set_temperature(range.min - range.step));
            assert!(!device.set_temperature(range.max + range.step));
            assert!(!device.set_temperature(f32::NAN));
            assert_eq!(device.state().temperature, before);

            assert!(device.set_temperature(range.min));
            assert_eq!(device.state().temperature, range.min);
            assert!(device.set_temperature(range.max));
            assert_eq!(device.state().temperature, range.max);
        }
    }

    #[test]
    fn temperature_locked_where_mode_controls_it() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Auto);
        let before = device.state().temperature;
        assert!(!device.set_temperature(20.0));
        assert_eq!(device.state().temperature, before);
    }

    #[test]
    fn manual_fan_cancels_boost() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        device.set_fan(FanLevel::Low);
        device.set_temperature(25.0);
        device.set_boost(true);

        assert!(device.set_fan(FanLevel::Medium));
        let state = device.state();
        assert!(!state.boost);
        assert_eq!(state.fan, FanLevel::Medium);
        assert_eq!(state.temperature, 25.0);
        assert_eq!(state.swing, SwingMode::Off);
        assert_eq!(state.previous_fan, FanLevel::Medium);
    }

    #[test]
    fn manual_temperature_cancels_boost_in_cool_and_heat() {
        for mode in [Mode::Cool, Mode::Heat] {
            let mut device = powered(ProtocolKind::Tcl112, mode);
            device.set_fan(FanLevel::Low);
            device.set_boost(true);

            assert!(device.set_temperature(22.0));
            let state = device.state();
            assert!(!state.boost);
            assert_eq!(state.temperature, 22.0);
            assert_eq!(state.fan, FanLevel::Low);
        }
    }

    #[test]
    fn eco_and_boost_are_mutually_exclusive() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        assert!(device.set_eco(true));
        assert!(device.set_boost(true));
        assert!(!device.state().eco);

        assert!(device.set_eco(true));
        assert!(device.state().eco);
        assert!(!device.state().boost);
        assert_eq!(device.state().saved_snapshot, None);
    }

    #[test]
    fn mode_change_unwinds_boost_before_switching() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        device.set_fan(FanLevel::Low);
        device.set_temperature(26.0);
        device.set_boost(true);

        assert!(device.set_mode(Mode::Heat));
        let state = device.state();
        assert!(!state.boost);
        assert_eq!(state.temperature, 26.0);
        assert_eq!(state.fan, FanLevel::Low);
        assert_eq!(state.swing, SwingMode::Off);
    }

    #[test]
    fn illegal_fan_remaps_to_previous_then_default() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        device.set_fan(FanLevel::High);

        assert!(device.set_mode(Mode::Dry));
        assert_eq!(device.state().fan, FanLevel::Auto);

        assert!(device.set_mode(Mode::Cool));
        assert_eq!(device.state().fan, FanLevel::Auto);

        let mut device = powered(ProtocolKind::Daikin64, Mode::Cool);
        device.set_fan(FanLevel::Low);
        device.set_fan(FanLevel::Quiet);
        assert!(device.set_mode(Mode::Auto));
        assert_eq!(device.state().fan, FanLevel::Low);
    }

    #[test]
    fn rejected_fan_reports_and_keeps_state() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Dry);
        let before = device.state().clone();
        assert!(!device.set_fan(FanLevel::High));
        assert!(!device.set_fan(FanLevel::Undefined));
        assert_eq!(device.state(), &before);
        assert_eq!(device.supported_fan_levels(), vec![FanLevel::Auto]);
    }

    #[test]
    fn gated_features_report_failure() {
        let mut device = powered(ProtocolKind::Daikin64, Mode::Fan);
        assert!(!device.set_sleep(true));
        assert!(!device.set_eco(true));
        assert!(!device.set_health(true));
        assert!(!device.set_light(true));
        assert!(!device.state().sleep);

        let mut device = powered(ProtocolKind::Tcl112, Mode::Fan);
        assert!(device.set_light(true));
        assert!(device.set_health(true));
        assert!(!device.set_sleep(true));
    }

    #[test]
    fn power_off_keeps_configuration() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Heat);
        device.set_fan(FanLevel::Low);
        device.set_temperature(27.5);

        assert!(device.set_hvac_mode(Mode::Off));
        assert_eq!(device.hvac_mode(), Mode::Off);
        assert_eq!(device.state().mode, Mode::Heat);
        assert_eq!(device.state().fan, FanLevel::Low);

        assert!(device.set_power(true));
        assert_eq!(device.hvac_mode(), Mode::Heat);
        assert_eq!(device.state().temperature, 27.5);
    }

    #[test]
    fn toggle_power_protocol_arms_one_shot_bit() {
        let mut device = ClimateDevice::new(ProtocolKind::Daikin64);
        assert!(device.set_power(true));
        assert!(device.state().power_on);
        assert!(device.command_frame().power);

        device.mark_transmitted();
        assert!(!device.command_frame().power);

        // already on: nothing to toggle
        assert!(device.set_power(true));
        assert!(!device.command_frame().power);
    }

    #[test]
    fn absolute_power_protocol_encodes_level() {
        let mut device = ClimateDevice::new(ProtocolKind::Tcl112);
        assert!(!device.command_frame().power);
        device.set_power(true);
        device.mark_transmitted();
        assert!(device.command_frame().power);
    }

    #[test]
    fn observation_overwrites_state_and_reapplies_constraints() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        device.set_eco(true);

        let mut frame = device.command_frame();
        frame.mode_code = 2; // dry
        frame.fan_code = 5; // high, illegal in dry
        frame.eco = true;
        frame.light = true;
        frame.temperature = 20.0;

        device.apply_external_observation(&frame).unwrap();
        let state = device.state();
        assert_eq!(state.mode, Mode::Dry);
        assert_eq!(state.fan, FanLevel::Auto);
        assert!(!state.eco);
        assert!(state.light);
        assert_eq!(state.temperature, 20.0);
        assert_legal(&device);
    }

    #[test]
    fn observation_preserves_boost_flag() {
        let mut device = powered(ProtocolKind::Tcl112, Mode::Cool);
        let mut frame = device.command_frame();
        frame.turbo = true;
        frame.fan_code = 5;
        frame.temperature = 16.0;

        device.apply_external_observation(&frame).unwrap();
        assert!(device.state().boost);
        assert_eq!(device.state().fan, FanLevel::High);

        // no snapshot to restore: leaving boost keeps the observed values
        assert!(device.set_boost(false));
        assert_eq!(device.state().temperature, 16.0);
    }

    #[test]
    fn observation_toggle_bit_flips_power() {
        let mut device = ClimateDevice::new(ProtocolKind::Daikin64);
        let mut frame = device.command_frame();
        frame.power = true;

        device.apply_external_observation(&frame).unwrap();
        assert!(device.power_on_state());
        device.apply_external_observation(&frame).unwrap();
        assert!(!device.power_on_state());

        frame.power = false;
        device.apply_external_observation(&frame).unwrap();
        assert!(!device.power_on_state());
    }

    #[test]
    fn malformed_observation_changes_nothing() {
        let mut device = powered(ProtocolKind::Daikin64, Mode::Heat);
        let before = device.state().clone();
        let mut frame = device.command_frame();
        frame.mode_code = 99;

        assert_eq!(
            device.apply_external_observation(&frame),
            Err(FrameError::UnknownModeCode(99))
        );
        assert_eq!(device.state(), &before);
    }

    #[test]
    fn restores_from_published_payload() {
        let mut source = powered(ProtocolKind::Tcl112, Mode::Heat);
        source.set_fan(FanLevel::Low);
        source.set_temperature(23.5);
        source.set_light(true);
        source.set_boost(true);
        let payload = source.state_payload();

        let mut restored = ClimateDevice::new(ProtocolKind::Tcl112);
        restored.restore(&payload).unwrap();
        assert_eq!(restored.state(), source.state());

        assert!(restored.set_boost(false));
        assert_eq!(restored.state().temperature, 23.5);
        assert_eq!(restored.state().fan, FanLevel::Low);
    }

    #[test]
    fn restore_ignores_turbo_fan_without_boost() {
        let source = powered(ProtocolKind::Daikin64, Mode::Cool);
        let mut payload = source.state_payload();
        payload.fan_mode = FanLevel::Boost;
        payload.attrs.boost = false;

        let mut restored = ClimateDevice::new(ProtocolKind::Daikin64);
        restored.restore(&payload).unwrap();
        assert!(!restored.state().boost);
        assert_ne!(restored.state().fan, FanLevel::Boost);
        assert_eq!(restored.state().fan, source.state().fan);
    }

    #[test]
    fn restores_powered_off_unit_with_its_mode() {
        let mut source = powered(ProtocolKind::Daikin64, Mode::Heat);
        source.set_fan(FanLevel::High);
        source.set_hvac_mode(Mode::Off);
        source.mark_transmitted();

        let mut restored = ClimateDevice::new(ProtocolKind::Daikin64);
        restored.restore(&source.state_payload()).unwrap();
        assert_eq!(restored.hvac_mode(), Mode::Off);
        assert_eq!(restored.state().mode, Mode::Heat);
        assert_eq!(restored.state().fan, FanLevel::High);
    }

    #[test]
    fn restore_without_any_mode_is_rejected() {
        let mut payload = ClimateDevice::new(ProtocolKind::Tcl112).state_payload();
        payload.attrs.mode = Mode::Undefined;
        let mut device = powered(ProtocolKind::Tcl112, Mode::Heat);
        let before = device.state().clone();

        assert!(matches!(
            device.restore(&payload),
            Err(RestoreError::NoOperatingMode)
        ));
        assert_eq!(device.state(), &before);
    }
}
