use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    device::DeviceState,
    error::FrameError,
    types::{FanLevel, Mode, ProtocolKind, SwingMode},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl TemperatureRange {
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    pub fn snap(&self, value: f32) -> f32 {
        let steps = ((value - self.min) / self.step).round();
        (self.min + steps * self.step).clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerControl {
    /// The frame carries a "toggle power" bit; the unit's level is inferred.
    Toggle,
    /// The frame carries the absolute on/off level.
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeConstraints {
    pub boost: bool,
    pub quiet: bool,
    pub eco: bool,
    pub health: bool,
    pub light: bool,
    pub sleep: bool,
    pub swing: bool,
    pub temperature_settable: bool,
    pub default_fan: FanLevel,
}

impl ModeConstraints {
    pub const NONE: Self = Self {
        boost: false,
        quiet: false,
        eco: false,
        health: false,
        light: false,
        sleep: false,
        swing: false,
        temperature_settable: false,
        default_fan: FanLevel::Medium,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostTemperature {
    Keep,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoostProfile {
    pub temperature: BoostTemperature,
    pub fan: FanLevel,
    pub swing: SwingMode,
}

/// Full state as carried by one IR transmission. Vendor codes are kept raw so
/// the codec can place them without knowing the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub protocol: ProtocolKind,
    /// Power level on absolute variants, toggle request on toggle variants.
    pub power: bool,
    pub mode_code: u8,
    pub fan_code: u8,
    pub temperature: f32,
    #[serde(default)]
    pub swing: bool,
    #[serde(default)]
    pub turbo: bool,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub eco: bool,
    #[serde(default)]
    pub health: bool,
    #[serde(default)]
    pub light: bool,
    #[serde(default)]
    pub sleep: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerObservation {
    Toggled,
    Unchanged,
    Level(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub power: PowerObservation,
    pub mode: Mode,
    pub fan: FanLevel,
    pub temperature: f32,
    pub swing: SwingMode,
    pub boost: bool,
    pub eco: bool,
    pub health: bool,
    pub light: bool,
    pub sleep: bool,
}

pub trait AcProtocol: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProtocolKind;
    fn temperature_range(&self) -> TemperatureRange;
    fn modes(&self) -> &'static [Mode];
    fn fan_levels(&self) -> &'static [FanLevel];
    fn swing_modes(&self) -> &'static [SwingMode] {
        &[SwingMode::Off, SwingMode::Horizontal]
    }
    fn power_control(&self) -> PowerControl;
    fn constraints(&self, mode: Mode) -> ModeConstraints;
    fn boost_profile(&self, mode: Mode) -> Option<BoostProfile>;
    /// Fan level that stands for boost on variants where boost is a fan speed.
    fn boost_fan_level(&self) -> Option<FanLevel> {
        None
    }
    fn mode_code(&self, mode: Mode) -> Option<u8>;
    fn mode_from_code(&self, code: u8) -> Option<Mode>;
    fn fan_code(&self, fan: FanLevel) -> Option<u8>;
    fn fan_from_code(&self, code: u8) -> Option<FanLevel>;

    fn fan_supported(&self, mode: Mode, fan: FanLevel, constraints: &ModeConstraints) -> bool {
        common_fan_policy(self.fan_levels(), mode, fan, constraints)
    }

    fn encode(&self, state: &DeviceState) -> CommandFrame {
        let power = match self.power_control() {
            PowerControl::Toggle => state.power_toggle,
            PowerControl::Absolute => state.power_on,
        };
        let fan_code = self
            .fan_code(state.fan)
            .or_else(|| self.fan_code(FanLevel::Auto))
            .unwrap_or_default();

        CommandFrame {
            protocol: self.kind(),
            power,
            mode_code: self.mode_code(state.mode).unwrap_or_default(),
            fan_code,
            temperature: state.temperature,
            swing: state.swing.is_on(),
            turbo: state.boost,
            quiet: state.fan == FanLevel::Quiet,
            eco: state.eco,
            health: state.health,
            light: state.light,
            sleep: state.sleep,
        }
    }

    fn decode(&self, frame: &CommandFrame) -> Result<Observation, FrameError> {
        if frame.protocol != self.kind() {
            return Err(FrameError::ProtocolMismatch {
                expected: self.kind(),
                actual: frame.protocol,
            });
        }

        let mode = self
            .mode_from_code(frame.mode_code)
            .ok_or(FrameError::UnknownModeCode(frame.mode_code))?;
        let fan = self
            .fan_from_code(frame.fan_code)
            .ok_or(FrameError::UnknownFanCode(frame.fan_code))?;

        let power = match self.power_control() {
            PowerControl::Toggle if frame.power => PowerObservation::Toggled,
            PowerControl::Toggle => PowerObservation::Unchanged,
            PowerControl::Absolute => PowerObservation::Level(frame.power),
        };

        let boost = match self.boost_fan_level() {
            Some(level) => fan == level,
            None => frame.turbo,
        };

        Ok(Observation {
            power,
            mode,
            fan,
            temperature: frame.temperature,
            swing: SwingMode::from_bit(frame.swing),
            boost,
            eco: frame.eco,
            health: frame.health,
            light: frame.light,
            sleep: frame.sleep,
        })
    }
}

fn common_fan_policy(
    levels: &[FanLevel],
    mode: Mode,
    fan: FanLevel,
    constraints: &ModeConstraints,
) -> bool {
    if !levels.contains(&fan) {
        return false;
    }
    match fan {
        FanLevel::Boost => constraints.boost,
        FanLevel::Quiet => constraints.quiet,
        // fan-only mode has no automatic speed
        FanLevel::Auto => mode != Mode::Fan,
        FanLevel::Undefined => false,
        _ => true,
    }
}

const ADVERTISED_MODES: [Mode; 6] = [
    Mode::Off,
    Mode::Heat,
    Mode::Auto,
    Mode::Cool,
    Mode::Dry,
    Mode::Fan,
];

/// Daikin 64-bit remote: toggle power bit, turbo and quiet as fan speeds.
#[derive(Debug)]
pub struct Daikin64;

impl AcProtocol for Daikin64 {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Daikin64
    }

    fn temperature_range(&self) -> TemperatureRange {
        TemperatureRange {
            min: 16.0,
            max: 30.0,
            step: 1.0,
        }
    }

    fn modes(&self) -> &'static [Mode] {
        &ADVERTISED_MODES
    }

    fn fan_levels(&self) -> &'static [FanLevel] {
        &[
            FanLevel::Auto,
            FanLevel::Quiet,
            FanLevel::Low,
            FanLevel::Medium,
            FanLevel::High,
            FanLevel::Boost,
        ]
    }

    fn power_control(&self) -> PowerControl {
        PowerControl::Toggle
    }

    fn constraints(&self, mode: Mode) -> ModeConstraints {
        let (boost_quiet, sleep, temperature_settable) = match mode {
            Mode::Heat | Mode::Cool => (true, true, true),
            Mode::Dry => (false, false, true),
            Mode::Fan => (false, false, false),
            Mode::Auto => (false, true, true),
            Mode::Off | Mode::Undefined => return ModeConstraints::NONE,
        };
        ModeConstraints {
            boost: boost_quiet,
            quiet: boost_quiet,
            eco: false,
            health: false,
            light: false,
            sleep,
            swing: true,
            temperature_settable,
            default_fan: FanLevel::Medium,
        }
    }

    fn boost_profile(&self, mode: Mode) -> Option<BoostProfile> {
        let temperature = match mode {
            Mode::Cool => BoostTemperature::Min,
            Mode::Heat => BoostTemperature::Max,
            _ => return None,
        };
        Some(BoostProfile {
            temperature,
            fan: FanLevel::Boost,
            swing: SwingMode::Horizontal,
        })
    }

    fn boost_fan_level(&self) -> Option<FanLevel> {
        Some(FanLevel::Boost)
    }

    fn mode_code(&self, mode: Mode) -> Option<u8> {
        match mode {
            Mode::Dry => Some(1),
            Mode::Cool => Some(2),
            Mode::Fan => Some(4),
            Mode::Heat => Some(8),
            Mode::Auto => Some(10),
            Mode::Off | Mode::Undefined => None,
        }
    }

    fn mode_from_code(&self, code: u8) -> Option<Mode> {
        match code {
            1 => Some(Mode::Dry),
            2 => Some(Mode::Cool),
            4 => Some(Mode::Fan),
            8 => Some(Mode::Heat),
            10 => Some(Mode::Auto),
            _ => None,
        }
    }

    fn fan_code(&self, fan: FanLevel) -> Option<u8> {
        match fan {
            FanLevel::Auto => Some(1),
            FanLevel::High => Some(2),
            FanLevel::Boost => Some(3),
            FanLevel::Medium => Some(4),
            FanLevel::Low => Some(8),
            FanLevel::Quiet => Some(9),
            FanLevel::Undefined => None,
        }
    }

    fn fan_from_code(&self, code: u8) -> Option<FanLevel> {
        match code {
            1 => Some(FanLevel::Auto),
            2 => Some(FanLevel::High),
            3 => Some(FanLevel::Boost),
            4 => Some(FanLevel::Medium),
            8 => Some(FanLevel::Low),
            9 => Some(FanLevel::Quiet),
            _ => None,
        }
    }
}

/// TCL 112-bit remote (sold as Dahatsu): absolute power, separate turbo,
/// eco, health and light bits, half-degree steps.
#[derive(Debug)]
pub struct Tcl112;

impl AcProtocol for Tcl112 {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Tcl112
    }

    fn temperature_range(&self) -> TemperatureRange {
        TemperatureRange {
            min: 16.0,
            max: 31.0,
            step: 0.5,
        }
    }

    fn modes(&self) -> &'static [Mode] {
        &ADVERTISED_MODES
    }

    fn fan_levels(&self) -> &'static [FanLevel] {
        &[
            FanLevel::Auto,
            FanLevel::Low,
            FanLevel::Medium,
            FanLevel::High,
        ]
    }

    fn power_control(&self) -> PowerControl {
        PowerControl::Absolute
    }

    fn constraints(&self, mode: Mode) -> ModeConstraints {
        let (boost, eco, temperature_settable, default_fan) = match mode {
            Mode::Heat | Mode::Cool => (true, true, true, FanLevel::Medium),
            Mode::Dry => (false, false, false, FanLevel::Auto),
            Mode::Fan => (true, false, false, FanLevel::Medium),
            Mode::Auto => (false, false, false, FanLevel::Medium),
            Mode::Off | Mode::Undefined => return ModeConstraints::NONE,
        };
        ModeConstraints {
            boost,
            quiet: false,
            eco,
            health: true,
            light: true,
            sleep: false,
            swing: true,
            temperature_settable,
            default_fan,
        }
    }

    fn boost_profile(&self, mode: Mode) -> Option<BoostProfile> {
        let temperature = match mode {
            Mode::Cool => BoostTemperature::Min,
            Mode::Heat => BoostTemperature::Max,
            Mode::Fan => BoostTemperature::Keep,
            _ => return None,
        };
        Some(BoostProfile {
            temperature,
            fan: FanLevel::High,
            swing: SwingMode::Horizontal,
        })
    }

    fn fan_supported(&self, mode: Mode, fan: FanLevel, constraints: &ModeConstraints) -> bool {
        // dehumidifying runs on the automatic fan only
        if mode == Mode::Dry {
            return fan == FanLevel::Auto;
        }
        common_fan_policy(self.fan_levels(), mode, fan, constraints)
    }

    fn mode_code(&self, mode: Mode) -> Option<u8> {
        match mode {
            Mode::Heat => Some(1),
            Mode::Dry => Some(2),
            Mode::Cool => Some(3),
            Mode::Fan => Some(7),
            Mode::Auto => Some(8),
            Mode::Off | Mode::Undefined => None,
        }
    }

    fn mode_from_code(&self, code: u8) -> Option<Mode> {
        match code {
            1 => Some(Mode::Heat),
            2 => Some(Mode::Dry),
            3 => Some(Mode::Cool),
            7 => Some(Mode::Fan),
            8 => Some(Mode::Auto),
            _ => None,
        }
    }

    fn fan_code(&self, fan: FanLevel) -> Option<u8> {
        match fan {
            FanLevel::Auto => Some(0),
            FanLevel::Low => Some(2),
            FanLevel::Medium => Some(3),
            FanLevel::High => Some(5),
            _ => None,
        }
    }

    fn fan_from_code(&self, code: u8) -> Option<FanLevel> {
        match code {
            0 => Some(FanLevel::Auto),
            2 => Some(FanLevel::Low),
            3 => Some(FanLevel::Medium),
            5 => Some(FanLevel::High),
            _ => None,
        }
    }
}

static DAIKIN64: Daikin64 = Daikin64;
static TCL112: Tcl112 = Tcl112;

impl ProtocolKind {
    pub fn protocol(self) -> &'static dyn AcProtocol {
        match self {
            Self::Daikin64 => &DAIKIN64,
            Self::Tcl112 => &TCL112,
        }
    }
}
