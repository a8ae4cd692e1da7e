use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Off,
    Heat,
    Dry,
    Cool,
    #[serde(rename = "fan_only")]
    Fan,
    Auto,
    Undefined,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Dry => "dry",
            Self::Cool => "cool",
            Self::Fan => "fan_only",
            Self::Auto => "auto",
            Self::Undefined => "undefined",
        }
    }

    /// True for the modes the unit can actually run in.
    pub fn is_operating(self) -> bool {
        !matches!(self, Self::Off | Self::Undefined)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "heat" => Ok(Self::Heat),
            "dry" => Ok(Self::Dry),
            "cool" => Ok(Self::Cool),
            "fan_only" | "fan" => Ok(Self::Fan),
            "auto" => Ok(Self::Auto),
            _ => Err(CommandError::UnknownMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanLevel {
    Auto,
    Low,
    Medium,
    High,
    #[serde(rename = "turbo", alias = "boost")]
    Boost,
    Quiet,
    Undefined,
}

impl FanLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Boost => "turbo",
            Self::Quiet => "quiet",
            Self::Undefined => "undefined",
        }
    }

    /// Boost and quiet override the user's fan selection; every other level
    /// is remembered as the fan to come back to.
    pub fn is_exclusive(self) -> bool {
        matches!(self, Self::Boost | Self::Quiet)
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanLevel {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "turbo" | "boost" => Ok(Self::Boost),
            "quiet" => Ok(Self::Quiet),
            _ => Err(CommandError::UnknownFan(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingMode {
    Off,
    Horizontal,
}

impl SwingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Horizontal => "horizontal",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::Horizontal
    }

    pub fn from_bit(on: bool) -> Self {
        if on {
            Self::Horizontal
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for SwingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwingMode {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "horizontal" => Ok(Self::Horizontal),
            _ => Err(CommandError::UnknownSwing(value.to_string())),
        }
    }
}

/// Parses an on/off style command payload.
pub fn parse_toggle(value: &str) -> Result<bool, CommandError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(CommandError::InvalidToggle(value.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Daikin64,
    Tcl112,
}

impl ProtocolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daikin64 => "daikin64",
            Self::Tcl112 => "tcl112",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One settable dimension of the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Mode,
    Temperature,
    Fan,
    Swing,
    Boost,
    Eco,
    Health,
    Light,
    Sleep,
}

impl CommandKind {
    pub const ALL: [CommandKind; 9] = [
        Self::Mode,
        Self::Temperature,
        Self::Fan,
        Self::Swing,
        Self::Boost,
        Self::Eco,
        Self::Health,
        Self::Light,
        Self::Sleep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::Temperature => "temperature",
            Self::Fan => "fan",
            Self::Swing => "swing",
            Self::Boost => "boost",
            Self::Eco => "eco",
            Self::Health => "health",
            Self::Light => "light",
            Self::Sleep => "sleep",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| CommandError::UnknownCommand(value.to_string()))
    }
}
