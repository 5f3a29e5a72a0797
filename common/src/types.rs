use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("payload is not valid utf-8 or not a number")]
    Malformed,
    #[error("unrecognized value {0:?}")]
    Unrecognized(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Off,
    FanOnly,
    Heat,
    Cool,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::FanOnly => "FAN_ONLY",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        match text.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "FAN_ONLY" => Ok(Self::FanOnly),
            "HEAT" => Ok(Self::Heat),
            "COOL" => Ok(Self::Cool),
            other => Err(ParseError::Unrecognized(other.to_string())),
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Off => 1,
            Self::FanOnly => 2,
            Self::Heat => 4,
            Self::Cool => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FanSpeed {
    Auto,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        match text.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(ParseError::Unrecognized(other.to_string())),
        }
    }

    /// Next louder speed, saturating at HIGH.
    pub fn step_up(self) -> Option<Self> {
        match self {
            Self::Auto | Self::Low => Some(Self::Medium),
            Self::Medium => Some(Self::High),
            Self::High => None,
        }
    }

    /// Next quieter speed, saturating at AUTO. LOW has no quieter neighbor.
    pub fn step_down(self) -> Option<Self> {
        match self {
            Self::High => Some(Self::Medium),
            Self::Medium => Some(Self::Auto),
            Self::Auto | Self::Low => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trend {
    WarmingUp,
    #[default]
    Stable,
    CoolingDown,
}

pub const ALL_MODES: [Mode; 4] = [Mode::Off, Mode::FanOnly, Mode::Heat, Mode::Cool];

/// Small set of Modes, used for pump arbitration.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ModeSet(u8);

impl ModeSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(1 | 2 | 4 | 8);

    pub fn only(mode: Mode) -> Self {
        Self(mode.bit())
    }

    pub fn with(self, mode: Mode) -> Self {
        Self(self.0 | mode.bit())
    }

    pub fn contains(self, mode: Mode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for ModeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(ALL_MODES.iter().filter(|mode| self.contains(**mode)))
            .finish()
    }
}

/// Wire schema of ambient sensor reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensorPayload {
    pub temperature: f64,
}
