use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// HomeKit heating/cooling state, encoded by its characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeatingCoolingMode {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl HeatingCoolingMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Off),
            1 => Some(Self::Heat),
            2 => Some(Self::Cool),
            3 => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Heat => 1,
            Self::Cool => 2,
            Self::Auto => 3,
        }
    }

    /// Key of this mode in the `stateCommands` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }
}

impl fmt::Display for HeatingCoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HeatingCoolingMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayUnits {
    Celsius,
    #[default]
    Fahrenheit,
}

impl DisplayUnits {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Celsius),
            1 => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Self::Celsius => 0,
            Self::Fahrenheit => 1,
        }
    }
}

impl Serialize for DisplayUnits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index())
    }
}

impl<'de> Deserialize<'de> for DisplayUnits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let index = u8::deserialize(deserializer)?;
        Self::from_index(index)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid display units {index}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThermostatSnapshot {
    #[serde(rename = "currentHeatingCoolingState")]
    pub current_mode: HeatingCoolingMode,
    #[serde(rename = "targetHeatingCoolingState")]
    pub target_mode: HeatingCoolingMode,
    #[serde(rename = "currentTemperature")]
    pub current_temperature: f64,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: f64,
    #[serde(rename = "temperatureDisplayUnits")]
    pub display_units: DisplayUnits,
    #[serde(rename = "dispatchPending")]
    pub dispatch_pending: bool,
    #[serde(rename = "pendingCommand")]
    pub pending_command: Option<String>,
}
