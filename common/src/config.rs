use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{error::CommandError, types::HeatingCoolingMode};

pub const ACCESSORY_NAME: &str = "HomebridgeLircThermostat";
pub const MANUFACTURER: &str = "homebridge lirc thermostat";
pub const MODEL: &str = "RespberryPI LIRC Thermostat";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

const TEMPERATURE_PLACEHOLDER: &str = "{tempNum}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LircCommands {
    pub lircd: String,
    pub irrecord: String,
    pub irsend: String,
}

impl Default for LircCommands {
    fn default() -> Self {
        Self {
            lircd: "lircd".to_string(),
            irrecord: "irrecord".to_string(),
            irsend: "irsend".to_string(),
        }
    }
}

/// Connection parameters for the infrared daemon. Serialized as-is to the
/// config blob the transport persists before starting `lircd`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LircConfig {
    pub commands: LircCommands,
    pub lirc_driver: String,
    pub lirc_conf: String,
    pub lirc_pid: String,
    pub device: String,
    pub tmp_dir: String,
    pub remote: String,
}

impl Default for LircConfig {
    fn default() -> Self {
        Self {
            commands: LircCommands::default(),
            lirc_driver: "default".to_string(),
            lirc_conf: "/etc/lirc/lircd.conf".to_string(),
            lirc_pid: "/var/run/lirc/lircd.pid".to_string(),
            device: "/dev/lirc0".to_string(),
            tmp_dir: "/tmp".to_string(),
            remote: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemperatureCommands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(flatten)]
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    #[serde(rename = "stateCommands", default, skip_serializing_if = "Option::is_none")]
    pub state_commands: Option<HashMap<String, String>>,
    #[serde(rename = "heatTempsCommands", default, skip_serializing_if = "Option::is_none")]
    pub heat_temps_commands: Option<TemperatureCommands>,
    #[serde(rename = "coolTempsCommands", default, skip_serializing_if = "Option::is_none")]
    pub cool_temps_commands: Option<TemperatureCommands>,
    #[serde(rename = "autoTempsCommands", default, skip_serializing_if = "Option::is_none")]
    pub auto_temps_commands: Option<TemperatureCommands>,
}

impl CommandConfig {
    pub fn mode_command(&self, index: u8) -> Result<&str, CommandError> {
        let table = self
            .state_commands
            .as_ref()
            .ok_or(CommandError::StateCommandsMissing)?;

        HeatingCoolingMode::from_index(index)
            .and_then(|mode| table.get(mode.as_str()))
            .map(String::as_str)
            .filter(|command| !command.is_empty())
            .ok_or(CommandError::StateCommandNotFound(index))
    }

    pub fn temperature_table(&self, mode: HeatingCoolingMode) -> Option<&TemperatureCommands> {
        match mode {
            HeatingCoolingMode::Off => None,
            HeatingCoolingMode::Heat => self.heat_temps_commands.as_ref(),
            HeatingCoolingMode::Cool => self.cool_temps_commands.as_ref(),
            HeatingCoolingMode::Auto => self.auto_temps_commands.as_ref(),
        }
    }

    /// Resolves the command for `value` in `mode`. A template wins over an
    /// exact entry for the same value.
    pub fn temperature_command(
        &self,
        mode: HeatingCoolingMode,
        value: f64,
    ) -> Result<String, CommandError> {
        let table = self
            .temperature_table(mode)
            .ok_or(CommandError::TemperatureCommandsMissing(mode))?;

        if !value.is_finite() {
            return Err(CommandError::TemperatureCommandNotFound { mode, value: 0 });
        }
        let temp_num = value.trunc() as i64;

        let command = match table.template.as_deref().filter(|t| !t.is_empty()) {
            Some(template) => template.replacen(TEMPERATURE_PLACEHOLDER, &temp_num.to_string(), 1),
            None => table
                .values
                .get(&temp_num.to_string())
                .cloned()
                .unwrap_or_default(),
        };

        if command.is_empty() {
            return Err(CommandError::TemperatureCommandNotFound {
                mode,
                value: temp_num,
            });
        }
        Ok(command)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessoryConfig {
    #[serde(default = "default_accessory")]
    pub accessory: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(rename = "debounceTime", default, skip_serializing_if = "Option::is_none")]
    pub debounce_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lirc: Option<LircConfig>,
    #[serde(flatten)]
    pub commands: CommandConfig,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            accessory: default_accessory(),
            name: default_name(),
            debounce_time: None,
            lirc: None,
            commands: CommandConfig::default(),
        }
    }
}

impl AccessoryConfig {
    /// Zero counts as unset.
    pub fn debounce_ms(&self) -> u64 {
        match self.debounce_time {
            Some(ms) if ms > 0 => ms,
            _ => DEFAULT_DEBOUNCE_MS,
        }
    }
}

fn default_accessory() -> String {
    ACCESSORY_NAME.to_string()
}

fn default_name() -> String {
    "Thermostat".to_string()
}
