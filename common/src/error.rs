use thiserror::Error;

use crate::types::HeatingCoolingMode;

/// Why a set request did not schedule a transmission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("stateCommands config not found")]
    StateCommandsMissing,

    #[error("tempsCommands config not found for {0} mode")]
    TemperatureCommandsMissing(HeatingCoolingMode),

    #[error("target state command not found for state {0}")]
    StateCommandNotFound(u8),

    #[error("temperature set command not found for {value} in {mode} mode")]
    TemperatureCommandNotFound { mode: HeatingCoolingMode, value: i64 },

    #[error("device is off, ignoring temperature change")]
    DeviceOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    ConfigurationMissing,
    CommandNotFound,
    Ignored,
}

impl CommandError {
    pub fn kind(&self) -> CommandErrorKind {
        match self {
            Self::StateCommandsMissing | Self::TemperatureCommandsMissing(_) => {
                CommandErrorKind::ConfigurationMissing
            }
            Self::StateCommandNotFound(_) | Self::TemperatureCommandNotFound { .. } => {
                CommandErrorKind::CommandNotFound
            }
            Self::DeviceOff => CommandErrorKind::Ignored,
        }
    }
}
