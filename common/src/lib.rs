pub mod config;
pub mod debounce;
pub mod error;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{AccessoryConfig, CommandConfig, LircConfig, TemperatureCommands};
pub use debounce::{Debouncer, DispatchPhase, PendingDispatch, Requested, Ticket};
pub use error::{CommandError, CommandErrorKind};
pub use thermostat::{Commit, ThermostatModel};
pub use topics::*;
pub use types::{DisplayUnits, HeatingCoolingMode, ThermostatSnapshot};
