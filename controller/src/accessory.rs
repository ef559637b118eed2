use std::sync::Arc;

use serde::Serialize;
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info};

use lirc_thermostat_common::{
    config::{MANUFACTURER, MODEL},
    AccessoryConfig, CommandError, CommandErrorKind, DisplayUnits, HeatingCoolingMode, Requested,
    ThermostatModel, ThermostatSnapshot,
};

use crate::{
    dispatcher::{spawn_dispatcher, Clock},
    lirc::Transport,
};

#[derive(Debug, Clone, Serialize)]
pub struct AccessoryInformation {
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
}

/// The Thermostat service hooks, one debounce slot per instance.
pub struct ThermostatAccessory<T> {
    information: AccessoryInformation,
    model: Arc<Mutex<ThermostatModel>>,
    wake: Arc<Notify>,
    clock: Clock,
    transport: Arc<T>,
}

impl<T> Clone for ThermostatAccessory<T> {
    fn clone(&self) -> Self {
        Self {
            information: self.information.clone(),
            model: self.model.clone(),
            wake: self.wake.clone(),
            clock: self.clock,
            transport: self.transport.clone(),
        }
    }
}

impl<T: Transport> ThermostatAccessory<T> {
    pub fn new(config: &AccessoryConfig, transport: Arc<T>) -> Self {
        debug!("initializing accessory with config: {config:?}");
        Self {
            information: AccessoryInformation {
                name: config.name.clone(),
                manufacturer: MANUFACTURER,
                model: MODEL,
                serial_number: format!("Version {}", env!("CARGO_PKG_VERSION")),
            },
            model: Arc::new(Mutex::new(ThermostatModel::from_config(config))),
            wake: Arc::new(Notify::new()),
            clock: Clock::new(),
            transport,
        }
    }

    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        spawn_dispatcher(
            self.model.clone(),
            self.wake.clone(),
            self.clock,
            self.transport.clone(),
        )
    }

    pub fn information(&self) -> &AccessoryInformation {
        &self.information
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub async fn snapshot(&self) -> ThermostatSnapshot {
        self.model.lock().await.snapshot()
    }

    pub async fn current_heating_cooling_state(&self) -> HeatingCoolingMode {
        let mode = self.model.lock().await.current_mode();
        info!("Getting current heating cooling state: {}", mode.index());
        mode
    }

    pub async fn target_heating_cooling_state(&self) -> HeatingCoolingMode {
        let mode = self.model.lock().await.target_mode();
        info!("Getting target heating cooling state: {}", mode.index());
        mode
    }

    pub async fn set_target_heating_cooling_state(
        &self,
        value: u8,
    ) -> Result<Requested, CommandError> {
        info!("Setting target heating cooling state to: {value}");
        let result = {
            let mut model = self.model.lock().await;
            let requested = model.set_target_mode(value, self.clock.now_ms());
            requested.map(|requested| (requested, model.pending_command().map(str::to_string)))
        };
        self.after_request(result, "state")
    }

    pub async fn current_temperature(&self) -> f64 {
        let value = self.model.lock().await.current_temperature();
        info!("Getting current temperature: {value}");
        value
    }

    pub async fn target_temperature(&self) -> f64 {
        let value = self.model.lock().await.target_temperature();
        info!("Getting target temperature: {value}");
        value
    }

    pub async fn set_target_temperature(&self, value: f64) -> Result<Requested, CommandError> {
        info!("Setting target temperature to: {value}");
        let result = {
            let mut model = self.model.lock().await;
            let requested = model.set_target_temperature(value, self.clock.now_ms());
            requested.map(|requested| (requested, model.pending_command().map(str::to_string)))
        };
        self.after_request(result, "temp")
    }

    pub async fn temperature_display_units(&self) -> DisplayUnits {
        let units = self.model.lock().await.display_units();
        info!("Getting temperature display units: {}", units.index());
        units
    }

    pub async fn set_temperature_display_units(&self, units: DisplayUnits) {
        info!("Setting temperature display units to: {}", units.index());
        self.model.lock().await.set_display_units(units);
    }

    fn after_request(
        &self,
        result: Result<(Requested, Option<String>), CommandError>,
        label: &str,
    ) -> Result<Requested, CommandError> {
        match result {
            Ok((requested, command)) => {
                info!("{label} command: {}", command.unwrap_or_default());
                if let Some(ticket) = requested.superseded {
                    debug!("dispatch {ticket} superseded by {}", requested.ticket);
                }
                self.wake.notify_one();
                Ok(requested)
            }
            Err(err) => {
                match err.kind() {
                    CommandErrorKind::ConfigurationMissing => error!("{err}"),
                    CommandErrorKind::CommandNotFound | CommandErrorKind::Ignored => {
                        debug!("{err}")
                    }
                }
                Err(err)
            }
        }
    }
}
