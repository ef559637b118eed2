use std::collections::VecDeque;

use crate::{
    config::{AccessoryConfig, CommandConfig},
    debounce::{Debouncer, DispatchPhase, PendingDispatch, Requested, Ticket},
    error::CommandError,
    types::{DisplayUnits, HeatingCoolingMode, ThermostatSnapshot},
};

pub const DEFAULT_TEMPERATURE: f64 = 10.0;

const PHASE_HISTORY: usize = 16;

/// State change applied once a dispatch has been transmitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Commit {
    Mode(HeatingCoolingMode),
    Temperature(f64),
}

#[derive(Debug, Clone)]
pub struct ThermostatModel {
    commands: CommandConfig,
    debounce_ms: u64,

    current_mode: HeatingCoolingMode,
    target_mode: HeatingCoolingMode,
    current_temperature: f64,
    target_temperature: f64,
    display_units: DisplayUnits,

    debouncer: Debouncer<Commit>,
    phases: VecDeque<(Ticket, DispatchPhase)>,
}

impl ThermostatModel {
    pub fn new(commands: CommandConfig, debounce_ms: u64) -> Self {
        Self {
            commands,
            debounce_ms,
            current_mode: HeatingCoolingMode::Off,
            target_mode: HeatingCoolingMode::Off,
            current_temperature: DEFAULT_TEMPERATURE,
            target_temperature: DEFAULT_TEMPERATURE,
            display_units: DisplayUnits::default(),
            debouncer: Debouncer::new(),
            phases: VecDeque::with_capacity(PHASE_HISTORY),
        }
    }

    pub fn from_config(config: &AccessoryConfig) -> Self {
        Self::new(config.commands.clone(), config.debounce_ms())
    }

    pub fn current_mode(&self) -> HeatingCoolingMode {
        self.current_mode
    }

    pub fn target_mode(&self) -> HeatingCoolingMode {
        self.target_mode
    }

    pub fn current_temperature(&self) -> f64 {
        self.current_temperature
    }

    pub fn target_temperature(&self) -> f64 {
        self.target_temperature
    }

    pub fn display_units(&self) -> DisplayUnits {
        self.display_units
    }

    pub fn set_display_units(&mut self, units: DisplayUnits) {
        self.display_units = units;
    }

    /// Schedules the command for `index`. Neither mode changes until the
    /// dispatch completes.
    pub fn set_target_mode(&mut self, index: u8, now_ms: u64) -> Result<Requested, CommandError> {
        let command = self.commands.mode_command(index)?.to_string();
        let mode =
            HeatingCoolingMode::from_index(index).ok_or(CommandError::StateCommandNotFound(index))?;
        Ok(self.schedule(command, Commit::Mode(mode), now_ms))
    }

    /// Schedules the temperature command for the mode currently running.
    pub fn set_target_temperature(
        &mut self,
        value: f64,
        now_ms: u64,
    ) -> Result<Requested, CommandError> {
        if self.current_mode == HeatingCoolingMode::Off {
            return Err(CommandError::DeviceOff);
        }
        let command = self
            .commands
            .temperature_command(self.current_mode, value)?;
        Ok(self.schedule(command, Commit::Temperature(value), now_ms))
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.debouncer.deadline_ms()
    }

    pub fn pending_command(&self) -> Option<&str> {
        self.debouncer
            .pending()
            .map(|dispatch| dispatch.command.as_str())
    }

    /// Removes the pending dispatch if its window has closed. The caller
    /// transmits it and then hands it back to [`Self::complete`].
    pub fn take_due(&mut self, now_ms: u64) -> Option<PendingDispatch<Commit>> {
        self.debouncer.take_due(now_ms)
    }

    pub fn complete(&mut self, dispatch: PendingDispatch<Commit>) {
        match dispatch.payload {
            Commit::Mode(mode) => {
                self.current_mode = mode;
                self.target_mode = mode;
            }
            Commit::Temperature(value) => {
                self.current_temperature = value;
                self.target_temperature = value;
            }
        }
        self.record_phase(dispatch.ticket, DispatchPhase::Committed);
    }

    /// Takes and completes the due dispatch in one step, returning the
    /// command that should go out.
    pub fn fire_due(&mut self, now_ms: u64) -> Option<String> {
        let dispatch = self.take_due(now_ms)?;
        let command = dispatch.command.clone();
        self.complete(dispatch);
        Some(command)
    }

    pub fn phase(&self, ticket: Ticket) -> Option<DispatchPhase> {
        self.phases
            .iter()
            .rev()
            .find(|(recorded, _)| *recorded == ticket)
            .map(|(_, phase)| *phase)
    }

    pub fn snapshot(&self) -> ThermostatSnapshot {
        ThermostatSnapshot {
            current_mode: self.current_mode,
            target_mode: self.target_mode,
            current_temperature: self.current_temperature,
            target_temperature: self.target_temperature,
            display_units: self.display_units,
            dispatch_pending: self.debouncer.is_pending(),
            pending_command: self.pending_command().map(str::to_string),
        }
    }

    fn schedule(&mut self, command: String, commit: Commit, now_ms: u64) -> Requested {
        let requested = self
            .debouncer
            .request(command, commit, self.debounce_ms, now_ms);
        if let Some(superseded) = requested.superseded {
            self.record_phase(superseded, DispatchPhase::Superseded);
        }
        self.record_phase(requested.ticket, DispatchPhase::Requested);
        requested
    }

    fn record_phase(&mut self, ticket: Ticket, phase: DispatchPhase) {
        if let Some(entry) = self.phases.iter_mut().find(|(recorded, _)| *recorded == ticket) {
            entry.1 = phase;
            return;
        }
        if self.phases.len() == PHASE_HISTORY {
            self.phases.pop_front();
        }
        self.phases.push_back((ticket, phase));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::TemperatureCommands;

    fn state_commands() -> CommandConfig {
        CommandConfig {
            state_commands: Some(HashMap::from([
                ("OFF".to_string(), "CMD_OFF".to_string()),
                ("HEAT".to_string(), "CMD_HEAT".to_string()),
                ("COOL".to_string(), "CMD_COOL".to_string()),
            ])),
            heat_temps_commands: Some(TemperatureCommands {
                template: Some("SET_TEMP_{tempNum}".to_string()),
                values: HashMap::new(),
            }),
            cool_temps_commands: Some(TemperatureCommands {
                template: None,
                values: HashMap::from([("20".to_string(), "COOL_20".to_string())]),
            }),
            auto_temps_commands: None,
        }
    }

    fn heating_model() -> ThermostatModel {
        let mut model = ThermostatModel::new(state_commands(), 50);
        model.set_target_mode(1, 0).unwrap();
        assert_eq!(model.fire_due(50).as_deref(), Some("CMD_HEAT"));
        model
    }

    #[test]
    fn defaults_match_fresh_accessory() {
        let model = ThermostatModel::new(CommandConfig::default(), 1_000);

        assert_eq!(model.current_mode(), HeatingCoolingMode::Off);
        assert_eq!(model.target_mode(), HeatingCoolingMode::Off);
        assert_eq!(model.current_temperature(), 10.0);
        assert_eq!(model.target_temperature(), 10.0);
        assert_eq!(model.display_units(), DisplayUnits::Fahrenheit);
    }

    #[test]
    fn set_mode_commits_only_after_dispatch() {
        let mut model = ThermostatModel::new(state_commands(), 50);
        let requested = model.set_target_mode(1, 0).unwrap();

        assert_eq!(model.target_mode(), HeatingCoolingMode::Off);
        assert_eq!(model.current_mode(), HeatingCoolingMode::Off);
        assert_eq!(model.phase(requested.ticket), Some(DispatchPhase::Requested));
        assert_eq!(model.fire_due(49), None);

        assert_eq!(model.fire_due(50).as_deref(), Some("CMD_HEAT"));
        assert_eq!(model.current_mode(), HeatingCoolingMode::Heat);
        assert_eq!(model.target_mode(), HeatingCoolingMode::Heat);
        assert_eq!(model.phase(requested.ticket), Some(DispatchPhase::Committed));
    }

    #[test]
    fn burst_of_mode_changes_sends_last_only() {
        let mut model = ThermostatModel::new(state_commands(), 50);
        let heat = model.set_target_mode(1, 0).unwrap();
        let off = model.set_target_mode(0, 10).unwrap();

        assert_eq!(off.superseded, Some(heat.ticket));
        assert_eq!(model.phase(heat.ticket), Some(DispatchPhase::Superseded));
        assert_eq!(model.fire_due(50), None);
        assert_eq!(model.fire_due(60).as_deref(), Some("CMD_OFF"));
        assert_eq!(model.fire_due(500), None);
        assert_eq!(model.current_mode(), HeatingCoolingMode::Off);
        assert_eq!(model.target_mode(), HeatingCoolingMode::Off);
    }

    #[test]
    fn missing_state_commands_leaves_state_untouched() {
        let mut model = ThermostatModel::new(CommandConfig::default(), 50);

        assert_eq!(
            model.set_target_mode(1, 0),
            Err(CommandError::StateCommandsMissing)
        );
        assert!(model.next_deadline_ms().is_none());
        assert_eq!(model.fire_due(10_000), None);
        assert_eq!(model.target_mode(), HeatingCoolingMode::Off);
    }

    #[test]
    fn unknown_mode_index_is_rejected() {
        let mut model = ThermostatModel::new(state_commands(), 50);

        assert_eq!(
            model.set_target_mode(3, 0),
            Err(CommandError::StateCommandNotFound(3))
        );
        assert_eq!(
            model.set_target_mode(9, 0),
            Err(CommandError::StateCommandNotFound(9))
        );
        assert!(model.next_deadline_ms().is_none());
    }

    #[test]
    fn temperature_ignored_while_off() {
        let mut model = ThermostatModel::new(state_commands(), 50);

        for value in [-5.0, 10.0, 22.0, 35.5] {
            assert_eq!(
                model.set_target_temperature(value, 0),
                Err(CommandError::DeviceOff)
            );
        }
        assert!(model.next_deadline_ms().is_none());
        assert_eq!(model.target_temperature(), 10.0);
        assert_eq!(model.current_temperature(), 10.0);
    }

    #[test]
    fn temperature_uses_heat_template() {
        let mut model = heating_model();

        model.set_target_temperature(22.0, 100).unwrap();
        assert_eq!(model.pending_command(), Some("SET_TEMP_22"));
        assert_eq!(model.current_temperature(), 10.0);

        assert_eq!(model.fire_due(150).as_deref(), Some("SET_TEMP_22"));
        assert_eq!(model.current_temperature(), 22.0);
        assert_eq!(model.target_temperature(), 22.0);
    }

    #[test]
    fn temperature_commit_keeps_fractional_value() {
        let mut model = heating_model();

        model.set_target_temperature(21.5, 100).unwrap();
        assert_eq!(model.fire_due(150).as_deref(), Some("SET_TEMP_21"));
        assert_eq!(model.current_temperature(), 21.5);
    }

    #[test]
    fn temperature_table_follows_current_mode() {
        let mut model = heating_model();
        model.set_target_mode(2, 100).unwrap();

        // Still heating until the cool command is sent.
        model.set_target_temperature(20.0, 110).unwrap();
        assert_eq!(model.pending_command(), Some("SET_TEMP_20"));

        model.set_target_mode(2, 120).unwrap();
        assert_eq!(model.fire_due(170).as_deref(), Some("CMD_COOL"));

        model.set_target_temperature(20.0, 200).unwrap();
        assert_eq!(model.fire_due(250).as_deref(), Some("COOL_20"));
        assert_eq!(
            model.set_target_temperature(26.0, 300),
            Err(CommandError::TemperatureCommandNotFound {
                mode: HeatingCoolingMode::Cool,
                value: 26,
            })
        );
    }

    #[test]
    fn mode_and_temperature_share_one_slot() {
        let mut model = heating_model();

        model.set_target_temperature(24.0, 100).unwrap();
        model.set_target_mode(0, 120).unwrap();

        assert_eq!(model.fire_due(170).as_deref(), Some("CMD_OFF"));
        assert_eq!(model.current_temperature(), 10.0);
        assert_eq!(model.current_mode(), HeatingCoolingMode::Off);
    }

    #[test]
    fn display_units_apply_immediately() {
        let mut model = ThermostatModel::new(state_commands(), 50);
        model.set_display_units(DisplayUnits::Celsius);

        assert_eq!(model.display_units(), DisplayUnits::Celsius);
        assert!(model.next_deadline_ms().is_none());
        assert!(!model.snapshot().dispatch_pending);
    }

    #[test]
    fn take_due_then_complete_matches_fire_due() {
        let mut model = ThermostatModel::new(state_commands(), 50);
        model.set_target_mode(2, 0).unwrap();

        let dispatch = model.take_due(50).unwrap();
        assert_eq!(dispatch.command, "CMD_COOL");
        assert_eq!(model.current_mode(), HeatingCoolingMode::Off);

        model.complete(dispatch);
        assert_eq!(model.current_mode(), HeatingCoolingMode::Cool);
        assert_eq!(model.snapshot().target_mode, HeatingCoolingMode::Cool);
    }
}
