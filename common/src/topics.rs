pub const TOPIC_STATE: &str = "lirc-thermostat/state";

pub const TOPIC_CMD_STATE: &str = "lirc-thermostat/cmnd/state";
pub const TOPIC_CMD_TARGET: &str = "lirc-thermostat/cmnd/target";
pub const TOPIC_CMD_UNITS: &str = "lirc-thermostat/cmnd/units";
