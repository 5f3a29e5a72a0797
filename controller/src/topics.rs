/// Topic layout for one unit. Autopilot-owned values live under
/// `hvac/{name}/…`; the device-side channels follow the esphome climate
/// naming the units expose on the broker.
pub struct UnitTopics {
    pub enabled_command: String,
    pub enabled_state: String,
    pub min_temp_command: String,
    pub min_temp_state: String,
    pub max_temp_command: String,
    pub max_temp_state: String,
    pub preset_command: String,
    pub preset_state: String,
    pub mode_command: String,
    pub mode_state: String,
    pub fan_command: String,
    pub fan_state: String,
    pub target_command: String,
    pub target_state: String,
    pub unit_temperature_state: String,
    pub discovery: String,
}

impl UnitTopics {
    pub fn for_unit(name: &str) -> Self {
        Self {
            enabled_command: format!("hvac/{name}/autopilot/enabled/command"),
            enabled_state: format!("hvac/{name}/autopilot/enabled/state"),
            min_temp_command: format!("hvac/{name}/autopilot/min_temp/command"),
            min_temp_state: format!("hvac/{name}/autopilot/min_temp/state"),
            max_temp_command: format!("hvac/{name}/autopilot/max_temp/command"),
            max_temp_state: format!("hvac/{name}/autopilot/max_temp/state"),
            preset_command: format!("hvac/{name}/preset/command"),
            preset_state: format!("hvac/{name}/preset/state"),
            mode_command: format!("esphome/{name}/mode_command"),
            mode_state: format!("esphome/{name}/mode_state"),
            fan_command: format!("esphome/{name}/fan_mode_command"),
            fan_state: format!("esphome/{name}/fan_mode_state"),
            target_command: format!("esphome/{name}/target_temperature_command"),
            target_state: format!("esphome/{name}/target_temperature_low_state"),
            unit_temperature_state: format!("esphome/{name}/current_temperature_state"),
            discovery: format!("homeassistant/climate/hvac/{name}/config"),
        }
    }
}
