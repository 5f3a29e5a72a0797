use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub history_window_ms: u64,
    pub trend_epsilon: f64,
    pub score_trigger: i32,
    pub min_mode_dwell_ms: u64,
    pub cool_stall_after_ms: u64,
    pub cool_stall_max_range: f64,
    pub comfort_band: f64,
    pub stop_band: f64,
    pub setpoint_step: f64,
    pub trend_offset: f64,
    pub setpoint_floor: f64,
    pub setpoint_ceiling: f64,
    pub mix_gap: f64,
    pub ack_attempts: u32,
    pub ack_interval_ms: u64,
    pub tune_interval_ms: u64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            history_window_ms: 3_600_000,
            trend_epsilon: 0.2,
            score_trigger: 100,
            min_mode_dwell_ms: 1_800_000,
            cool_stall_after_ms: 10_800_000,
            cool_stall_max_range: 1.0,
            comfort_band: 1.0,
            stop_band: 3.0,
            setpoint_step: 0.5,
            trend_offset: 0.5,
            setpoint_floor: 17.0,
            setpoint_ceiling: 30.0,
            mix_gap: 2.0,
            ack_attempts: 10,
            ack_interval_ms: 300,
            tune_interval_ms: 30_000,
        }
    }
}

impl AutopilotConfig {
    pub fn sanitize(&mut self) {
        self.trend_epsilon = self.trend_epsilon.clamp(0.0, 1.0);
        self.score_trigger = self.score_trigger.clamp(1, 10_000);
        self.comfort_band = self.comfort_band.clamp(0.0, 5.0);
        self.stop_band = self.stop_band.clamp(self.comfort_band, 10.0);
        self.setpoint_step = self.setpoint_step.clamp(0.1, 2.0);
        self.trend_offset = self.trend_offset.clamp(0.0, 2.0);
        if self.setpoint_ceiling < self.setpoint_floor {
            self.setpoint_ceiling = self.setpoint_floor;
        }
        self.ack_attempts = self.ack_attempts.clamp(1, 100);
        self.ack_interval_ms = self.ack_interval_ms.clamp(50, 5_000);
        self.tune_interval_ms = self.tune_interval_ms.max(1_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "hvac-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    /// Topic of the room's ambient sensor (JSON payloads).
    pub sensor_topic: String,
}

/// Units listed together share one compressor line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    pub name: String,
    pub units: Vec<UnitConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub mqtt: MqttConfig,
    pub autopilot: AutopilotConfig,
    pub pumps: Vec<PumpConfig>,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.autopilot.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sanitize_clamps_degenerate_tunables() {
        let mut config = AutopilotConfig {
            score_trigger: 0,
            ack_attempts: 0,
            ack_interval_ms: 1,
            setpoint_floor: 20.0,
            setpoint_ceiling: 10.0,
            ..AutopilotConfig::default()
        };
        config.sanitize();
        assert_eq!(config.score_trigger, 1);
        assert_eq!(config.ack_attempts, 1);
        assert_eq!(config.ack_interval_ms, 50);
        assert_eq!(config.setpoint_ceiling, config.setpoint_floor);
    }

    #[test]
    fn runtime_config_parses_a_minimal_document() {
        let raw = r#"{
            "mqtt": {"host": "broker.local"},
            "pumps": [
                {"name": "house", "units": [
                    {"name": "living_room", "sensor_topic": "sensors/living_room/temperature"}
                ]}
            ]
        }"#;
        let mut config: RuntimeConfig = serde_json::from_str(raw).unwrap();
        config.sanitize();

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.pumps.len(), 1);
        assert_eq!(config.pumps[0].units[0].name, "living_room");
        assert_eq!(config.autopilot.score_trigger, 100);
    }
}
