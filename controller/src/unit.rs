use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Context;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use hvac_common::{
    AutopilotConfig, DecisionEngine, FanSpeed, Mode, ModeSet, SensorPayload, TemperatureHistory,
    Trend, UnitCommand, UnitSnapshot,
};

use crate::monotonic_ms;
use crate::topics::UnitTopics;
use crate::transport::Transport;
use crate::values::{codecs, AckPolicy, RemoteValue, ReplicatedValue};

const DEFAULT_MIN_TEMP: f64 = 19.0;
const DEFAULT_MAX_TEMP: f64 = 33.0;
const SLEEP_MAX_TEMP: f64 = 23.0;
const ECO_MAX_TEMP: f64 = 33.0;

/// Sliding temperature window fed by one sensor topic.
pub struct SensorFeed {
    history: RwLock<TemperatureHistory>,
}

impl SensorFeed {
    fn new(config: &AutopilotConfig) -> Self {
        Self {
            history: RwLock::new(TemperatureHistory::new(
                config.history_window_ms,
                config.trend_epsilon,
            )),
        }
    }

    /// Feed of JSON `{"temperature": x}` reports (room sensors).
    pub fn json(
        transport: &dyn Transport,
        topic: &str,
        config: &AutopilotConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let feed = Arc::new(Self::new(config));
        let this = Arc::clone(&feed);
        let topic_owned = topic.to_string();
        transport.subscribe(
            topic,
            Arc::new(move |payload: &[u8]| match serde_json::from_slice::<SensorPayload>(payload) {
                Ok(report) if report.temperature.is_finite() => this.record(report.temperature),
                Ok(report) => warn!(
                    topic = %topic_owned,
                    value = report.temperature,
                    "dropping non-finite sensor report"
                ),
                Err(err) => warn!(topic = %topic_owned, "dropping sensor report: {err}"),
            }),
        )?;
        Ok(feed)
    }

    /// Feed of raw decimal reports (the unit's own sensor).
    pub fn raw(
        transport: &dyn Transport,
        topic: &str,
        config: &AutopilotConfig,
    ) -> anyhow::Result<Arc<Self>> {
        let feed = Arc::new(Self::new(config));
        let this = Arc::clone(&feed);
        let topic_owned = topic.to_string();
        transport.subscribe(
            topic,
            Arc::new(move |payload: &[u8]| {
                let reading = std::str::from_utf8(payload)
                    .ok()
                    .and_then(|text| text.trim().parse::<f64>().ok())
                    .filter(|value| value.is_finite());
                match reading {
                    Some(value) => this.record(value),
                    None => warn!(topic = %topic_owned, "dropping unparseable sensor report"),
                }
            }),
        )?;
        Ok(feed)
    }

    fn record(&self, value: f64) {
        self.history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(value, monotonic_ms());
    }

    pub fn current(&self) -> Option<f64> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current()
            .ok()
    }

    pub fn trend(&self) -> Trend {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .trend()
    }

    pub fn range(&self) -> f64 {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range()
    }
}

pub struct Autopilot {
    pub enabled: Arc<ReplicatedValue<bool>>,
    pub min_temp: Arc<ReplicatedValue<f64>>,
    pub max_temp: Arc<ReplicatedValue<f64>>,
    pub air: Arc<SensorFeed>,
    pub unit: Arc<SensorFeed>,
}

/// One physical unit: its autopilot targets, its sensor windows, the
/// device-authoritative mode/fan/setpoint, and the decision engine that
/// drives them. The engine mutex is the unit's single-writer section.
pub struct Unit {
    pub name: String,
    pub autopilot: Autopilot,
    pub mode: Arc<RemoteValue<Mode>>,
    pub fan: Arc<RemoteValue<FanSpeed>>,
    pub temperature: Arc<RemoteValue<f64>>,
    engine: Mutex<DecisionEngine>,
}

impl Unit {
    pub fn attach(
        transport: Arc<dyn Transport>,
        config: &AutopilotConfig,
        name: &str,
        sensor_topic: &str,
    ) -> anyhow::Result<Arc<Self>> {
        let topics = UnitTopics::for_unit(name);
        let ack = AckPolicy::from_config(config);
        let window_ms = config.history_window_ms;

        let enabled = ReplicatedValue::attach(
            Arc::clone(&transport),
            &topics.enabled_command,
            &topics.enabled_state,
            codecs::switch(),
        )?;
        let min_temp = ReplicatedValue::attach(
            Arc::clone(&transport),
            &topics.min_temp_command,
            &topics.min_temp_state,
            codecs::celsius(),
        )?;
        let max_temp = ReplicatedValue::attach(
            Arc::clone(&transport),
            &topics.max_temp_command,
            &topics.max_temp_state,
            codecs::max_target(),
        )?;
        let air = SensorFeed::json(&*transport, sensor_topic, config)?;
        let unit_sensor = SensorFeed::raw(&*transport, &topics.unit_temperature_state, config)?;
        let mode = RemoteValue::attach(
            Arc::clone(&transport),
            &topics.mode_command,
            &topics.mode_state,
            codecs::mode(),
            ack,
            window_ms,
        )?;
        let fan = RemoteValue::attach(
            Arc::clone(&transport),
            &topics.fan_command,
            &topics.fan_state,
            codecs::fan_speed(),
            ack,
            window_ms,
        )?;
        let temperature = RemoteValue::attach(
            Arc::clone(&transport),
            &topics.target_command,
            &topics.target_state,
            codecs::celsius(),
            ack,
            window_ms,
        )?;

        // Presets are shortcuts onto the max target.
        {
            let max_temp = Arc::clone(&max_temp);
            let publisher = Arc::clone(&transport);
            let preset_state = topics.preset_state.clone();
            let unit_name = name.to_string();
            transport.subscribe(
                &topics.preset_command,
                Arc::new(move |payload: &[u8]| {
                    let preset = match std::str::from_utf8(payload).map(str::trim) {
                        Ok("sleep") => ("sleep", SLEEP_MAX_TEMP),
                        Ok("eco") => ("eco", ECO_MAX_TEMP),
                        other => {
                            warn!(unit = %unit_name, "invalid preset command: {other:?}");
                            return;
                        }
                    };
                    if let Err(err) = publisher.publish(&preset_state, preset.0.as_bytes(), false) {
                        warn!(unit = %unit_name, "failed to publish preset state: {err}");
                    }
                    max_temp.set(preset.1);
                }),
            )?;
        }

        // Keep the preset state honest when the max target is changed
        // directly rather than through a preset.
        {
            let publisher = Arc::clone(&transport);
            let preset_state = topics.preset_state.clone();
            transport.subscribe(
                &topics.max_temp_command,
                Arc::new(move |payload: &[u8]| {
                    let Some(target) = std::str::from_utf8(payload)
                        .ok()
                        .and_then(|text| text.trim().parse::<f64>().ok())
                    else {
                        return;
                    };
                    // Half-degree grid comparison sidesteps float identity.
                    let half_degrees = (target * 2.0).round() as i64;
                    let preset = if half_degrees == (SLEEP_MAX_TEMP * 2.0) as i64 {
                        "sleep"
                    } else if half_degrees == (ECO_MAX_TEMP * 2.0) as i64 {
                        "eco"
                    } else {
                        "none"
                    };
                    if let Err(err) = publisher.publish(&preset_state, preset.as_bytes(), false) {
                        warn!("failed to publish preset state: {err}");
                    }
                }),
            )?;
        }

        let discovery = json!({
            "name": "Thermostat",
            "max_temp": DEFAULT_MAX_TEMP,
            "min_temp": 17,
            "precision": 0.5,
            "temp_step": 0.5,
            "temperature_high_command_topic": topics.max_temp_command,
            "temperature_high_state_topic": topics.max_temp_state,
            "temperature_low_command_topic": topics.min_temp_command,
            "temperature_low_state_topic": topics.min_temp_state,
            "current_temperature_topic": sensor_topic,
            "current_temperature_template": "{{ value_json.temperature }}",
            "temperature_unit": "C",
            "unique_id": format!("{name}_autopilot"),
            "mode_command_topic": topics.enabled_command,
            "mode_state_topic": topics.enabled_state,
            "modes": ["off", "auto"],
            "fan_mode_command_topic": topics.fan_command,
            "fan_mode_state_topic": topics.fan_state,
            "preset_modes": ["sleep", "eco"],
            "preset_mode_command_topic": topics.preset_command,
            "preset_mode_state_topic": topics.preset_state,
            "device": {
                "identifiers": name,
                "name": name,
                "manufacturer": "hvac-autopilot",
            },
        });
        transport
            .publish(&topics.discovery, discovery.to_string().as_bytes(), true)
            .context("failed to publish discovery document")?;

        // Boot defaults go through the normal command path so a restarted
        // process converges to a sane configuration.
        transport.publish(
            &topics.min_temp_command,
            format!("{DEFAULT_MIN_TEMP:.1}").as_bytes(),
            false,
        )?;
        transport.publish(
            &topics.max_temp_command,
            format!("{DEFAULT_MAX_TEMP:.1}").as_bytes(),
            false,
        )?;
        transport.publish(&topics.enabled_command, b"true", false)?;

        info!(unit = %name, sensor = %sensor_topic, "unit wired");

        Ok(Arc::new(Self {
            name: name.to_string(),
            autopilot: Autopilot {
                enabled,
                min_temp,
                max_temp,
                air,
                unit: unit_sensor,
            },
            mode,
            fan,
            temperature,
            engine: Mutex::new(DecisionEngine::new(name, config.clone())),
        }))
    }

    pub fn autopilot_enabled(&self) -> bool {
        self.autopilot.enabled.get() == Some(true)
    }

    pub fn snapshot(&self, now_ms: u64) -> UnitSnapshot {
        UnitSnapshot {
            mode: self.mode.get(),
            fan: self.fan.get(),
            setpoint: self.temperature.get(),
            ambient: self.autopilot.air.current(),
            ambient_trend: self.autopilot.air.trend(),
            unit_temp: self.autopilot.unit.current(),
            unit_range: self.autopilot.unit.range(),
            min_temp: self.autopilot.min_temp.get(),
            max_temp: self.autopilot.max_temp.get(),
            mode_unchanged_ms: self.mode.unchanged_for(now_ms),
        }
    }

    /// One tuning pass: snapshot, decide, apply. Runs under the unit's
    /// exclusive section so a concurrent pass can never interleave writes.
    pub async fn tune(&self, usable: ModeSet, now_ms: u64) {
        let mut engine = self.engine.lock().await;
        let snapshot = self.snapshot(now_ms);
        for command in engine.evaluate(&snapshot, usable, now_ms) {
            let result = match command {
                UnitCommand::SetMode(mode) => self.mode.set(mode).await,
                UnitCommand::SetFan(fan) => self.fan.set(fan).await,
                UnitCommand::SetSetpoint(setpoint) => self.temperature.set(setpoint).await,
            };
            if let Err(err) = result {
                warn!(unit = %self.name, "command not applied: {err}");
            }
        }
    }

    /// Refresh our authoritative values on their status topics.
    pub fn ping(&self) {
        self.autopilot.enabled.republish();
        self.autopilot.min_temp.republish();
        self.autopilot.max_temp.republish();
    }

    pub fn log_state(&self, now_ms: u64) {
        let snapshot = self.snapshot(now_ms);
        info!(
            unit = %self.name,
            enabled = self.autopilot_enabled(),
            mode = ?snapshot.mode,
            fan = ?snapshot.fan,
            setpoint = ?snapshot.setpoint,
            ambient = ?snapshot.ambient,
            trend = ?snapshot.ambient_trend,
            min_temp = ?snapshot.min_temp,
            max_temp = ?snapshot.max_temp,
            unit_range = snapshot.unit_range,
            "unit state",
        );
    }
}
