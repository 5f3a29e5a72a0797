use tracing::{debug, info};

use crate::config::AutopilotConfig;
use crate::types::{FanSpeed, Mode, ModeSet, Trend};

/// One mutation the autopilot wants applied to the physical unit. The caller
/// pushes these through the device's command channels in order.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitCommand {
    SetMode(Mode),
    SetFan(FanSpeed),
    SetSetpoint(f64),
}

/// Everything a tuning pass reads about one unit, captured at the start of
/// the pass. `None` means the corresponding value has not been received or
/// acknowledged yet.
#[derive(Debug, Clone, Default)]
pub struct UnitSnapshot {
    pub mode: Option<Mode>,
    pub fan: Option<FanSpeed>,
    pub setpoint: Option<f64>,
    pub ambient: Option<f64>,
    pub ambient_trend: Trend,
    pub unit_temp: Option<f64>,
    pub unit_range: f64,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub mode_unchanged_ms: u64,
}

/// Heating can no longer be turned down once the setpoint sits at the floor;
/// if the room is still too warm at that point the unit itself is the problem.
fn heating_pegged_at_floor(setpoint: f64, config: &AutopilotConfig) -> bool {
    setpoint <= config.setpoint_floor
}

/// A unit that has cooled below its target, held the same mode for hours, and
/// whose own outlet temperature has stopped moving is no longer doing useful
/// work.
fn cooling_stalled(
    snapshot: &UnitSnapshot,
    current: f64,
    max_temp: f64,
    config: &AutopilotConfig,
) -> bool {
    current < max_temp
        && snapshot.mode_unchanged_ms > config.cool_stall_after_ms
        && snapshot.unit_range < config.cool_stall_max_range
        && snapshot.ambient_trend != Trend::WarmingUp
}

/// Per-unit heat/cold state machine.
///
/// The engine never talks to the device; it turns a [`UnitSnapshot`] into
/// [`UnitCommand`]s and keeps only its own bookkeeping: the decision score,
/// the time of the last autonomous shutdown, and the mode it last observed.
#[derive(Debug)]
pub struct DecisionEngine {
    unit: String,
    config: AutopilotConfig,
    score: i32,
    last_off_ms: Option<u64>,
    last_seen_mode: Option<Mode>,
}

impl DecisionEngine {
    pub fn new(unit: impl Into<String>, config: AutopilotConfig) -> Self {
        Self {
            unit: unit.into(),
            config,
            score: 0,
            last_off_ms: None,
            last_seen_mode: None,
        }
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn evaluate(
        &mut self,
        snapshot: &UnitSnapshot,
        usable: ModeSet,
        now_ms: u64,
    ) -> Vec<UnitCommand> {
        // The score counts consecutive signals within one mode; any
        // transition, autonomous or external, invalidates it.
        if snapshot.mode != self.last_seen_mode {
            self.score = 0;
            self.last_seen_mode = snapshot.mode;
        }

        let mut commands = Vec::new();

        if usable.contains(Mode::Heat) {
            match snapshot.mode {
                Some(Mode::Off) => self.start_heat(snapshot, now_ms, &mut commands),
                Some(Mode::Heat) => self.tune_heat(snapshot, now_ms, &mut commands),
                _ => {}
            }
        }
        if usable.contains(Mode::Cool) && commands.is_empty() {
            match snapshot.mode {
                Some(Mode::Off) => self.start_cool(snapshot, now_ms, &mut commands),
                Some(Mode::Cool) => self.tune_cool(snapshot, now_ms, &mut commands),
                _ => {}
            }
        }

        commands
    }

    fn start_heat(&mut self, snapshot: &UnitSnapshot, now_ms: u64, commands: &mut Vec<UnitCommand>) {
        let Some((current, min_temp)) = snapshot.ambient.zip(snapshot.min_temp) else {
            debug!(unit = %self.unit, "heat: no ambient reading or min target yet");
            return;
        };
        if current > min_temp + self.config.comfort_band {
            return;
        }
        if !self.restart_allowed(snapshot, now_ms) {
            info!(unit = %self.unit, "room is cold but the unit changed mode too recently");
            return;
        }

        info!(unit = %self.unit, current, min_temp, "starting heating cycle");
        self.score = 0;
        commands.push(UnitCommand::SetMode(Mode::Heat));
        commands.push(UnitCommand::SetFan(FanSpeed::Auto));
        commands.push(UnitCommand::SetSetpoint(min_temp));
    }

    fn tune_heat(&mut self, snapshot: &UnitSnapshot, now_ms: u64, commands: &mut Vec<UnitCommand>) {
        let Some((current, min_temp)) = snapshot.ambient.zip(snapshot.min_temp) else {
            debug!(unit = %self.unit, "heat: no ambient reading or min target yet");
            return;
        };
        if current > min_temp + self.config.stop_band {
            info!(unit = %self.unit, current, min_temp, "way too hot, shutting down");
            self.shut_down(now_ms, commands);
            return;
        }

        let offset = match snapshot.ambient_trend {
            Trend::Stable => 0.0,
            Trend::CoolingDown => self.config.trend_offset,
            Trend::WarmingUp => -self.config.trend_offset,
        };
        if current <= min_temp + offset {
            self.score += 1;
            debug!(unit = %self.unit, score = self.score, "need more heat");
        } else if current > min_temp + self.config.comfort_band + offset {
            self.score -= 1;
            debug!(unit = %self.unit, score = self.score, "need less heat");
        }

        if self.score <= -self.config.score_trigger {
            self.score = 0;
            let setpoint = snapshot.setpoint.unwrap_or(min_temp);
            if heating_pegged_at_floor(setpoint, &self.config) {
                info!(unit = %self.unit, setpoint, "heating pegged at the floor, shutting down");
                self.shut_down(now_ms, commands);
                return;
            }
            info!(unit = %self.unit, "reducing fan speed and setpoint");
            if let Some(slower) = snapshot.fan.and_then(FanSpeed::step_down) {
                commands.push(UnitCommand::SetFan(slower));
            }
            commands.push(UnitCommand::SetSetpoint(self.lowered(setpoint)));
        } else if self.score >= self.config.score_trigger {
            self.score = 0;
            let setpoint = snapshot.setpoint.unwrap_or(min_temp);
            info!(unit = %self.unit, "increasing fan speed and setpoint");
            if let Some(faster) = snapshot.fan.and_then(FanSpeed::step_up) {
                commands.push(UnitCommand::SetFan(faster));
            }
            commands.push(UnitCommand::SetSetpoint(self.raised(setpoint)));
        }
    }

    fn start_cool(&mut self, snapshot: &UnitSnapshot, now_ms: u64, commands: &mut Vec<UnitCommand>) {
        let Some((current, max_temp)) = snapshot.ambient.zip(snapshot.max_temp) else {
            debug!(unit = %self.unit, "cool: no ambient reading or max target yet");
            return;
        };
        if current < max_temp - self.config.comfort_band {
            return;
        }
        if !self.restart_allowed(snapshot, now_ms) {
            info!(unit = %self.unit, "room is warm but the unit changed mode too recently");
            return;
        }
        let Some(in_unit) = snapshot.unit_temp else {
            info!(unit = %self.unit, "cooling wanted but the in-unit temperature is unknown");
            return;
        };

        info!(unit = %self.unit, current, max_temp, in_unit, "starting cooling cycle");
        self.score = 0;
        // The unit trusts its own sensor, which reads hot when the air is
        // still stratified; starting at or above that reading avoids a burst
        // of maximum cooling against bad data.
        let mut setpoint = in_unit.max(max_temp);
        if in_unit - current >= self.config.mix_gap {
            setpoint = setpoint.max(max_temp + self.config.mix_gap);
        }
        commands.push(UnitCommand::SetMode(Mode::Cool));
        commands.push(UnitCommand::SetSetpoint(
            setpoint.min(self.config.setpoint_ceiling),
        ));
        commands.push(UnitCommand::SetFan(FanSpeed::Auto));
    }

    fn tune_cool(&mut self, snapshot: &UnitSnapshot, now_ms: u64, commands: &mut Vec<UnitCommand>) {
        let Some((current, max_temp)) = snapshot.ambient.zip(snapshot.max_temp) else {
            debug!(unit = %self.unit, "cool: no ambient reading or max target yet");
            return;
        };
        if current < max_temp - self.config.stop_band {
            info!(unit = %self.unit, current, max_temp, "way too cold, shutting down");
            self.shut_down(now_ms, commands);
            return;
        }
        if cooling_stalled(snapshot, current, max_temp, &self.config) {
            info!(unit = %self.unit, "cooling has stalled, shutting down");
            self.shut_down(now_ms, commands);
            return;
        }

        let offset = match snapshot.ambient_trend {
            Trend::Stable => 0.0,
            Trend::CoolingDown => -self.config.trend_offset,
            Trend::WarmingUp => self.config.trend_offset,
        };
        if current < max_temp - self.config.comfort_band + offset {
            self.score += 1;
            debug!(unit = %self.unit, score = self.score, "need less cold");
        } else if current >= max_temp + offset {
            self.score -= 1;
            debug!(unit = %self.unit, score = self.score, "need more cold");
        }

        if self.score <= -self.config.score_trigger {
            self.score = 0;
            let setpoint = snapshot.setpoint.unwrap_or(max_temp);
            info!(unit = %self.unit, "increasing fan speed, lowering setpoint");
            if let Some(faster) = snapshot.fan.and_then(FanSpeed::step_up) {
                commands.push(UnitCommand::SetFan(faster));
            }
            commands.push(UnitCommand::SetSetpoint(self.lowered(setpoint)));
        } else if self.score >= self.config.score_trigger {
            self.score = 0;
            let setpoint = snapshot.setpoint.unwrap_or(max_temp);
            info!(unit = %self.unit, "reducing fan speed, raising setpoint");
            if let Some(slower) = snapshot.fan.and_then(FanSpeed::step_down) {
                commands.push(UnitCommand::SetFan(slower));
            }
            commands.push(UnitCommand::SetSetpoint(self.raised(setpoint)));
        }
    }

    fn restart_allowed(&self, snapshot: &UnitSnapshot, now_ms: u64) -> bool {
        if snapshot.mode_unchanged_ms < self.config.min_mode_dwell_ms {
            return false;
        }
        self.last_off_ms.map_or(true, |off_ms| {
            now_ms.saturating_sub(off_ms) >= self.config.min_mode_dwell_ms
        })
    }

    fn shut_down(&mut self, now_ms: u64, commands: &mut Vec<UnitCommand>) {
        self.score = 0;
        self.last_off_ms = Some(now_ms);
        commands.push(UnitCommand::SetMode(Mode::Off));
    }

    fn lowered(&self, setpoint: f64) -> f64 {
        (setpoint - self.config.setpoint_step).max(self.config.setpoint_floor)
    }

    fn raised(&self, setpoint: f64) -> f64 {
        (setpoint + self.config.setpoint_step).min(self.config.setpoint_ceiling)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::history::UNKNOWN_AGE_MS;

    fn engine() -> DecisionEngine {
        DecisionEngine::new("test_room", AutopilotConfig::default())
    }

    fn engine_with(config: AutopilotConfig) -> DecisionEngine {
        DecisionEngine::new("test_room", config)
    }

    fn idle_cold_room() -> UnitSnapshot {
        UnitSnapshot {
            mode: Some(Mode::Off),
            ambient: Some(18.0),
            min_temp: Some(20.0),
            mode_unchanged_ms: UNKNOWN_AGE_MS,
            ..UnitSnapshot::default()
        }
    }

    fn idle_warm_room() -> UnitSnapshot {
        UnitSnapshot {
            mode: Some(Mode::Off),
            ambient: Some(28.0),
            max_temp: Some(23.0),
            unit_temp: Some(26.0),
            mode_unchanged_ms: UNKNOWN_AGE_MS,
            ..UnitSnapshot::default()
        }
    }

    #[test]
    fn cold_room_starts_heating() {
        let commands = engine().evaluate(&idle_cold_room(), ModeSet::ALL, 0);
        assert_eq!(
            commands,
            vec![
                UnitCommand::SetMode(Mode::Heat),
                UnitCommand::SetFan(FanSpeed::Auto),
                UnitCommand::SetSetpoint(20.0),
            ]
        );
    }

    #[test]
    fn heating_needs_sensor_and_target() {
        let mut snapshot = idle_cold_room();
        snapshot.ambient = None;
        assert!(engine().evaluate(&snapshot, ModeSet::ALL, 0).is_empty());

        let mut snapshot = idle_cold_room();
        snapshot.min_temp = None;
        assert!(engine().evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
    }

    #[test]
    fn recent_mode_change_blocks_a_restart() {
        let mut snapshot = idle_cold_room();
        snapshot.mode_unchanged_ms = 60_000;
        assert!(engine().evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
    }

    #[test]
    fn own_shutdown_blocks_a_restart_for_the_dwell_window() {
        let mut engine = engine();
        let hot = UnitSnapshot {
            mode: Some(Mode::Heat),
            ambient: Some(24.0),
            min_temp: Some(20.0),
            ..UnitSnapshot::default()
        };
        let commands = engine.evaluate(&hot, ModeSet::ALL, 1_000);
        assert_eq!(commands, vec![UnitCommand::SetMode(Mode::Off)]);

        // Cold again right away: still inside the dwell window.
        assert!(engine
            .evaluate(&idle_cold_room(), ModeSet::ALL, 600_000)
            .is_empty());

        // After the window the cycle may restart.
        let commands = engine.evaluate(&idle_cold_room(), ModeSet::ALL, 1_000 + 1_800_000);
        assert_eq!(commands[0], UnitCommand::SetMode(Mode::Heat));
    }

    #[test]
    fn overheated_room_shuts_heating_down() {
        let snapshot = UnitSnapshot {
            mode: Some(Mode::Heat),
            ambient: Some(23.5),
            min_temp: Some(20.0),
            ..UnitSnapshot::default()
        };
        let commands = engine().evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(commands, vec![UnitCommand::SetMode(Mode::Off)]);
    }

    #[test]
    fn score_trigger_fires_once_then_resets() {
        let mut engine = engine_with(AutopilotConfig {
            score_trigger: 3,
            ..AutopilotConfig::default()
        });
        let snapshot = UnitSnapshot {
            mode: Some(Mode::Heat),
            ambient: Some(18.0),
            min_temp: Some(20.0),
            fan: Some(FanSpeed::Auto),
            setpoint: Some(20.0),
            ..UnitSnapshot::default()
        };

        assert!(engine.evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
        assert!(engine.evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
        let commands = engine.evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(
            commands,
            vec![
                UnitCommand::SetFan(FanSpeed::Medium),
                UnitCommand::SetSetpoint(20.5),
            ]
        );
        assert_eq!(engine.score(), 0);
        assert!(engine.evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
    }

    #[test]
    fn heating_gives_up_at_the_floor() {
        let mut engine = engine_with(AutopilotConfig {
            score_trigger: 1,
            ..AutopilotConfig::default()
        });
        let snapshot = UnitSnapshot {
            mode: Some(Mode::Heat),
            ambient: Some(21.5),
            min_temp: Some(20.0),
            setpoint: Some(17.0),
            fan: Some(FanSpeed::Medium),
            ..UnitSnapshot::default()
        };
        let commands = engine.evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(commands, vec![UnitCommand::SetMode(Mode::Off)]);
    }

    #[test]
    fn warm_room_starts_cooling_buffered_by_the_unit_sensor() {
        let commands = engine().evaluate(&idle_warm_room(), ModeSet::ALL, 0);
        assert_eq!(
            commands,
            vec![
                UnitCommand::SetMode(Mode::Cool),
                UnitCommand::SetSetpoint(26.0),
                UnitCommand::SetFan(FanSpeed::Auto),
            ]
        );
    }

    #[test]
    fn cooling_waits_for_the_unit_sensor() {
        let mut snapshot = idle_warm_room();
        snapshot.unit_temp = None;
        assert!(engine().evaluate(&snapshot, ModeSet::ALL, 0).is_empty());
    }

    #[test]
    fn stratified_air_widens_the_start_buffer() {
        let mut snapshot = idle_warm_room();
        snapshot.ambient = Some(23.0);
        snapshot.unit_temp = Some(25.0); // 2.0 above ambient
        let commands = engine().evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(commands[1], UnitCommand::SetSetpoint(25.0));
    }

    #[test]
    fn overcooled_room_shuts_cooling_down() {
        let snapshot = UnitSnapshot {
            mode: Some(Mode::Cool),
            ambient: Some(18.0),
            max_temp: Some(23.0),
            ..UnitSnapshot::default()
        };
        let commands = engine().evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(commands, vec![UnitCommand::SetMode(Mode::Off)]);
    }

    #[test]
    fn stalled_cooling_shuts_down() {
        let snapshot = UnitSnapshot {
            mode: Some(Mode::Cool),
            ambient: Some(22.0),
            max_temp: Some(23.0),
            unit_range: 0.2,
            mode_unchanged_ms: UNKNOWN_AGE_MS,
            ..UnitSnapshot::default()
        };
        let commands = engine().evaluate(&snapshot, ModeSet::ALL, 0);
        assert_eq!(commands, vec![UnitCommand::SetMode(Mode::Off)]);

        // A warming room means the unit is still fighting real load.
        let mut warming = snapshot.clone();
        warming.ambient_trend = Trend::WarmingUp;
        let mut engine = engine();
        assert!(engine.evaluate(&warming, ModeSet::ALL, 0).is_empty());
    }

    #[test]
    fn pump_restriction_keeps_cold_logic_dormant() {
        let usable = ModeSet::only(Mode::Off).with(Mode::Heat);
        let commands = engine().evaluate(&idle_warm_room(), usable, 0);
        assert!(commands.is_empty());
    }

    #[test]
    fn external_mode_change_resets_the_score() {
        let mut engine = engine();
        let heating = UnitSnapshot {
            mode: Some(Mode::Heat),
            ambient: Some(18.0),
            min_temp: Some(20.0),
            ..UnitSnapshot::default()
        };
        engine.evaluate(&heating, ModeSet::ALL, 0);
        engine.evaluate(&heating, ModeSet::ALL, 0);
        assert_eq!(engine.score(), 2);

        // Someone turned the unit off from the remote.
        let off = UnitSnapshot {
            mode: Some(Mode::Off),
            ambient: Some(22.0),
            min_temp: Some(20.0),
            mode_unchanged_ms: 0,
            ..UnitSnapshot::default()
        };
        engine.evaluate(&off, ModeSet::ALL, 0);
        assert_eq!(engine.score(), 0);
    }
}
