use std::sync::Arc;

use hvac_controller::transport::{MemoryBus, Transport};

/// Stand-in for a healthy physical unit: every command is acknowledged by
/// echoing it onto the matching status topic.
pub struct MockDevice {
    bus: Arc<MemoryBus>,
    name: String,
}

impl MockDevice {
    pub fn install(bus: &Arc<MemoryBus>, name: &str) -> Self {
        for (command, state) in [
            (
                format!("esphome/{name}/mode_command"),
                format!("esphome/{name}/mode_state"),
            ),
            (
                format!("esphome/{name}/fan_mode_command"),
                format!("esphome/{name}/fan_mode_state"),
            ),
            (
                format!("esphome/{name}/target_temperature_command"),
                format!("esphome/{name}/target_temperature_low_state"),
            ),
        ] {
            let relay = Arc::clone(bus);
            bus.subscribe(
                &command,
                Arc::new(move |payload: &[u8]| {
                    relay.publish(&state, payload, false).unwrap();
                }),
            )
            .unwrap();
        }

        let device = Self {
            bus: Arc::clone(bus),
            name: name.to_string(),
        };
        device.set_mode("OFF");
        device
    }

    pub fn set_mode(&self, mode: &str) {
        self.bus
            .publish(
                &format!("esphome/{}/mode_command", self.name),
                mode.as_bytes(),
                false,
            )
            .unwrap();
    }

    pub fn report_unit_temperature(&self, temperature: f64) {
        self.bus
            .publish(
                &format!("esphome/{}/current_temperature_state", self.name),
                format!("{temperature:.1}").as_bytes(),
                false,
            )
            .unwrap();
    }
}

pub fn report_room_temperature(bus: &Arc<MemoryBus>, topic: &str, temperature: f64) {
    bus.publish(
        topic,
        format!(r#"{{"temperature": {temperature}}}"#).as_bytes(),
        false,
    )
    .unwrap();
}

pub fn set_autopilot(bus: &Arc<MemoryBus>, name: &str, enabled: bool) {
    bus.publish(
        &format!("hvac/{name}/autopilot/enabled/command"),
        enabled.to_string().as_bytes(),
        false,
    )
    .unwrap();
}

pub fn set_min_temp(bus: &Arc<MemoryBus>, name: &str, temperature: f64) {
    bus.publish(
        &format!("hvac/{name}/autopilot/min_temp/command"),
        format!("{temperature:.1}").as_bytes(),
        false,
    )
    .unwrap();
}

pub fn set_max_temp(bus: &Arc<MemoryBus>, name: &str, temperature: f64) {
    bus.publish(
        &format!("hvac/{name}/autopilot/max_temp/command"),
        format!("{temperature:.1}").as_bytes(),
        false,
    )
    .unwrap();
}
