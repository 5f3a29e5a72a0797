use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use hvac_common::usable_modes;

use crate::monotonic_ms;
use crate::unit::Unit;

/// Units sharing one compressor line. Membership only; unit internals are
/// never mutated from here.
pub struct Pump {
    pub name: String,
    pub units: Vec<Arc<Unit>>,
}

impl Pump {
    /// One pass over the pump's units. Usable modes are recomputed per unit
    /// so a cycle started earlier in the pass immediately constrains the
    /// rest of the line.
    pub async fn tune(&self) {
        for unit in &self.units {
            let now_ms = monotonic_ms();
            unit.log_state(now_ms);
            if unit.autopilot_enabled() {
                let usable = usable_modes(self.units.iter().map(|unit| unit.mode.get()));
                debug!(pump = %self.name, unit = %unit.name, usable = ?usable, "tuning");
                unit.tune(usable, now_ms).await;
            } else {
                debug!(pump = %self.name, unit = %unit.name, "autopilot disabled, leaving alone");
            }
            unit.ping();
        }
    }
}

/// Each pump tunes on its own task; a slow acknowledgement on one line never
/// stalls the others.
pub fn spawn_pump_loop(pump: Arc<Pump>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            pump.tune().await;
        }
    })
}
