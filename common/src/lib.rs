pub mod config;
pub mod decision;
pub mod history;
pub mod pump;
pub mod types;

pub use config::{AutopilotConfig, MqttConfig, PumpConfig, RuntimeConfig, UnitConfig};
pub use decision::{DecisionEngine, UnitCommand, UnitSnapshot};
pub use history::{HistoryError, TemperatureHistory, ValueHistory, UNKNOWN_AGE_MS};
pub use pump::usable_modes;
pub use types::{FanSpeed, Mode, ModeSet, ParseError, SensorPayload, Trend};
