use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use hvac_common::{AutopilotConfig, FanSpeed, Mode, ParseError, ValueHistory};

use crate::monotonic_ms;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("device never acknowledged the command")]
    AckTimeout,
    #[error("transport error: {0}")]
    Transport(String),
}

/// How long `RemoteValue::set` keeps polling for the device's echo.
#[derive(Debug, Clone, Copy)]
pub struct AckPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl AckPolicy {
    pub fn from_config(config: &AutopilotConfig) -> Self {
        Self {
            attempts: config.ack_attempts,
            interval: Duration::from_millis(config.ack_interval_ms),
        }
    }
}

/// Wire form of one scalar: parse inbound payloads, format outbound ones.
/// Plain function pointers; each value carries its own pair.
pub struct Codec<T> {
    pub parse: fn(&[u8]) -> Result<T, ParseError>,
    pub format: fn(&T) -> String,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Codec<T> {}

pub mod codecs {
    use super::*;

    /// maxTemp proposals at or below this are never plausible; they collide
    /// with the sleep preset and would make the cool stop band nonsense.
    pub const MAX_TARGET_FLOOR: f64 = 22.0;

    fn text(payload: &[u8]) -> Result<&str, ParseError> {
        std::str::from_utf8(payload)
            .map(str::trim)
            .map_err(|_| ParseError::Malformed)
    }

    fn float(payload: &[u8]) -> Result<f64, ParseError> {
        let value: f64 = text(payload)?.parse().map_err(|_| ParseError::Malformed)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ParseError::OutOfRange(format!("{value} is not a temperature")))
        }
    }

    pub fn mode() -> Codec<Mode> {
        Codec {
            parse: |payload| Mode::parse(text(payload)?),
            format: |mode| mode.as_str().to_string(),
        }
    }

    pub fn fan_speed() -> Codec<FanSpeed> {
        Codec {
            parse: |payload| FanSpeed::parse(text(payload)?),
            format: |speed| speed.as_str().to_string(),
        }
    }

    pub fn celsius() -> Codec<f64> {
        Codec {
            parse: float,
            format: |value| format!("{value:.1}"),
        }
    }

    /// Like [`celsius`] but for the autopilot's max target, which has a
    /// plausibility floor.
    pub fn max_target() -> Codec<f64> {
        Codec {
            parse: |payload| {
                let value = float(payload)?;
                if value <= MAX_TARGET_FLOOR {
                    return Err(ParseError::OutOfRange(format!(
                        "{value} is not a plausible max target"
                    )));
                }
                Ok(value)
            },
            format: |value| format!("{value:.1}"),
        }
    }

    /// Autopilot on/off switch. Home-automation frontends say `auto`/`off`;
    /// plain booleans are accepted too. We always echo `true`/`false`.
    pub fn switch() -> Codec<bool> {
        Codec {
            parse: |payload| match text(payload)?.to_ascii_lowercase().as_str() {
                "true" | "on" | "auto" => Ok(true),
                "false" | "off" => Ok(false),
                other => Err(ParseError::Unrecognized(other.to_string())),
            },
            format: |value| value.to_string(),
        }
    }
}

/// Value this program is the source of truth for. Inbound messages on the
/// command topic override it; every mutation is echoed on the status topic.
pub struct ReplicatedValue<T> {
    transport: Arc<dyn Transport>,
    status_topic: String,
    codec: Codec<T>,
    value: RwLock<Option<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ReplicatedValue<T> {
    pub fn attach(
        transport: Arc<dyn Transport>,
        command_topic: &str,
        status_topic: &str,
        codec: Codec<T>,
    ) -> anyhow::Result<Arc<Self>> {
        let value = Arc::new(Self {
            transport: Arc::clone(&transport),
            status_topic: status_topic.to_string(),
            codec,
            value: RwLock::new(None),
        });

        let this = Arc::clone(&value);
        let command = command_topic.to_string();
        transport.subscribe(
            command_topic,
            Arc::new(move |payload: &[u8]| match (this.codec.parse)(payload) {
                Ok(parsed) => this.set(parsed),
                Err(err) => warn!(topic = %command, "dropping command: {err}"),
            }),
        )?;

        Ok(value)
    }

    pub fn set(&self, value: T) {
        let formatted = (self.codec.format)(&value);
        *self
            .value
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(value);
        if let Err(err) = self
            .transport
            .publish(&self.status_topic, formatted.as_bytes(), false)
        {
            warn!(topic = %self.status_topic, "failed to echo state: {err}");
        }
    }

    pub fn get(&self) -> Option<T> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_some()
    }

    /// Re-emit the current value, if any, on the status topic.
    pub fn republish(&self) {
        if let Some(value) = self.get() {
            self.set(value);
        }
    }
}

/// Value the device is the source of truth for. `set` proposes a change on
/// the command topic and only trusts what comes back on the status topic.
pub struct RemoteValue<T> {
    transport: Arc<dyn Transport>,
    command_topic: String,
    status_topic: String,
    codec: Codec<T>,
    ack: AckPolicy,
    acked: RwLock<ValueHistory<T>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> RemoteValue<T> {
    pub fn attach(
        transport: Arc<dyn Transport>,
        command_topic: &str,
        status_topic: &str,
        codec: Codec<T>,
        ack: AckPolicy,
        window_ms: u64,
    ) -> anyhow::Result<Arc<Self>> {
        let value = Arc::new(Self {
            transport: Arc::clone(&transport),
            command_topic: command_topic.to_string(),
            status_topic: status_topic.to_string(),
            codec,
            ack,
            acked: RwLock::new(ValueHistory::new(window_ms)),
        });

        let this = Arc::clone(&value);
        transport.subscribe(
            status_topic,
            Arc::new(move |payload: &[u8]| this.observe(payload)),
        )?;

        Ok(value)
    }

    fn observe(&self, payload: &[u8]) {
        match (self.codec.parse)(payload) {
            Ok(value) => self
                .acked
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(value, monotonic_ms()),
            Err(err) => warn!(topic = %self.status_topic, "dropping status update: {err}"),
        }
    }

    /// Last value the device actually reported; never the desired one.
    pub fn get(&self) -> Option<T> {
        self.acked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .latest()
            .cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.get().is_some()
    }

    /// Milliseconds since the acknowledged value last changed;
    /// [`hvac_common::UNKNOWN_AGE_MS`] until a change has been observed.
    pub fn unchanged_for(&self, now_ms: u64) -> u64 {
        self.acked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unchanged_for(now_ms)
    }

    /// Publish the desired value and wait a bounded number of poll attempts
    /// for the device to echo it back.
    pub async fn set(&self, desired: T) -> Result<(), SyncError> {
        let formatted = (self.codec.format)(&desired);
        self.transport
            .publish(&self.command_topic, formatted.as_bytes(), false)
            .map_err(|err| SyncError::Transport(err.to_string()))?;

        for attempt in 0..self.ack.attempts {
            if self.get().as_ref() == Some(&desired) {
                return Ok(());
            }
            debug!(
                topic = %self.status_topic,
                desired = %formatted,
                attempt,
                "command not acknowledged yet"
            );
            tokio::time::sleep(self.ack.interval).await;
        }
        if self.get().as_ref() == Some(&desired) {
            return Ok(());
        }

        error!(topic = %self.status_topic, desired = %formatted, "device never acknowledged the command");
        Err(SyncError::AckTimeout)
    }
}
