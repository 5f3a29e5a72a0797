use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use hvac_common::RuntimeConfig;

use crate::pump::{spawn_pump_loop, Pump};
use crate::transport::{MqttTransport, Transport};
use crate::unit::Unit;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = load_config().await?;
    config.sanitize();
    apply_env_overrides(&mut config);
    anyhow::ensure!(!config.pumps.is_empty(), "no pumps configured");

    let transport: Arc<dyn Transport> = MqttTransport::connect(&config.mqtt);
    info!(host = %config.mqtt.host, port = config.mqtt.port, "mqtt transport started");

    let mut tasks = Vec::new();
    for pump_config in &config.pumps {
        let mut units = Vec::new();
        for unit_config in &pump_config.units {
            let unit = Unit::attach(
                Arc::clone(&transport),
                &config.autopilot,
                &unit_config.name,
                &unit_config.sensor_topic,
            )
            .with_context(|| format!("failed to wire unit {}", unit_config.name))?;
            units.push(unit);
        }
        let pump = Arc::new(Pump {
            name: pump_config.name.clone(),
            units,
        });
        info!(pump = %pump.name, units = pump.units.len(), "pump tuning task started");
        tasks.push(spawn_pump_loop(
            pump,
            Duration::from_millis(config.autopilot.tune_interval_ms),
        ));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

async fn load_config() -> anyhow::Result<RuntimeConfig> {
    let path = std::env::var("HVAC_CONFIG").unwrap_or_else(|_| "./config.json".to_string());
    match tokio::fs::read(&path).await {
        Ok(raw) => {
            serde_json::from_slice(&raw).with_context(|| format!("failed to parse {path}"))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(path = %path, "config file not found, using defaults");
            Ok(RuntimeConfig::default())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {path}")),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.mqtt.port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        config.mqtt.username = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        config.mqtt.password = pass;
    }
}
